use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::community::Community;
use crate::database::models::landlord::Landlord;
use crate::database::store::EntityStore;
use crate::scope::Scope;
use crate::services::ServiceError;

/// Dashboard totals. Fields that do not apply to a scope stay `None` and are
/// omitted from the wire format. `tenants` is a literal placeholder held at
/// zero until the tenant entity lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Totals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizations: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communities: Option<i64>,
    pub landlords: i64,
    pub tenants: i64,
    #[serde(rename = "unitsCount")]
    pub units: i64,
    #[serde(rename = "blocksCount")]
    pub blocks: i64,
}

/// One line of a dashboard breakdown: a single landlord with its community's
/// derived counts. Organization and admin fields are populated for the
/// hierarchy scopes and omitted for community scope. A community without
/// landlords contributes no rows at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
    pub comm_id: Uuid,
    pub comm_name: String,
    pub block_name: String,
    pub landlord_first_name: String,
    pub landlord_last_name: String,
    pub units_count: i64,
    pub blocks_count: i64,
    pub landlords_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comm_admin_first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comm_admin_last_name: Option<String>,
    pub tenants_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub totals: Totals,
    pub breakdown: Vec<BreakdownRow>,
}

/// Computes role-scoped totals and per-entity breakdowns over the hierarchy.
///
/// Child lookups are batched by parent-id set: one query for the parent ids,
/// one `IN (...)` query per child relation, then in-memory grouping. The
/// query count is constant in the number of parents; no query ever runs
/// inside a row loop, and numeric totals come from the store's own
/// aggregates rather than application-side reductions.
pub struct AggregationEngine<S> {
    store: Arc<S>,
}

impl<S: EntityStore> AggregationEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn dashboard(&self, scope: &Scope) -> Result<Dashboard, ServiceError> {
        match scope {
            Scope::Global => self.hierarchy_dashboard(None).await,
            Scope::Organization(org_id) => self.hierarchy_dashboard(Some(*org_id)).await,
            Scope::Community(community_id) => self.community_dashboard(*community_id).await,
        }
    }

    /// Global and organization-scoped view
    async fn hierarchy_dashboard(&self, org_scope: Option<Uuid>) -> Result<Dashboard, ServiceError> {
        let parents: Vec<(Uuid, String)> = match org_scope {
            Some(org_id) => {
                let org = self
                    .store
                    .get_active_organization_by_id(org_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Organization \"{org_id}\" not found"))
                    })?;
                vec![(org.id, org.org_name)]
            }
            None => self
                .store
                .list_active_organizations()
                .await?
                .into_iter()
                .map(|org| (org.id, org.org_name))
                .collect(),
        };

        let org_ids: Vec<Uuid> = parents.iter().map(|(id, _)| *id).collect();
        let org_names: HashMap<Uuid, String> = parents.into_iter().collect();

        let communities = self
            .store
            .list_active_communities_by_org_ids(&org_ids)
            .await?;
        let community_ids: Vec<Uuid> = communities.iter().map(|c| c.id).collect();

        let landlords = self
            .store
            .list_landlords_by_community_ids(&community_ids)
            .await?;

        // One batched pass for the admin names as well; write-time
        // enforcement guarantees at most one admin per community.
        let admins: HashMap<Uuid, (String, String)> = self
            .store
            .community_admins_by_community_ids(&community_ids)
            .await?
            .into_iter()
            .filter_map(|user| {
                user.community_id
                    .map(|community_id| (community_id, (user.first_name, user.last_name)))
            })
            .collect();

        let organizations = match org_scope {
            Some(_) => None,
            None => Some(self.store.count_active_organizations().await?),
        };
        let communities_total = self.store.count_active_communities(org_scope).await?;
        let landlords_total = self.store.count_landlords_in(&community_ids).await?;
        let (blocks, units) = self.store.sum_blocks_and_units(&community_ids).await?;

        let by_community = group_by_community(&landlords);

        let mut breakdown = Vec::with_capacity(landlords.len());
        for community in &communities {
            let Some(community_landlords) = by_community.get(&community.id) else {
                continue;
            };
            let (admin_first, admin_last) = match admins.get(&community.id) {
                Some((first, last)) => (Some(first.clone()), Some(last.clone())),
                None => (None, None),
            };
            for landlord in community_landlords {
                breakdown.push(row_for(
                    community,
                    landlord,
                    community_landlords.len() as i64,
                    org_names.get(&community.org_id).map(|name| (community.org_id, name.clone())),
                    (admin_first.clone(), admin_last.clone()),
                ));
            }
        }

        Ok(Dashboard {
            totals: Totals {
                organizations,
                communities: Some(communities_total),
                landlords: landlords_total,
                tenants: 0,
                units,
                blocks,
            },
            breakdown,
        })
    }

    /// Community-scoped view: the caller's single community
    async fn community_dashboard(&self, community_id: Uuid) -> Result<Dashboard, ServiceError> {
        let community = self
            .store
            .get_active_community_by_id(community_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Community \"{community_id}\" not found"))
            })?;

        let community_ids = [community.id];
        let landlords = self
            .store
            .list_landlords_by_community_ids(&community_ids)
            .await?;
        let landlords_total = self.store.count_landlords_in(&community_ids).await?;
        let (blocks, units) = self.store.sum_blocks_and_units(&community_ids).await?;

        let breakdown = landlords
            .iter()
            .map(|landlord| {
                row_for(
                    &community,
                    landlord,
                    landlords_total,
                    None,
                    (None, None),
                )
            })
            .collect();

        Ok(Dashboard {
            totals: Totals {
                organizations: None,
                communities: None,
                landlords: landlords_total,
                tenants: 0,
                units,
                blocks,
            },
            breakdown,
        })
    }
}

fn group_by_community(landlords: &[Landlord]) -> HashMap<Uuid, Vec<&Landlord>> {
    let mut grouped: HashMap<Uuid, Vec<&Landlord>> = HashMap::new();
    for landlord in landlords {
        grouped.entry(landlord.community_id).or_default().push(landlord);
    }
    grouped
}

fn row_for(
    community: &Community,
    landlord: &Landlord,
    landlords_count: i64,
    org: Option<(Uuid, String)>,
    admin: (Option<String>, Option<String>),
) -> BreakdownRow {
    let (org_id, org_name) = match org {
        Some((id, name)) => (Some(id), Some(name)),
        None => (None, None),
    };
    BreakdownRow {
        org_id,
        org_name,
        comm_id: community.id,
        comm_name: community.comm_name.clone(),
        block_name: landlord.block_name.clone().unwrap_or_default(),
        landlord_first_name: landlord.first_name.clone(),
        landlord_last_name: landlord.last_name.clone(),
        units_count: i64::from(community.units_in_block),
        blocks_count: i64::from(community.block_num),
        landlords_count,
        comm_admin_first_name: admin.0,
        comm_admin_last_name: admin.1,
        tenants_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use std::collections::HashSet;

    fn engine(store: &Arc<MemoryStore>) -> AggregationEngine<MemoryStore> {
        AggregationEngine::new(Arc::clone(store))
    }

    /// Organization "Acme" with communities "north" (3 landlords) and
    /// "south" (0 landlords); "south" must contribute zero rows.
    fn seed_acme(store: &MemoryStore) -> (Uuid, Uuid, Uuid) {
        let acme = store.seed_organization("Acme", "boss@acme.test");
        let north = store.seed_community(acme, "north", 2, 10, "north@acme.test");
        let south = store.seed_community(acme, "south", 1, 5, "south@acme.test");
        store.seed_landlord(north, "Nina", "One", "A");
        store.seed_landlord(north, "Noel", "Two", "A");
        store.seed_landlord(north, "Nora", "Three", "B");
        (acme, north, south)
    }

    #[tokio::test]
    async fn org_scope_counts_landlords_and_skips_empty_communities() {
        let store = Arc::new(MemoryStore::new());
        let (acme, north, south) = seed_acme(&store);

        let dashboard = engine(&store)
            .dashboard(&Scope::Organization(acme))
            .await
            .unwrap();

        assert_eq!(dashboard.totals.landlords, 3);
        assert_eq!(dashboard.totals.communities, Some(2));
        assert_eq!(dashboard.totals.organizations, None);
        assert_eq!(dashboard.totals.tenants, 0);
        assert_eq!(dashboard.breakdown.len(), 3);
        assert!(dashboard.breakdown.iter().all(|row| row.comm_id == north));
        assert!(dashboard.breakdown.iter().all(|row| row.comm_id != south));
        assert!(dashboard
            .breakdown
            .iter()
            .all(|row| row.landlords_count == 3 && row.org_name.as_deref() == Some("Acme")));
    }

    #[tokio::test]
    async fn global_scope_includes_all_organizations() {
        let store = Arc::new(MemoryStore::new());
        seed_acme(&store);
        let beta = store.seed_organization("Beta", "boss@beta.test");
        let east = store.seed_community(beta, "east", 4, 20, "east@beta.test");
        store.seed_landlord(east, "Elsa", "Only", "C");

        let dashboard = engine(&store).dashboard(&Scope::Global).await.unwrap();

        assert_eq!(dashboard.totals.organizations, Some(2));
        assert_eq!(dashboard.totals.communities, Some(3));
        assert_eq!(dashboard.totals.landlords, 4);
        // SUM over all active communities: 2+1+4 blocks, 10+5+20 units
        assert_eq!(dashboard.totals.blocks, 7);
        assert_eq!(dashboard.totals.units, 35);
        assert_eq!(dashboard.breakdown.len(), 4);
        let east_row = dashboard
            .breakdown
            .iter()
            .find(|row| row.comm_id == east)
            .unwrap();
        assert_eq!(east_row.org_name.as_deref(), Some("Beta"));
        assert_eq!(east_row.comm_admin_first_name.as_deref(), Some("Admin"));
        assert_eq!(east_row.units_count, 20);
    }

    #[tokio::test]
    async fn community_scope_lists_its_landlords() {
        let store = Arc::new(MemoryStore::new());
        let (_, north, _) = seed_acme(&store);

        let dashboard = engine(&store)
            .dashboard(&Scope::Community(north))
            .await
            .unwrap();

        assert_eq!(dashboard.totals.landlords, 3);
        assert_eq!(dashboard.totals.blocks, 2);
        assert_eq!(dashboard.totals.units, 10);
        assert_eq!(dashboard.totals.organizations, None);
        assert_eq!(dashboard.totals.communities, None);
        assert_eq!(dashboard.breakdown.len(), 3);
        assert!(dashboard
            .breakdown
            .iter()
            .all(|row| row.org_id.is_none() && row.comm_admin_first_name.is_none()));
    }

    #[tokio::test]
    async fn unknown_scope_targets_are_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = engine(&store)
            .dashboard(&Scope::Organization(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = engine(&store)
            .dashboard(&Scope::Community(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn dashboard_is_idempotent_without_writes() {
        let store = Arc::new(MemoryStore::new());
        seed_acme(&store);
        let engine = engine(&store);

        let first = engine.dashboard(&Scope::Global).await.unwrap();
        let second = engine.dashboard(&Scope::Global).await.unwrap();

        assert_eq!(first.totals, second.totals);
        let as_set = |dashboard: &Dashboard| -> HashSet<String> {
            dashboard
                .breakdown
                .iter()
                .map(|row| serde_json::to_string(row).unwrap())
                .collect()
        };
        assert_eq!(as_set(&first), as_set(&second));
    }

    #[tokio::test]
    async fn query_count_is_constant_in_the_number_of_parents() {
        let small = Arc::new(MemoryStore::new());
        seed_acme(&small);
        small.reset_query_count();
        engine(&small).dashboard(&Scope::Global).await.unwrap();
        let small_queries = small.query_count();

        let big = Arc::new(MemoryStore::new());
        for i in 0..12 {
            let org = big.seed_organization(&format!("Org{i}"), &format!("boss{i}@x.test"));
            for j in 0..4 {
                let comm = big.seed_community(
                    org,
                    &format!("comm{i}-{j}"),
                    1,
                    2,
                    &format!("warden{i}-{j}@x.test"),
                );
                big.seed_landlord(comm, "First", "Last", "A");
            }
        }
        big.reset_query_count();
        engine(&big).dashboard(&Scope::Global).await.unwrap();
        let big_queries = big.query_count();

        assert_eq!(small_queries, big_queries);
        assert!(big_queries <= 8, "expected a bounded query count, got {big_queries}");
    }

    #[tokio::test]
    async fn inactive_communities_are_excluded_everywhere() {
        let store = Arc::new(MemoryStore::new());
        let (acme, north, _south) = seed_acme(&store);
        // Deactivate "north" directly in storage; its landlords must vanish
        // from totals and breakdown even though the rows still exist.
        store.deactivate_community_raw(north);
        assert_eq!(store.raw_communities().len(), 2);

        let dashboard = engine(&store)
            .dashboard(&Scope::Organization(acme))
            .await
            .unwrap();
        assert_eq!(dashboard.totals.landlords, 0);
        assert_eq!(dashboard.totals.communities, Some(1));
        assert!(dashboard.breakdown.is_empty());
    }
}
