use std::sync::Arc;

use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::postgres::PgEntityStore;
use crate::identity::keycloak::KeycloakClient;
use crate::scope::RoleResolver;
use crate::services::accounts::AccountService;
use crate::services::dashboard::AggregationEngine;
use crate::services::provisioning::ProvisioningCoordinator;

/// Shared application state: one pool-backed store, one identity client, and
/// the services wired over them.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PgEntityStore>,
    pub accounts: Arc<AccountService<PgEntityStore, KeycloakClient>>,
    pub provisioning: Arc<ProvisioningCoordinator<PgEntityStore, KeycloakClient>>,
    pub aggregation: Arc<AggregationEngine<PgEntityStore>>,
    pub resolver: Arc<RoleResolver<PgEntityStore>>,
}

impl AppState {
    pub async fn initialise() -> anyhow::Result<Self> {
        let pool = DatabaseManager::connect().await?;
        let store = Arc::new(PgEntityStore::new(pool));
        let identity = Arc::new(KeycloakClient::new(config::config().identity.clone())?);

        Ok(Self {
            accounts: Arc::new(AccountService::new(
                Arc::clone(&store),
                Arc::clone(&identity),
            )),
            provisioning: Arc::new(ProvisioningCoordinator::new(
                Arc::clone(&store),
                Arc::clone(&identity),
            )),
            aggregation: Arc::new(AggregationEngine::new(Arc::clone(&store))),
            resolver: Arc::new(RoleResolver::new(Arc::clone(&store))),
            store,
        })
    }
}
