use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use estate_api_rust::state::AppState;
use estate_api_rust::{config, handlers, middleware};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, KEYCLOAK_URL, etc.
    let _ = dotenvy::dotenv();

    let app_config = config::config();
    tracing_subscriber::fmt::init();
    tracing::info!("Starting estate API in {:?} mode", app_config.environment);

    let state = AppState::initialise()
        .await
        .unwrap_or_else(|e| panic!("failed to initialise application state: {e}"));

    let app = app(state);

    let bind_addr = format!("0.0.0.0:{}", app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    println!("🚀 Estate API server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/health", get(handlers::health))
        .merge(auth_public_routes())
        // Protected API
        .merge(protected_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use axum::routing::post;
    use handlers::auth;

    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/forget-password", post(auth::forget_password))
        .route("/api/auth/refreshtoken", post(auth::refresh_token))
}

fn protected_routes() -> Router<AppState> {
    use axum::routing::post;
    use handlers::{community, dashboard, org};

    Router::new()
        .route("/api/dashboard", get(dashboard::show))
        .route("/api/org", post(org::create))
        .route(
            "/api/org/:org",
            get(org::find_one).put(org::update).delete(org::remove),
        )
        .route("/api/community", post(community::create))
        .route(
            "/api/community/:id",
            get(community::find_one)
                .put(community::update)
                .delete(community::remove),
        )
        .route_layer(axum_middleware::from_fn(middleware::auth::bearer_auth))
}
