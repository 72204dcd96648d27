//! Demo server: directory bootstrap, session layer, tenant gate, and the
//! tenant-selection plus treasury routes.

use axum::{middleware, Router};
use erp_tenancy::{
    common_routes, ensure_database_exists, ensure_directory_tables, finance_routes, tenant_gate,
    tenant_routes, AppConfig, AppState,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tower_sessions::{MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("erp_tenancy=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;
    ensure_database_exists(&config.directory_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.directory_url)
        .await?;
    ensure_directory_tables(&pool).await?;

    let state = AppState::new(config, pool);

    let session_layer = SessionManagerLayer::new(MemoryStore::default());

    // Health endpoints stay outside the gate; everything else is resolved,
    // validated, and bound (or redirected) per request.
    let guarded = Router::new()
        .merge(tenant_routes(state.clone()))
        .nest("/api/v1", finance_routes())
        .layer(middleware::from_fn_with_state(state.clone(), tenant_gate));

    let app = Router::new()
        .merge(common_routes(state))
        .merge(guarded)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
