//! Tenant selection and onboarding routes. These sit under the gate's
//! always-reachable tenant root so a user with no bound tenant can still
//! pick or create one.

use crate::handlers::tenant::{
    create_tenant, current_tenant, list_tenants, select_tenant, switch_tenant,
};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn tenant_routes(state: AppState) -> Router {
    Router::new()
        .route("/tenant", post(create_tenant))
        .route("/tenant/select", get(list_tenants).post(select_tenant))
        .route("/tenant/switch", post(switch_tenant))
        .route("/tenant/current", get(current_tenant))
        .with_state(state)
}
