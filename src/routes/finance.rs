//! Tenant-store data routes. All of these require a bound store, so they
//! must be mounted behind the tenant gate.

use crate::handlers::finance::{
    archive_treasury, create_treasury, list_currencies, list_treasuries, read_treasury,
};
use axum::{routing::get, Router};

pub fn finance_routes() -> Router {
    Router::new()
        .route("/treasuries", get(list_treasuries).post(create_treasury))
        .route(
            "/treasuries/:id",
            get(read_treasury).delete(archive_treasury),
        )
        .route("/currencies", get(list_currencies))
}
