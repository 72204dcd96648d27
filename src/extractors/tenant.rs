//! Extract the gate-bound tenant context and store handle in handlers.
//! Reaching a guarded handler without the gate installed is a wiring bug,
//! surfaced as a typed error rather than a panic.

use crate::error::AppError;
use crate::handle::StoreHandle;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Tenant bound to the current request by the gate.
#[derive(Clone, Debug)]
pub struct CurrentTenant {
    pub id: Uuid,
    pub name: String,
    pub currency_code: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentTenant>()
            .cloned()
            .ok_or_else(|| AppError::NotBound("no tenant bound to request".into()))
    }
}

/// Store handle bound to the current request by the gate.
#[derive(Clone, Debug)]
pub struct BoundStore(pub StoreHandle);

#[async_trait]
impl<S> FromRequestParts<S> for BoundStore
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<StoreHandle>()
            .cloned()
            .map(BoundStore)
            .ok_or_else(|| AppError::NotBound("no store bound to request".into()))
    }
}
