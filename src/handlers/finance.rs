//! Treasury and currency handlers. The gate binds the store; handlers take
//! it through the `BoundStore` extractor and stay tenant-agnostic.

use crate::error::AppError;
use crate::extractors::BoundStore;
use crate::finance::{Currency, CurrencyService, NewTreasury, Treasury, TreasuryService};
use crate::response::{success_many, success_one, success_one_ok, SuccessMany, SuccessOne};
use axum::{extract::Path, http::StatusCode, Json};
use uuid::Uuid;

pub async fn list_treasuries(
    BoundStore(store): BoundStore,
) -> Result<(StatusCode, Json<SuccessMany<Treasury>>), AppError> {
    let treasuries = TreasuryService::list(&store).await?;
    Ok(success_many(treasuries))
}

pub async fn create_treasury(
    BoundStore(store): BoundStore,
    Json(body): Json<NewTreasury>,
) -> Result<(StatusCode, Json<SuccessOne<Treasury>>), AppError> {
    let treasury = TreasuryService::create(&store, &body).await?;
    Ok(success_one(treasury))
}

pub async fn read_treasury(
    BoundStore(store): BoundStore,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SuccessOne<Treasury>>), AppError> {
    let treasury = TreasuryService::get(&store, id).await?;
    Ok(success_one_ok(treasury))
}

pub async fn archive_treasury(
    BoundStore(store): BoundStore,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    TreasuryService::archive(&store, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_currencies(
    BoundStore(store): BoundStore,
) -> Result<(StatusCode, Json<SuccessMany<Currency>>), AppError> {
    let currencies = CurrencyService::list(&store).await?;
    Ok(success_many(currencies))
}
