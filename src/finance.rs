//! Treasury and currency access over a tenant-bound store handle. The
//! handle is always passed in explicitly; nothing here reaches into ambient
//! request state.

use crate::error::AppError;
use crate::handle::StoreHandle;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Treasury {
    pub id: Uuid,
    pub name: String,
    pub currency_code: String,
    pub opening_balance: Decimal,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Currency {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub is_base: bool,
}

#[derive(Deserialize)]
pub struct NewTreasury {
    pub name: String,
    pub currency_code: String,
    #[serde(default)]
    pub opening_balance: Option<Decimal>,
    #[serde(default)]
    pub is_default: bool,
}

const TREASURY_COLUMNS: &str =
    "id, name, currency_code, opening_balance, is_default, created_at, updated_at";

pub struct TreasuryService;

impl TreasuryService {
    /// Live (non-archived) treasuries, newest first.
    pub async fn list(store: &StoreHandle) -> Result<Vec<Treasury>, AppError> {
        let sql = format!(
            "SELECT {} FROM treasuries WHERE archived_at IS NULL ORDER BY created_at DESC",
            TREASURY_COLUMNS
        );
        Ok(sqlx::query_as(&sql).fetch_all(store.pool()).await?)
    }

    pub async fn get(store: &StoreHandle, id: Uuid) -> Result<Treasury, AppError> {
        let sql = format!(
            "SELECT {} FROM treasuries WHERE id = $1 AND archived_at IS NULL",
            TREASURY_COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(store.pool())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("treasury {}", id)))
    }

    pub async fn create(store: &StoreHandle, new: &NewTreasury) -> Result<Treasury, AppError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("treasury name is required".into()));
        }
        let sql = format!(
            "INSERT INTO treasuries (name, currency_code, opening_balance, is_default) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            TREASURY_COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(name)
            .bind(&new.currency_code)
            .bind(new.opening_balance.unwrap_or_default())
            .bind(new.is_default)
            .fetch_one(store.pool())
            .await
            .map_err(|e| match AppError::Db(e) {
                e if e.is_unique_violation() => {
                    AppError::Conflict(format!("treasury name already exists: {}", name))
                }
                e => e,
            })
    }

    /// Soft delete: stamp archived_at, keep the row.
    pub async fn archive(store: &StoreHandle, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE treasuries SET archived_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND archived_at IS NULL",
        )
        .bind(id)
        .execute(store.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("treasury {}", id)));
        }
        Ok(())
    }
}

pub struct CurrencyService;

impl CurrencyService {
    pub async fn list(store: &StoreHandle) -> Result<Vec<Currency>, AppError> {
        Ok(sqlx::query_as(
            "SELECT id, code, name, is_base FROM currencies WHERE archived_at IS NULL ORDER BY code",
        )
        .fetch_all(store.pool())
        .await?)
    }
}
