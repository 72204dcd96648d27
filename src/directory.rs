//! Tenant directory: the shared registry of tenants and their store
//! locators, persisted in the directory database. The `tenants` table lives
//! in a schema named from `ERP_DIRECTORY_SCHEMA` env (default `erp`).

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Schema name for directory tables. Must be a valid PostgreSQL identifier.
pub fn directory_schema() -> String {
    std::env::var("ERP_DIRECTORY_SCHEMA").unwrap_or_else(|_| "erp".into())
}

fn tenants_table() -> String {
    format!("{}.tenants", directory_schema())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(TenantStatus::Active),
            "inactive" => Ok(TenantStatus::Inactive),
            _ => Err(AppError::BadRequest(format!(
                "invalid tenant status: {} (expected active or inactive)",
                s
            ))),
        }
    }
}

/// One row of the tenant directory. `database_name` is the store locator:
/// null until provisioned, then unique and immutable.
#[derive(Clone, Debug, Serialize)]
pub struct TenantRecord {
    pub id: Uuid,
    pub name: String,
    pub currency_code: String,
    pub status: TenantStatus,
    pub database_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

type TenantRow = (
    Uuid,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
);

impl TenantRecord {
    fn from_row(row: TenantRow) -> Result<TenantRecord, AppError> {
        let (id, name, currency_code, status, database_name, created_at) = row;
        Ok(TenantRecord {
            id,
            name,
            currency_code,
            status: status.parse()?,
            database_name,
            created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, name, currency_code, status, database_name, created_at";

/// Create the directory schema and tenants table if missing. Name is unique
/// among all rows; database_name is unique once assigned (partial index so
/// unprovisioned rows do not collide on null).
pub async fn ensure_directory_tables(pool: &PgPool) -> Result<(), AppError> {
    let schema = directory_schema();
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    let table = tenants_table();
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            currency_code TEXT NOT NULL DEFAULT 'EGP',
            status TEXT NOT NULL DEFAULT 'active',
            database_name TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        table
    );
    sqlx::query(&ddl).execute(pool).await?;

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS tenants_name_key ON {} (name)",
        table
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS tenants_database_name_key ON {} (database_name) WHERE database_name IS NOT NULL",
        table
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Directory operations consumed by tenant validation and provisioning.
/// Kept as a trait so both can be tested against a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Find an Active tenant by surrogate id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TenantRecord>, AppError>;
    /// Find an Active tenant by display name.
    async fn find_by_name(&self, name: &str) -> Result<Option<TenantRecord>, AppError>;
    /// Find a tenant by id regardless of status. Provisioning uses this so
    /// an administratively deactivated tenant can still be repaired.
    async fn find_any_by_id(&self, id: Uuid) -> Result<Option<TenantRecord>, AppError>;
    /// Commit a synthesized locator for a tenant. True when this call won
    /// the assignment; false when another caller assigned one first. A
    /// locator name already taken by a different tenant is a Conflict.
    async fn assign_database_name(&self, id: Uuid, database_name: &str)
        -> Result<bool, AppError>;
}

/// sqlx-backed directory over the shared directory pool.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        PgDirectory { pool }
    }

    /// Insert a new tenant row. Duplicate names surface as Conflict via the
    /// unique index, not an application-level check.
    pub async fn create(&self, name: &str, currency_code: &str) -> Result<TenantRecord, AppError> {
        let sql = format!(
            "INSERT INTO {} (id, name, currency_code, status) VALUES ($1, $2, $3, 'active') RETURNING {}",
            tenants_table(),
            SELECT_COLUMNS
        );
        let row: TenantRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(currency_code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::Db(e) {
                e if e.is_unique_violation() => {
                    AppError::Conflict(format!("company name already exists: {}", name))
                }
                e => e,
            })?;
        TenantRecord::from_row(row)
    }

    pub async fn list_active(&self) -> Result<Vec<TenantRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE status = 'active' ORDER BY name",
            SELECT_COLUMNS,
            tenants_table()
        );
        let rows: Vec<TenantRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(TenantRecord::from_row).collect()
    }

    pub async fn set_status(&self, id: Uuid, status: TenantStatus) -> Result<(), AppError> {
        let sql = format!("UPDATE {} SET status = $2 WHERE id = $1", tenants_table());
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("tenant {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for PgDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TenantRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND status = 'active'",
            SELECT_COLUMNS,
            tenants_table()
        );
        let row: Option<TenantRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(TenantRecord::from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<TenantRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE name = $1 AND status = 'active'",
            SELECT_COLUMNS,
            tenants_table()
        );
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TenantRecord::from_row).transpose()
    }

    async fn find_any_by_id(&self, id: Uuid) -> Result<Option<TenantRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            SELECT_COLUMNS,
            tenants_table()
        );
        let row: Option<TenantRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(TenantRecord::from_row).transpose()
    }

    /// The `database_name IS NULL` guard makes this a single atomic
    /// assignment: exactly one concurrent caller wins; the rest observe the
    /// winner's value on re-read.
    async fn assign_database_name(
        &self,
        id: Uuid,
        database_name: &str,
    ) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE {} SET database_name = $2 WHERE id = $1 AND database_name IS NULL",
            tenants_table()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(database_name)
            .execute(&self.pool)
            .await
            .map_err(|e| match AppError::Db(e) {
                e if e.is_unique_violation() => AppError::Conflict(format!(
                    "store locator already in use: {}",
                    database_name
                )),
                e => e,
            })?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!("active".parse::<TenantStatus>().unwrap(), TenantStatus::Active);
        assert_eq!("Inactive".parse::<TenantStatus>().unwrap(), TenantStatus::Inactive);
        assert!("deleted".parse::<TenantStatus>().is_err());
        assert_eq!(TenantStatus::Active.as_str(), "active");
    }
}
