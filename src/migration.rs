//! Tenant-store schema migrations: versioned SQL applied in order, tracked
//! in a `_erp_migrations` table inside each tenant database.

use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

/// One versioned migration. Versions are applied in ascending order and
/// never re-run once recorded.
#[derive(Clone, Copy, Debug)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Migration capability consulted by the provisioner: what is pending for a
/// store, and apply it. Kept as a trait so the provisioner does not care how
/// migrations are defined.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    /// Versions not yet applied to the store, in apply order.
    async fn pending(&self, pool: &PgPool) -> Result<Vec<i64>, AppError>;
    /// Apply the given versions in order.
    async fn apply(&self, pool: &PgPool, versions: &[i64]) -> Result<(), AppError>;
}

/// Runner over an embedded, ordered migration list.
pub struct SqlMigrationRunner {
    migrations: Vec<Migration>,
}

const MIGRATIONS_TABLE: &str = "_erp_migrations";

impl SqlMigrationRunner {
    /// Build a runner; migrations are sorted by version so callers may list
    /// them in any order.
    pub fn new(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        SqlMigrationRunner { migrations }
    }

    /// Runner with the baseline tenant schema.
    pub fn baseline() -> Self {
        Self::new(baseline_migrations())
    }

    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    async fn ensure_tracking_table(&self, pool: &PgPool) -> Result<(), AppError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            MIGRATIONS_TABLE
        );
        sqlx::query(&ddl).execute(pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MigrationRunner for SqlMigrationRunner {
    async fn pending(&self, pool: &PgPool) -> Result<Vec<i64>, AppError> {
        self.ensure_tracking_table(pool).await?;
        let applied: Vec<(i64,)> =
            sqlx::query_as(&format!("SELECT version FROM {}", MIGRATIONS_TABLE))
                .fetch_all(pool)
                .await?;
        let applied: std::collections::HashSet<i64> = applied.into_iter().map(|(v,)| v).collect();
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .map(|m| m.version)
            .collect())
    }

    async fn apply(&self, pool: &PgPool, versions: &[i64]) -> Result<(), AppError> {
        for version in versions {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.version == *version)
                .ok_or_else(|| AppError::BadRequest(format!("unknown migration version {}", version)))?;

            // One transaction per migration: a failure leaves earlier
            // migrations recorded and the failing one fully rolled back.
            let mut tx = pool.begin().await?;
            for statement in split_statements(migration.sql) {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query(&format!(
                "INSERT INTO {} (version, name) VALUES ($1, $2)",
                MIGRATIONS_TABLE
            ))
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!(version = migration.version, name = migration.name, "applied migration");
        }
        Ok(())
    }
}

/// Split a migration script into statements. Statements in the embedded
/// scripts never contain literal semicolons, so a plain split suffices.
fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Baseline schema for a freshly provisioned tenant store. Tables carry
/// created_at/updated_at/archived_at; rows are archived, never hard-deleted.
pub fn baseline_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "currencies_and_treasuries",
            sql: r#"
                CREATE TABLE currencies (
                    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                    code TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    is_base BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    archived_at TIMESTAMPTZ
                );
                CREATE TABLE treasuries (
                    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                    name TEXT NOT NULL UNIQUE,
                    currency_code TEXT NOT NULL,
                    opening_balance NUMERIC(18, 4) NOT NULL DEFAULT 0,
                    is_default BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    archived_at TIMESTAMPTZ
                )
            "#,
        },
        Migration {
            version: 2,
            name: "vouchers_and_ledger_entries",
            sql: r#"
                CREATE TABLE vouchers (
                    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                    voucher_no TEXT NOT NULL UNIQUE,
                    treasury_id UUID NOT NULL REFERENCES treasuries (id),
                    kind TEXT NOT NULL,
                    amount NUMERIC(18, 4) NOT NULL,
                    currency_code TEXT NOT NULL,
                    memo TEXT,
                    posted_at TIMESTAMPTZ,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    archived_at TIMESTAMPTZ
                );
                CREATE TABLE ledger_entries (
                    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                    voucher_id UUID NOT NULL REFERENCES vouchers (id),
                    account_code TEXT NOT NULL,
                    debit NUMERIC(18, 4) NOT NULL DEFAULT 0,
                    credit NUMERIC(18, 4) NOT NULL DEFAULT 0,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    archived_at TIMESTAMPTZ
                );
                CREATE INDEX ledger_entries_voucher_id_idx ON ledger_entries (voucher_id)
            "#,
        },
    ]
}
