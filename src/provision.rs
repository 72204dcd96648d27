//! Tenant store provisioning: locator assignment, physical database
//! creation, and schema migration. Every step is safe to re-run, so the
//! whole operation can be retried after any failure and invoked defensively
//! before first tenant use.

use crate::config::AppConfig;
use crate::directory::DirectoryStore;
use crate::error::{AppError, ProvisionStep};
use crate::migration::MigrationRunner;
use sqlx::postgres::PgPoolOptions;
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a successful provisioning run.
#[derive(Clone, Debug)]
pub struct ProvisionedStore {
    pub tenant_id: Uuid,
    pub database_name: String,
    /// Migration versions applied by this run; empty when the store was
    /// already up to date.
    pub applied: Vec<i64>,
}

/// Attempts at committing a freshly synthesized locator before giving up.
/// A retry only happens when the synthesized name itself collides, which a
/// uuid suffix makes vanishingly rare.
const LOCATOR_ATTEMPTS: usize = 3;

pub struct Provisioner {
    directory: Arc<dyn DirectoryStore>,
    config: Arc<AppConfig>,
    runner: Arc<dyn MigrationRunner>,
}

impl Provisioner {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        config: Arc<AppConfig>,
        runner: Arc<dyn MigrationRunner>,
    ) -> Self {
        Provisioner {
            directory,
            config,
            runner,
        }
    }

    /// Bring the tenant's store to a connectable, fully migrated state.
    /// Concurrent calls for the same tenant converge on one locator and one
    /// physical database; the second caller observes the first one's work
    /// and skips the already-done steps.
    pub async fn ensure_provisioned(&self, tenant_id: Uuid) -> Result<ProvisionedStore, AppError> {
        let record = self
            .directory
            .find_any_by_id(tenant_id)
            .await
            .map_err(|e| step_error(tenant_id, ProvisionStep::Lookup, e))?
            .ok_or_else(|| AppError::NotFound(format!("tenant {}", tenant_id)))?;

        let database_name = match record.database_name {
            Some(name) => name,
            None => self
                .assign_locator(tenant_id)
                .await
                .map_err(|e| step_error(tenant_id, ProvisionStep::AssignLocator, e))?,
        };

        self.ensure_database_exists(&database_name)
            .await
            .map_err(|e| step_error(tenant_id, ProvisionStep::CreateDatabase, e))?;

        let pool = self
            .connect(&database_name)
            .await
            .map_err(|e| step_error(tenant_id, ProvisionStep::Connect, e))?;

        let applied = self
            .migrate(&pool)
            .await
            .map_err(|e| step_error(tenant_id, ProvisionStep::Migrate, e))?;
        pool.close().await;

        tracing::info!(
            tenant = %tenant_id,
            database = %database_name,
            applied = applied.len(),
            "tenant store provisioned"
        );
        Ok(ProvisionedStore {
            tenant_id,
            database_name,
            applied,
        })
    }

    /// Synthesize a locator and commit it to the tenant record. Losing the
    /// atomic update race means another caller assigned one first; reuse
    /// theirs. A unique-index collision on the name itself retries with a
    /// fresh name so the conflict never surfaces to the caller.
    async fn assign_locator(&self, tenant_id: Uuid) -> Result<String, AppError> {
        for _ in 0..LOCATOR_ATTEMPTS {
            let candidate = synthesize_database_name();
            match self.directory.assign_database_name(tenant_id, &candidate).await {
                Ok(true) => return Ok(candidate),
                Ok(false) => {
                    let record = self
                        .directory
                        .find_any_by_id(tenant_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("tenant {}", tenant_id)))?;
                    return record.database_name.ok_or_else(|| {
                        AppError::Conflict(format!("tenant {} locator assignment raced", tenant_id))
                    });
                }
                // The id race is handled by the Ok(false) arm, so a Conflict
                // here can only mean the candidate name itself collided.
                Err(AppError::Conflict(_)) => {
                    tracing::warn!(tenant = %tenant_id, candidate = %candidate, "locator collision, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Conflict(format!(
            "could not synthesize a unique locator for tenant {}",
            tenant_id
        )))
    }

    /// Create the physical database if missing. Runs CREATE DATABASE from an
    /// admin connection to the `postgres` database; existence check first
    /// keeps re-runs cheap and concurrent creation survivable.
    async fn ensure_database_exists(&self, database_name: &str) -> Result<(), AppError> {
        let admin_url = admin_url(&self.config.tenant_url(database_name))?;
        let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
            .map_err(|e| AppError::BadRequest(format!("invalid tenant database url: {}", e)))?;
        let mut conn: sqlx::PgConnection = opts.connect().await?;

        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(database_name)
                .fetch_one(&mut conn)
                .await?;
        if exists.0 {
            tracing::debug!(database = %database_name, "database already exists, skipping creation");
            return Ok(());
        }

        let result = sqlx::query(&format!("CREATE DATABASE {}", quote_ident(database_name)))
            .execute(&mut conn)
            .await;
        match result {
            Ok(_) => {
                tracing::info!(database = %database_name, "created tenant database");
                Ok(())
            }
            // A concurrent provisioner created it between check and create.
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("42P04") => Ok(()),
            Err(e) => Err(AppError::Db(e)),
        }
    }

    /// Connect to the tenant store and apply pending migrations in order.
    async fn migrate(&self, pool: &PgPool) -> Result<Vec<i64>, AppError> {
        // Verifies connectivity before consulting the migration runner.
        sqlx::query("SELECT 1").execute(pool).await?;
        let pending = self.runner.pending(pool).await?;
        if pending.is_empty() {
            return Ok(pending);
        }
        tracing::info!(count = pending.len(), "applying pending migrations");
        self.runner.apply(pool, &pending).await?;
        Ok(pending)
    }

    async fn connect(&self, database_name: &str) -> Result<PgPool, AppError> {
        let url = self.config.tenant_url(database_name);
        Ok(PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await?)
    }
}

fn step_error(tenant: Uuid, step: ProvisionStep, e: AppError) -> AppError {
    match e {
        // Already classified; keep the original step attribution.
        AppError::Provisioning { .. } | AppError::NotFound(_) => e,
        other => AppError::Provisioning {
            tenant,
            step,
            detail: other.to_string(),
        },
    }
}

/// Ensure the database named in `database_url` exists, creating it from an
/// admin connection if not. Used at startup for the directory database.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let path_start = database_url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("database url has no path".into()))?
        + 1;
    let db_name = database_url
        .get(path_start..)
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("")
        .trim();
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }

    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url(database_url)?)
        .map_err(|e| AppError::BadRequest(format!("invalid database url: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&mut conn)
            .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

/// Globally unique physical database name for a new tenant store.
pub fn synthesize_database_name() -> String {
    format!("erp_tenant_{}", Uuid::new_v4().simple())
}

/// Strip the database path from a tenant URL, pointing it at `postgres` so
/// CREATE DATABASE can run outside the target database.
fn admin_url(url: &str) -> Result<String, AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("tenant database url has no path".into()))?
        + 1;
    let base = url.get(..path_start).unwrap_or(url);
    let query = url
        .get(path_start..)
        .and_then(|rest| rest.find('?').map(|q| &rest[q..]))
        .unwrap_or("");
    Ok(format!("{}postgres{}", base, query))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionStrategy;
    use crate::directory::{MockDirectoryStore, TenantRecord, TenantStatus};
    use crate::migration::SqlMigrationRunner;
    use chrono::Utc;
    use std::time::Duration;

    fn config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            strategy: ResolutionStrategy::Header,
            directory_url: "postgres://localhost/erp".into(),
            tenant_url_template: "postgres://localhost/{database}".into(),
            validation_ttl: Duration::from_secs(300),
            connection_string_ttl: Duration::from_secs(3600),
            tenant_select_path: "/tenant/select".into(),
            tenant_pool_size: 2,
        })
    }

    fn provisioner(directory: MockDirectoryStore) -> Provisioner {
        Provisioner::new(
            Arc::new(directory),
            config(),
            Arc::new(SqlMigrationRunner::new(Vec::new())),
        )
    }

    fn record(id: Uuid, database_name: Option<&str>) -> TenantRecord {
        TenantRecord {
            id,
            name: "acme".into(),
            currency_code: "EGP".into(),
            status: TenantStatus::Active,
            database_name: database_name.map(String::from),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn assign_locator_commits_a_synthesized_name() {
        let mut dir = MockDirectoryStore::new();
        dir.expect_assign_database_name()
            .times(1)
            .returning(|_, _| Ok(true));

        let name = provisioner(dir).assign_locator(Uuid::new_v4()).await.unwrap();
        assert!(name.starts_with("erp_tenant_"));
    }

    #[tokio::test]
    async fn lost_assignment_race_reuses_the_winner_locator() {
        let mut dir = MockDirectoryStore::new();
        dir.expect_assign_database_name()
            .times(1)
            .returning(|_, _| Ok(false));
        // The loser re-reads the record and adopts the committed locator.
        dir.expect_find_any_by_id()
            .times(1)
            .returning(|id| Ok(Some(record(id, Some("erp_tenant_winner")))));

        let name = provisioner(dir).assign_locator(Uuid::new_v4()).await.unwrap();
        assert_eq!(name, "erp_tenant_winner");
    }

    #[tokio::test]
    async fn locator_collision_retries_with_a_fresh_name() {
        let mut dir = MockDirectoryStore::new();
        let mut seq = mockall::Sequence::new();
        dir.expect_assign_database_name()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, name| {
                Err(AppError::Conflict(format!(
                    "store locator already in use: {}",
                    name
                )))
            });
        dir.expect_assign_database_name()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));

        assert!(provisioner(dir).assign_locator(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn exhausted_locator_attempts_surface_as_conflict() {
        let mut dir = MockDirectoryStore::new();
        dir.expect_assign_database_name()
            .times(LOCATOR_ATTEMPTS)
            .returning(|_, name| {
                Err(AppError::Conflict(format!(
                    "store locator already in use: {}",
                    name
                )))
            });

        let err = provisioner(dir)
            .assign_locator(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn provisioning_an_unknown_tenant_is_not_found() {
        let mut dir = MockDirectoryStore::new();
        dir.expect_find_any_by_id().times(1).returning(|_| Ok(None));

        let err = provisioner(dir)
            .ensure_provisioned(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn synthesized_names_are_valid_and_unique() {
        let a = synthesize_database_name();
        let b = synthesize_database_name();
        assert_ne!(a, b);
        assert!(a.starts_with("erp_tenant_"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn admin_url_swaps_database_for_postgres() {
        assert_eq!(
            admin_url("postgres://user:pw@db:5432/erp_tenant_abc").unwrap(),
            "postgres://user:pw@db:5432/postgres"
        );
        assert_eq!(
            admin_url("postgres://db/erp_tenant_abc?sslmode=disable").unwrap(),
            "postgres://db/postgres?sslmode=disable"
        );
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn step_error_preserves_not_found() {
        let id = Uuid::new_v4();
        let e = step_error(id, ProvisionStep::Lookup, AppError::NotFound("tenant".into()));
        assert!(matches!(e, AppError::NotFound(_)));

        let e = step_error(
            id,
            ProvisionStep::Migrate,
            AppError::BadRequest("boom".into()),
        );
        match e {
            AppError::Provisioning { tenant, step, .. } => {
                assert_eq!(tenant, id);
                assert_eq!(step, ProvisionStep::Migrate);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
