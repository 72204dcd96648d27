//! Per-request store handles. A handle is built once per request, bound to
//! exactly one backing database, and dropped with the request scope. The
//! underlying connection pools are shared per database; the handle itself
//! never crosses requests or tenants.

use crate::cache::TtlCache;
use crate::config::AppConfig;
use crate::directory::TenantRecord;
use crate::error::AppError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Data-access handle for one unit of work. Cheap to clone within the
/// request; carries the tenant binding for logging and scoped queries.
#[derive(Clone)]
pub struct StoreHandle {
    /// None on the anonymous/bootstrap path (default store).
    pub tenant_id: Option<Uuid>,
    pool: PgPool,
}

impl StoreHandle {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Builds request-scoped handles. Connection strings are cached with a long
/// TTL (locators are immutable once assigned); pools are registered per
/// database name and connect lazily on first acquire.
pub struct HandleFactory {
    config: Arc<AppConfig>,
    connection_strings: TtlCache<String, String>,
    pools: dashmap::DashMap<String, PgPool>,
    default_pool: PgPool,
}

impl HandleFactory {
    pub fn new(config: Arc<AppConfig>, default_pool: PgPool) -> Self {
        let connection_strings = TtlCache::new(config.connection_string_ttl);
        HandleFactory {
            config,
            connection_strings,
            pools: dashmap::DashMap::new(),
            default_pool,
        }
    }

    /// Handle for a resolved tenant. The snapshot must carry a locator;
    /// callers provision defensively before calling this when it does not.
    pub fn for_tenant(&self, record: &TenantRecord) -> Result<StoreHandle, AppError> {
        let database_name = record.database_name.as_deref().ok_or_else(|| {
            AppError::Validation(format!("tenant {} has no provisioned store", record.id))
        })?;
        let pool = self.pool_for(database_name)?;
        Ok(StoreHandle {
            tenant_id: Some(record.id),
            pool,
        })
    }

    /// Handle bound to the default store, for anonymous/bootstrap paths.
    pub fn default_handle(&self) -> StoreHandle {
        StoreHandle {
            tenant_id: None,
            pool: self.default_pool.clone(),
        }
    }

    /// Drop the cached connection string for a locator. Called when a
    /// locator is freshly assigned so the next bind computes its URL from
    /// current configuration.
    pub fn invalidate(&self, database_name: &str) {
        self.connection_strings.invalidate(&database_name.to_string());
    }

    fn pool_for(&self, database_name: &str) -> Result<PgPool, AppError> {
        if let Some(pool) = self.pools.get(database_name) {
            return Ok(pool.clone());
        }

        let key = database_name.to_string();
        let url = match self.connection_strings.get(&key) {
            Some(url) => url,
            None => {
                let url = self.config.tenant_url(database_name);
                self.connection_strings.insert(key.clone(), url.clone());
                url
            }
        };

        // connect_lazy defers I/O to first acquire, so handle construction
        // never blocks the gate. The entry API arbitrates a concurrent
        // insert: first writer wins, later pools are dropped unused.
        let pool = PgPoolOptions::new()
            .max_connections(self.config.tenant_pool_size)
            .connect_lazy(&url)
            .map_err(|e| AppError::BadRequest(format!("invalid tenant database url: {}", e)))?;
        let pool = self
            .pools
            .entry(key)
            .or_insert(pool)
            .clone();
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolutionStrategy;
    use crate::directory::TenantStatus;
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

    fn factory() -> HandleFactory {
        let cfg = config();
        let default_pool = PgPoolOptions::new()
            .connect_lazy(&cfg.directory_url)
            .unwrap();
        HandleFactory::new(cfg, default_pool)
    }

    fn record(database_name: Option<&str>) -> TenantRecord {
        TenantRecord {
            id: Uuid::new_v4(),
            name: "acme".into(),
            currency_code: "EGP".into(),
            status: TenantStatus::Active,
            database_name: database_name.map(String::from),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn handle_is_bound_to_the_tenant() {
        let f = factory();
        let r = record(Some("erp_tenant_a"));
        let handle = f.for_tenant(&r).unwrap();
        assert_eq!(handle.tenant_id, Some(r.id));
    }

    #[tokio::test]
    async fn missing_locator_is_rejected() {
        let f = factory();
        let err = f.for_tenant(&record(None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn default_handle_has_no_tenant() {
        let f = factory();
        assert_eq!(f.default_handle().tenant_id, None);
    }

    #[tokio::test]
    async fn pools_are_registered_per_database() {
        let f = factory();
        f.for_tenant(&record(Some("erp_tenant_a"))).unwrap();
        f.for_tenant(&record(Some("erp_tenant_a"))).unwrap();
        f.for_tenant(&record(Some("erp_tenant_b"))).unwrap();
        assert_eq!(f.pools.len(), 2);
    }
}
