//! Shared application state wired once at startup and cloned per request.

use crate::config::AppConfig;
use crate::directory::PgDirectory;
use crate::handle::HandleFactory;
use crate::migration::SqlMigrationRunner;
use crate::provision::Provisioner;
use crate::validator::{CachingValidator, TenantValidator};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Pool for the directory database; also the default store for
    /// anonymous/bootstrap requests.
    pub directory_pool: PgPool,
    pub directory: PgDirectory,
    pub validator: Arc<dyn TenantValidator>,
    pub factory: Arc<HandleFactory>,
    pub provisioner: Arc<Provisioner>,
}

impl AppState {
    /// Wire the default component stack over one directory pool.
    pub fn new(config: AppConfig, directory_pool: PgPool) -> Self {
        let config = Arc::new(config);
        let directory = PgDirectory::new(directory_pool.clone());
        let validator = Arc::new(CachingValidator::new(
            Arc::new(directory.clone()),
            config.validation_ttl,
        ));
        let factory = Arc::new(HandleFactory::new(config.clone(), directory_pool.clone()));
        let runner = SqlMigrationRunner::baseline();
        tracing::debug!(
            schema_version = runner.latest_version(),
            "tenant migration set loaded"
        );
        let provisioner = Arc::new(Provisioner::new(
            Arc::new(directory.clone()),
            config.clone(),
            Arc::new(runner),
        ));
        AppState {
            config,
            directory_pool,
            directory,
            validator,
            factory,
            provisioner,
        }
    }

    /// Replace the validator, keeping the rest of the wiring. Used by tests
    /// to stub directory access.
    pub fn with_validator(mut self, validator: Arc<dyn TenantValidator>) -> Self {
        self.validator = validator;
        self
    }
}
