//! erp-tenancy: multi-tenant accounting backend core. Resolves the tenant
//! for each request, validates it against a shared directory, provisions
//! per-tenant PostgreSQL databases on demand, and binds every request to a
//! store handle for exactly one tenant.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod extractors;
pub mod finance;
pub mod gate;
pub mod handle;
pub mod handlers;
pub mod migration;
pub mod provision;
pub mod resolver;
pub mod response;
pub mod routes;
pub mod state;
pub mod validator;

pub use config::{AppConfig, ResolutionStrategy};
pub use directory::{ensure_directory_tables, DirectoryStore, PgDirectory, TenantRecord, TenantStatus};
pub use error::{AppError, ProvisionStep};
pub use extractors::{BoundStore, CurrentTenant};
pub use gate::tenant_gate;
pub use handle::{HandleFactory, StoreHandle};
pub use migration::{MigrationRunner, SqlMigrationRunner};
pub use provision::{ensure_database_exists, ProvisionedStore, Provisioner};
pub use resolver::{resolve, IdentityClaims, ResolutionInput};
pub use response::{success_many, success_one};
pub use routes::{common_routes, finance_routes, tenant_routes};
pub use state::AppState;
pub use validator::{CachingValidator, TenantValidator};
