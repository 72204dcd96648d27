//! Tenant validation against the directory, memoized with a short TTL.

use crate::cache::TtlCache;
use crate::directory::{DirectoryStore, TenantRecord};
use crate::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Cached outcome of one directory lookup. Negative outcomes are cached too
/// so a burst of requests for a ghost tenant does not hammer the directory.
#[derive(Clone, Debug)]
struct ValidationEntry {
    valid: bool,
    record: Option<TenantRecord>,
}

/// Validation surface consumed by the request gate and tenant handlers.
#[async_trait]
pub trait TenantValidator: Send + Sync {
    /// True when the identifier names an Active tenant.
    async fn validate(&self, identifier: &str) -> bool;
    /// Directory snapshot for the identifier, if valid.
    async fn tenant(&self, identifier: &str) -> Option<TenantRecord>;
    /// Drop any cached outcome for the identifier. No-op for validators
    /// without a cache.
    fn invalidate(&self, _identifier: &str) {}
}

/// Directory-backed validator with a TTL cache. The identifier may be the
/// surrogate id or the display name; id parse is attempted first since the
/// subdomain strategy supplies names and API clients supply ids.
pub struct CachingValidator {
    directory: Arc<dyn DirectoryStore>,
    cache: TtlCache<String, ValidationEntry>,
}

impl CachingValidator {
    pub fn new(directory: Arc<dyn DirectoryStore>, ttl: Duration) -> Self {
        CachingValidator {
            directory,
            cache: TtlCache::new(ttl),
        }
    }

    /// Look up, caching the outcome. Directory failures are reported as
    /// invalid but never cached, so a transient outage is retried on the
    /// next request instead of being pinned for a full TTL.
    async fn entry(&self, identifier: &str) -> ValidationEntry {
        if let Some(entry) = self.cache.get(&identifier.to_string()) {
            return entry;
        }

        let looked_up = self.lookup(identifier).await;
        match looked_up {
            Ok(record) => {
                let entry = ValidationEntry {
                    valid: record.is_some(),
                    record,
                };
                self.cache.insert(identifier.to_string(), entry.clone());
                entry
            }
            Err(e) => {
                tracing::error!(tenant = identifier, error = %e, "tenant validation failed");
                ValidationEntry {
                    valid: false,
                    record: None,
                }
            }
        }
    }

    async fn lookup(&self, identifier: &str) -> Result<Option<TenantRecord>, AppError> {
        match Uuid::parse_str(identifier) {
            Ok(id) => self.directory.find_by_id(id).await,
            Err(_) => self.directory.find_by_name(identifier).await,
        }
    }
}

#[async_trait]
impl TenantValidator for CachingValidator {
    async fn validate(&self, identifier: &str) -> bool {
        if identifier.is_empty() {
            return false;
        }
        self.entry(identifier).await.valid
    }

    async fn tenant(&self, identifier: &str) -> Option<TenantRecord> {
        if identifier.is_empty() {
            return None;
        }
        self.entry(identifier).await.record
    }

    /// Used after status changes or defensive provisioning so the next
    /// lookup sees fresh directory state without waiting out the TTL.
    fn invalidate(&self, identifier: &str) {
        self.cache.invalidate(&identifier.to_string());
    }
}
