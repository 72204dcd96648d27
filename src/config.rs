//! Application configuration from environment variables.

use std::time::Duration;

/// How the tenant identifier is extracted from an inbound request.
/// Strategies are tried in isolation, never chained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// `X-Tenant-ID` request header (API clients).
    Header,
    /// First label of the request host (e.g. `acme.example.com` -> `acme`).
    Subdomain,
    /// `tenant_id` claim on the authenticated identity.
    Claim,
    /// `TenantId` key in server-side session state (browser flows).
    Session,
}

impl ResolutionStrategy {
    /// Parse a configured strategy name. Unknown names fall back to Header;
    /// the fallback is logged once at startup, not per request.
    pub fn parse_or_default(s: &str) -> ResolutionStrategy {
        match s.to_lowercase().as_str() {
            "header" => ResolutionStrategy::Header,
            "subdomain" => ResolutionStrategy::Subdomain,
            "claim" => ResolutionStrategy::Claim,
            "session" => ResolutionStrategy::Session,
            other => {
                tracing::warn!(
                    strategy = other,
                    "unknown tenant resolution strategy, falling back to header"
                );
                ResolutionStrategy::Header
            }
        }
    }
}

/// Placeholder replaced with the tenant database name in the URL template.
pub const DATABASE_PLACEHOLDER: &str = "{database}";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub strategy: ResolutionStrategy,
    /// Connection URL for the tenant directory database.
    pub directory_url: String,
    /// URL template for tenant databases; must contain `{database}`.
    pub tenant_url_template: String,
    /// TTL for cached validation outcomes (positive and negative).
    pub validation_ttl: Duration,
    /// TTL for cached connection strings. Locators are effectively
    /// immutable once assigned, so this is much longer.
    pub connection_string_ttl: Duration,
    /// Redirect target when no valid tenant is bound.
    pub tenant_select_path: String,
    pub tenant_pool_size: u32,
}

impl AppConfig {
    /// Load from environment. `DATABASE_URL` is the only required variable;
    /// the tenant template defaults to the directory URL with the database
    /// name swapped for the placeholder.
    pub fn from_env() -> Result<AppConfig, crate::error::AppError> {
        let directory_url = std::env::var("DATABASE_URL").map_err(|_| {
            crate::error::AppError::BadRequest("DATABASE_URL must be set".into())
        })?;
        let strategy_name =
            std::env::var("ERP_TENANT_RESOLUTION").unwrap_or_else(|_| "header".into());
        let tenant_url_template = std::env::var("ERP_TENANT_DATABASE_URL_TEMPLATE")
            .unwrap_or_else(|_| default_template(&directory_url));
        if !tenant_url_template.contains(DATABASE_PLACEHOLDER) {
            return Err(crate::error::AppError::BadRequest(format!(
                "ERP_TENANT_DATABASE_URL_TEMPLATE must contain {}",
                DATABASE_PLACEHOLDER
            )));
        }

        Ok(AppConfig {
            strategy: ResolutionStrategy::parse_or_default(&strategy_name),
            directory_url,
            tenant_url_template,
            validation_ttl: Duration::from_secs(env_u64("ERP_VALIDATION_TTL_SECS", 300)),
            connection_string_ttl: Duration::from_secs(env_u64(
                "ERP_CONNECTION_STRING_TTL_SECS",
                3600,
            )),
            tenant_select_path: std::env::var("ERP_TENANT_SELECT_PATH")
                .unwrap_or_else(|_| "/tenant/select".into()),
            tenant_pool_size: env_u64("ERP_TENANT_POOL_SIZE", 5) as u32,
        })
    }

    /// Connection URL for one tenant database.
    pub fn tenant_url(&self, database_name: &str) -> String {
        self.tenant_url_template
            .replace(DATABASE_PLACEHOLDER, database_name)
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Swap the database name in a postgres URL for the template placeholder.
fn default_template(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) => {
            let (base, rest) = url.split_at(idx + 1);
            let query = rest.find('?').map(|q| &rest[q..]).unwrap_or("");
            format!("{}{}{}", base, DATABASE_PLACEHOLDER, query)
        }
        None => format!("{}/{}", url, DATABASE_PLACEHOLDER),
    }
}
