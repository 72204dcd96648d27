//! Tenant resolution: pure extraction of a candidate tenant identifier from
//! request signals. No I/O; the gate gathers the signals up front.

use crate::config::ResolutionStrategy;
use std::collections::HashMap;

/// Header name carrying the tenant id for API clients.
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";
/// Claim name on the authenticated identity.
pub const TENANT_ID_CLAIM: &str = "tenant_id";
/// Session key holding the selected tenant.
pub const SESSION_TENANT_ID: &str = "TenantId";
/// Session keys for tenant display attributes, cleared together on reject.
pub const SESSION_COMPANY_NAME: &str = "CompanyName";
pub const SESSION_CURRENCY_CODE: &str = "CurrencyCode";

/// Host labels that are never tenant identifiers.
const RESERVED_SUBDOMAINS: &[&str] = &["www", "api", "localhost"];

/// Claims attached to the authenticated identity by external auth
/// middleware, read via request extensions.
#[derive(Clone, Debug, Default)]
pub struct IdentityClaims(pub HashMap<String, String>);

/// Snapshot of the request signals the resolver may consult. Built once per
/// request by the gate so resolution itself stays synchronous and pure.
#[derive(Clone, Debug, Default)]
pub struct ResolutionInput {
    /// `X-Tenant-ID` header value, if present.
    pub header: Option<String>,
    /// Request host, without port.
    pub host: Option<String>,
    /// `tenant_id` claim from the authenticated identity.
    pub claim: Option<String>,
    /// `TenantId` from server-side session state.
    pub session: Option<String>,
}

/// Extract a candidate tenant identifier using the configured strategy.
/// Returns None when the selected strategy yields nothing; other signals are
/// never consulted as a fallback.
pub fn resolve(input: &ResolutionInput, strategy: ResolutionStrategy) -> Option<String> {
    let candidate = match strategy {
        ResolutionStrategy::Header => input.header.clone(),
        ResolutionStrategy::Subdomain => input.host.as_deref().and_then(subdomain_label),
        ResolutionStrategy::Claim => input.claim.clone(),
        ResolutionStrategy::Session => input.session.clone(),
    };
    candidate
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First label of a dotted host, unless reserved. A bare host (no dot) names
/// no tenant.
fn subdomain_label(host: &str) -> Option<String> {
    if !host.contains('.') {
        return None;
    }
    let label = host.split('.').next()?;
    if label.is_empty() || RESERVED_SUBDOMAINS.contains(&label) {
        return None;
    }
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ResolutionInput {
        ResolutionInput::default()
    }

    #[test]
    fn header_strategy_reads_header() {
        let mut i = input();
        i.header = Some("acme".into());
        assert_eq!(resolve(&i, ResolutionStrategy::Header), Some("acme".into()));
        assert_eq!(resolve(&input(), ResolutionStrategy::Header), None);
    }

    #[test]
    fn header_strategy_ignores_blank_values() {
        let mut i = input();
        i.header = Some("   ".into());
        assert_eq!(resolve(&i, ResolutionStrategy::Header), None);
    }

    #[test]
    fn subdomain_strategy_takes_first_label() {
        let mut i = input();
        i.host = Some("acme.example.com".into());
        assert_eq!(resolve(&i, ResolutionStrategy::Subdomain), Some("acme".into()));
    }

    #[test]
    fn subdomain_strategy_rejects_reserved_labels() {
        for host in ["www.example.com", "api.example.com", "localhost"] {
            let mut i = input();
            i.host = Some(host.into());
            assert_eq!(resolve(&i, ResolutionStrategy::Subdomain), None, "host {}", host);
        }
    }

    #[test]
    fn subdomain_strategy_requires_a_dot() {
        let mut i = input();
        i.host = Some("acme".into());
        assert_eq!(resolve(&i, ResolutionStrategy::Subdomain), None);
    }

    #[test]
    fn claim_strategy_reads_claim_only() {
        let mut i = input();
        i.claim = Some("acme".into());
        i.header = Some("other".into());
        assert_eq!(resolve(&i, ResolutionStrategy::Claim), Some("acme".into()));
    }

    #[test]
    fn session_strategy_reads_session_only() {
        let mut i = input();
        i.session = Some("acme".into());
        assert_eq!(resolve(&i, ResolutionStrategy::Session), Some("acme".into()));
        i.session = None;
        i.header = Some("other".into());
        assert_eq!(resolve(&i, ResolutionStrategy::Session), None);
    }
}
