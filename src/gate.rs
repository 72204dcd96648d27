//! Request gate: per-request tenant resolution, validation, and store
//! binding. Resolution and validation failures never reach handler code;
//! they terminate the pipeline as a redirect to tenant selection.

use crate::error::{AppError, ProvisionStep};
use crate::extractors::CurrentTenant;
use crate::provision::Provisioner;
use crate::resolver::{
    resolve, IdentityClaims, ResolutionInput, SESSION_COMPANY_NAME, SESSION_CURRENCY_CODE,
    SESSION_TENANT_ID, TENANT_ID_CLAIM, TENANT_ID_HEADER,
};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header::HOST, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tower_sessions::Session;
use uuid::Uuid;

/// Paths served without tenant binding: static assets and the tenant
/// selection surface itself.
const EXEMPT_PREFIXES: &[&str] = &["/css/", "/js/", "/lib/", "/images/", "/favicon.ico"];

/// Root of the tenant-selection endpoints, always reachable so a user with
/// no tenant can pick one.
const TENANT_ROOT: &str = "/tenant";

fn is_exempt(path: &str, tenant_select_path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
        || path.starts_with(&tenant_select_path.to_lowercase())
}

/// Gate middleware. Terminal states per request: pass-through (exempt path),
/// default-bound (anonymous request on the tenant-selection surface), reject
/// (redirect issued), or tenant-bound (extensions populated, pipeline
/// continues).
pub async fn tenant_gate(
    State(state): State<AppState>,
    session: Option<Session>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_lowercase();
    if is_exempt(&path, &state.config.tenant_select_path) {
        return next.run(req).await;
    }

    let claims = req.extensions().get::<IdentityClaims>().cloned();
    let input = resolution_input(req.headers(), claims.as_ref(), session.as_ref()).await;

    let Some(identifier) = resolve(&input, state.config.strategy) else {
        if path.starts_with(TENANT_ROOT) {
            // Anonymous bootstrap path: bound to the default store so the
            // selection and onboarding handlers still have a handle.
            req.extensions_mut().insert(state.factory.default_handle());
            return next.run(req).await;
        }
        tracing::warn!(path = %path, "no tenant context found, redirecting to tenant selection");
        return Redirect::to(&state.config.tenant_select_path).into_response();
    };

    let Some(record) = state.validator.tenant(&identifier).await else {
        tracing::warn!(tenant = %identifier, "invalid tenant, redirecting to tenant selection");
        if let Some(session) = &session {
            clear_tenant_session(session).await;
        }
        return Redirect::to(&state.config.tenant_select_path).into_response();
    };

    // Defensive provisioning for a tenant whose store was never created.
    let record = if record.database_name.is_none() {
        match provision_detached(state.provisioner.clone(), record.id).await {
            Ok(provisioned) => {
                state.validator.invalidate(&identifier);
                // Drop any stale cached connection string so the first bind
                // computes the URL for the freshly assigned locator.
                state.factory.invalidate(&provisioned.database_name);
                let mut record = record;
                record.database_name = Some(provisioned.database_name);
                record
            }
            Err(e) => return e.into_response(),
        }
    } else {
        record
    };

    let handle = match state.factory.for_tenant(&record) {
        Ok(handle) => handle,
        Err(e) => return e.into_response(),
    };

    tracing::debug!(tenant = %record.id, "request bound to tenant");
    req.extensions_mut().insert(CurrentTenant {
        id: record.id,
        name: record.name,
        currency_code: record.currency_code,
    });
    req.extensions_mut().insert(handle);
    next.run(req).await
}

/// Snapshot the request signals the resolver may consult. Shared with the
/// tenant-info handler, which resolves outside the gate.
pub async fn resolution_input(
    headers: &HeaderMap,
    claims: Option<&IdentityClaims>,
    session: Option<&Session>,
) -> ResolutionInput {
    let header = headers
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_string());
    let claim = claims.and_then(|c| c.0.get(TENANT_ID_CLAIM).cloned());
    let session_value = match session {
        Some(s) => s.get::<String>(SESSION_TENANT_ID).await.ok().flatten(),
        None => None,
    };
    ResolutionInput {
        header,
        host,
        claim,
        session: session_value,
    }
}

/// Clear the stored tenant identifier and display attributes.
pub async fn clear_tenant_session(session: &Session) {
    for key in [SESSION_TENANT_ID, SESSION_COMPANY_NAME, SESSION_CURRENCY_CODE] {
        if let Err(e) = session.remove::<String>(key).await {
            tracing::warn!(key = key, error = %e, "failed to clear session key");
        }
    }
}

/// Run provisioning on a detached task: an aborted request must not cancel
/// a store creation or migration mid-flight.
pub(crate) async fn provision_detached(
    provisioner: Arc<Provisioner>,
    tenant_id: Uuid,
) -> Result<crate::provision::ProvisionedStore, AppError> {
    let task = tokio::spawn(async move { provisioner.ensure_provisioned(tenant_id).await });
    match task.await {
        Ok(result) => result,
        Err(e) => Err(AppError::Provisioning {
            tenant: tenant_id,
            step: ProvisionStep::Task,
            detail: format!("provisioning task failed: {}", e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ResolutionStrategy};
    use crate::directory::{TenantRecord, TenantStatus};
    use crate::extractors::BoundStore;
    use crate::validator::TenantValidator;
    use async_trait::async_trait;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StubValidator {
        tenants: HashMap<String, TenantRecord>,
    }

    #[async_trait]
    impl TenantValidator for StubValidator {
        async fn validate(&self, identifier: &str) -> bool {
            self.tenants.contains_key(identifier)
        }

        async fn tenant(&self, identifier: &str) -> Option<TenantRecord> {
            self.tenants.get(identifier).cloned()
        }
    }

    fn record(name: &str) -> TenantRecord {
        TenantRecord {
            id: Uuid::new_v4(),
            name: name.into(),
            currency_code: "EGP".into(),
            status: TenantStatus::Active,
            database_name: Some(format!("erp_tenant_{}", name)),
            created_at: Utc::now(),
        }
    }

    fn test_state(strategy: ResolutionStrategy) -> AppState {
        let config = AppConfig {
            strategy,
            directory_url: "postgres://localhost/erp".into(),
            tenant_url_template: "postgres://localhost/{database}".into(),
            validation_ttl: Duration::from_secs(300),
            connection_string_ttl: Duration::from_secs(3600),
            tenant_select_path: "/tenant/select".into(),
            tenant_pool_size: 2,
        };
        // Lazy pool: the stubbed paths under test never touch the database.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.directory_url)
            .unwrap();
        let mut tenants = HashMap::new();
        tenants.insert("acme".to_string(), record("acme"));
        AppState::new(config, pool).with_validator(Arc::new(StubValidator { tenants }))
    }

    async fn dashboard(tenant: CurrentTenant, BoundStore(handle): BoundStore) -> String {
        assert_eq!(handle.tenant_id, Some(tenant.id));
        tenant.name
    }

    fn app(strategy: ResolutionStrategy) -> Router {
        let state = test_state(strategy);
        Router::new()
            .route("/dashboard", get(dashboard))
            .route("/css/site.css", get(|| async { "body {}" }))
            .route("/tenant/select", get(|| async { "pick a company" }))
            .layer(middleware::from_fn_with_state(state, tenant_gate))
    }

    fn request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn request_with_header(uri: &str, tenant: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .header(TENANT_ID_HEADER, tenant)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unresolved_request_redirects_to_tenant_selection() {
        let resp = app(ResolutionStrategy::Header)
            .oneshot(request("/dashboard"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers().get("location").unwrap(),
            "/tenant/select"
        );
    }

    #[tokio::test]
    async fn static_assets_pass_through() {
        let resp = app(ResolutionStrategy::Header)
            .oneshot(request("/css/site.css"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tenant_selection_passes_through() {
        let resp = app(ResolutionStrategy::Header)
            .oneshot(request("/tenant/select"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_tenant_is_bound() {
        let resp = app(ResolutionStrategy::Header)
            .oneshot(request_with_header("/dashboard", "acme"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_tenant_redirects() {
        let resp = app(ResolutionStrategy::Header)
            .oneshot(request_with_header("/dashboard", "ghost"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers().get("location").unwrap(),
            "/tenant/select"
        );
    }

    #[tokio::test]
    async fn subdomain_strategy_resolves_from_host() {
        let req = axum::http::Request::builder()
            .uri("/dashboard")
            .header("host", "acme.example.com")
            .body(Body::empty())
            .unwrap();
        let resp = app(ResolutionStrategy::Subdomain).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reserved_subdomain_redirects() {
        let req = axum::http::Request::builder()
            .uri("/dashboard")
            .header("host", "www.example.com")
            .body(Body::empty())
            .unwrap();
        let resp = app(ResolutionStrategy::Subdomain).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn header_is_ignored_under_subdomain_strategy() {
        // Strategies are isolated: a header cannot stand in for the host.
        let resp = app(ResolutionStrategy::Subdomain)
            .oneshot(request_with_header("/dashboard", "acme"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn anonymous_tenant_path_binds_the_default_store() {
        let state = test_state(ResolutionStrategy::Header);
        let router = Router::new()
            .route(
                "/tenant/bootstrap",
                get(|BoundStore(handle): BoundStore| async move {
                    assert!(handle.tenant_id.is_none());
                    "bootstrap"
                }),
            )
            .layer(middleware::from_fn_with_state(state, tenant_gate));

        let resp = router.oneshot(request("/tenant/bootstrap")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn guarded_handler_without_the_gate_is_a_server_error() {
        let router = Router::new().route("/dashboard", get(dashboard));
        let resp = router.oneshot(request("/dashboard")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn claim_strategy_reads_identity_claims() {
        let state = test_state(ResolutionStrategy::Claim);
        let router = Router::new()
            .route("/dashboard", get(dashboard))
            .layer(middleware::from_fn_with_state(state, tenant_gate));

        let mut req = request("/dashboard");
        let mut claims = HashMap::new();
        claims.insert(TENANT_ID_CLAIM.to_string(), "acme".to_string());
        req.extensions_mut().insert(IdentityClaims(claims));

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
