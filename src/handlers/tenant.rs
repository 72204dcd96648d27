//! Tenant selection and onboarding handlers.

use crate::directory::{DirectoryStore, TenantRecord};
use crate::error::AppError;
use crate::gate::{clear_tenant_session, provision_detached, resolution_input};
use crate::resolver::{
    resolve, IdentityClaims, SESSION_COMPANY_NAME, SESSION_CURRENCY_CODE, SESSION_TENANT_ID,
};
use crate::response::{success_many, success_one, success_one_ok, SuccessMany, SuccessOne};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Redirect,
    Extension, Json,
};
use serde::Deserialize;
use tower_sessions::Session;

const DEFAULT_CURRENCY: &str = "EGP";

/// GET /tenant/select — Active tenants, for the selection UI.
pub async fn list_tenants(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SuccessMany<TenantRecord>>), AppError> {
    let tenants = state.directory.list_active().await?;
    Ok(success_many(tenants))
}

#[derive(Deserialize)]
pub struct SelectTenantRequest {
    pub tenant_id: String,
}

/// POST /tenant/select — validate the chosen tenant and store it in the
/// session, together with display attributes.
pub async fn select_tenant(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<SelectTenantRequest>,
) -> Result<(StatusCode, Json<SuccessOne<TenantRecord>>), AppError> {
    if body.tenant_id.trim().is_empty() {
        return Err(AppError::Validation("please select a company".into()));
    }
    let record = state
        .validator
        .tenant(&body.tenant_id)
        .await
        .ok_or_else(|| AppError::Validation("invalid company selected".into()))?;

    session
        .insert(SESSION_TENANT_ID, body.tenant_id.clone())
        .await
        .map_err(|e| AppError::BadRequest(format!("session: {}", e)))?;
    session
        .insert(SESSION_COMPANY_NAME, record.name.clone())
        .await
        .map_err(|e| AppError::BadRequest(format!("session: {}", e)))?;
    session
        .insert(SESSION_CURRENCY_CODE, record.currency_code.clone())
        .await
        .map_err(|e| AppError::BadRequest(format!("session: {}", e)))?;

    tracing::info!(tenant = %body.tenant_id, "tenant selected");
    Ok(success_one_ok(record))
}

/// POST /tenant/switch — clear the stored tenant and return to selection.
pub async fn switch_tenant(State(state): State<AppState>, session: Session) -> Redirect {
    clear_tenant_session(&session).await;
    Redirect::to(&state.config.tenant_select_path)
}

/// GET /tenant/current — resolve the current tenant with the configured
/// strategy and return its directory snapshot.
pub async fn current_tenant(
    State(state): State<AppState>,
    session: Option<Session>,
    claims: Option<Extension<IdentityClaims>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<SuccessOne<TenantRecord>>), AppError> {
    let input = resolution_input(&headers, claims.as_ref().map(|ext| &ext.0), session.as_ref()).await;
    let identifier = resolve(&input, state.config.strategy)
        .ok_or_else(|| AppError::NotFound("no tenant selected".into()))?;
    let record = state
        .validator
        .tenant(&identifier)
        .await
        .ok_or_else(|| AppError::NotFound(format!("tenant {}", identifier)))?;
    Ok(success_one_ok(record))
}

#[derive(Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub currency_code: Option<String>,
}

/// POST /tenant — onboard a new tenant: directory record, then store
/// provisioning. Provisioning detail stays in the logs; callers get either
/// the provisioned record or the generic failure body.
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(body): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<SuccessOne<TenantRecord>>), AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("company name is required".into()));
    }
    let currency = body
        .currency_code
        .as_deref()
        .unwrap_or(DEFAULT_CURRENCY)
        .to_uppercase();
    if currency.len() != 3 {
        return Err(AppError::Validation(
            "currency code must be three letters".into(),
        ));
    }

    let record = state.directory.create(name, &currency).await?;
    tracing::info!(tenant = %record.id, name = %record.name, "tenant created, provisioning store");

    // Detached so a dropped client connection cannot abandon the store
    // half-created; the handler still reports the outcome when it survives.
    let tenant_id = record.id;
    provision_detached(state.provisioner.clone(), tenant_id).await?;

    let record = state
        .directory
        .find_any_by_id(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tenant {}", tenant_id)))?;
    Ok(success_one(record))
}
