//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Provisioning step names, used in logs and provisioning errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionStep {
    Lookup,
    AssignLocator,
    CreateDatabase,
    Connect,
    Migrate,
    /// The detached provisioning task itself failed (panicked or was
    /// aborted) before reporting a step of its own.
    Task,
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProvisionStep::Lookup => "lookup",
            ProvisionStep::AssignLocator => "assign_locator",
            ProvisionStep::CreateDatabase => "create_database",
            ProvisionStep::Connect => "connect",
            ProvisionStep::Migrate => "migrate",
            ProvisionStep::Task => "task",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    /// A guarded handler ran without the gate binding the request first.
    /// A router wiring bug, never the client's fault.
    #[error("not bound: {0}")]
    NotBound(String),
    /// Transient directory-store failure. Treated as "invalid tenant" for the
    /// current request and never cached, so the next request retries.
    #[error("tenant directory unavailable: {0}")]
    DirectoryUnavailable(String),
    /// A provisioning step failed. Full detail goes to logs; the HTTP body
    /// stays generic so no internals leak to the caller.
    #[error("provisioning tenant {tenant} failed at step {step}: {detail}")]
    Provisioning {
        tenant: Uuid,
        step: ProvisionStep,
        detail: String,
    },
}

impl AppError {
    /// True when the underlying database error is a unique-constraint
    /// violation (Postgres SQLSTATE 23505).
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Db(sqlx::Error::Database(e)) => e.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::Validation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                self.to_string(),
            ),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found", self.to_string())
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", self.to_string())
                }
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", self.to_string()),
            AppError::NotBound(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "tenant_not_bound",
                self.to_string(),
            ),
            AppError::DirectoryUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "directory_unavailable",
                "tenant directory unavailable".to_string(),
            ),
            AppError::Provisioning { tenant, step, .. } => {
                tracing::error!(tenant = %tenant, step = %step, error = %self, "provisioning failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "provisioning_failed",
                    "could not create company".to_string(),
                )
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_error_body_is_generic() {
        let err = AppError::Provisioning {
            tenant: Uuid::new_v4(),
            step: ProvisionStep::CreateDatabase,
            detail: "CREATE DATABASE failed: disk full".into(),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = AppError::NotFound("tenant x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn directory_unavailable_maps_to_503() {
        let resp = AppError::DirectoryUnavailable("timeout".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(ProvisionStep::AssignLocator.to_string(), "assign_locator");
        assert_eq!(ProvisionStep::Migrate.to_string(), "migrate");
        assert_eq!(ProvisionStep::Task.to_string(), "task");
    }

    #[test]
    fn unbound_request_is_a_server_error() {
        let resp = AppError::NotBound("no store bound to request".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
