//! Unified application error model and mapping helpers.
//! This module provides the common error enum used across the HTTP layer and
//! the post/identity services, along with the mapping to HTTP status codes.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::storage::StoreError;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// One or more field-level rule violations on create; carries the full set
    /// of failing fields so the caller can re-render input with per-field
    /// messages.
    Validation { fields: BTreeMap<String, Vec<String>> },
    /// Unknown username or wrong password on login.
    InvalidCredentials,
    /// No resolvable identity at all; log in and resume at `return_to`.
    AuthenticationRequired { return_to: String },
    /// Identity is known but the action is not permitted for it.
    Denied { return_to: String },
    NotFound { message: String },
    /// Store-level failure; details are logged, never surfaced to the caller.
    Persistence { message: String },
    Internal { message: String },
}

impl AppError {
    pub fn validation(errors: ValidationErrors) -> Self {
        AppError::Validation {
            fields: errors.into_fields(),
        }
    }

    pub fn invalid_credentials() -> Self {
        AppError::InvalidCredentials
    }

    pub fn auth_required<S: Into<String>>(return_to: S) -> Self {
        AppError::AuthenticationRequired {
            return_to: return_to.into(),
        }
    }

    pub fn denied<S: Into<String>>(return_to: S) -> Self {
        AppError::Denied {
            return_to: return_to.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        AppError::NotFound {
            message: message.into(),
        }
    }

    pub fn persistence() -> Self {
        AppError::Persistence {
            message: "storage failure".into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        AppError::Internal {
            message: message.into(),
        }
    }

    /// The destination to resume at after re-authenticating, when the denial
    /// carries one.
    pub fn return_to(&self) -> Option<&str> {
        match self {
            AppError::AuthenticationRequired { return_to } | AppError::Denied { return_to } => {
                Some(return_to.as_str())
            }
            _ => None,
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 422,
            AppError::InvalidCredentials => 403,
            AppError::AuthenticationRequired { .. } => 401,
            AppError::Denied { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Persistence { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Validation { fields } => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                write!(f, "validation failed on: {}", names.join(", "))
            }
            AppError::InvalidCredentials => write!(f, "invalid credentials"),
            AppError::AuthenticationRequired { .. } => {
                write!(f, "you must be logged in to access this page")
            }
            AppError::Denied { .. } => {
                write!(f, "you do not have permission to access this page")
            }
            AppError::NotFound { message }
            | AppError::Persistence { message }
            | AppError::Internal { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(errors) => AppError::validation(errors),
            StoreError::NotFound { entity, id } => {
                AppError::not_found(format!("{} {} not found", entity, id))
            }
            // Referential and I/O failures are internal detail: log the
            // specifics here, hand the caller a generic message.
            other => {
                tracing::error!(target: "userposts::storage", "persistence failure: {}", other);
                AppError::persistence()
            }
        }
    }
}
