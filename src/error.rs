// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Every error that leaves the session layer is one of these variants. The
//! variants split into two groups: expected, user-correctable outcomes
//! ("silent", never logged at error level) and unexpected failures that are
//! logged once and surfaced with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email address already registered")]
    EmailInUse,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Authentication provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("Authentication provider error: {0}")]
    Provider(String),

    #[error("Document store error: {0}")]
    DocumentStore(String),

    #[error("Session cache error: {0}")]
    SessionCache(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable tag for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "invalid-credentials",
            AppError::EmailInUse => "email-in-use",
            AppError::BadRequest(_) => "bad-request",
            AppError::Unauthorized => "unauthorized",
            AppError::ProviderUnreachable(_) => "provider-unreachable",
            AppError::Provider(_) => "provider-error",
            AppError::DocumentStore(_) => "document-store-error",
            AppError::SessionCache(_) => "session-cache-error",
            AppError::Internal(_) => "unknown",
        }
    }

    /// Expected outcomes that the user can correct. These are never logged
    /// at error level.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            AppError::InvalidCredentials
                | AppError::EmailInUse
                | AppError::BadRequest(_)
                | AppError::Unauthorized
        )
    }

    /// Message safe to show to an end user. Never includes backend detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "Invalid email or password.",
            AppError::EmailInUse => "An account with this email already exists.",
            AppError::BadRequest(_) => "The request was invalid. Please check your input.",
            AppError::Unauthorized => "Please sign in to continue.",
            AppError::ProviderUnreachable(_) => {
                "The sign-in service is unavailable. Please try again later."
            }
            AppError::Provider(_)
            | AppError::DocumentStore(_)
            | AppError::SessionCache(_)
            | AppError::Internal(_) => "Something went wrong. Please try again.",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::EmailInUse => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::DocumentStore(_) | AppError::SessionCache(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Logging happens at the classification point in the session layer;
        // here only the sanitized shape goes out.
        let body = ErrorResponse {
            error: self.kind(),
            message: self.user_message(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
