// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider client (Identity Toolkit REST API).
//!
//! Handles:
//! - Email/password sign-in
//! - Account creation
//! - Password reset emails
//!
//! Errors are reported as [`ProviderError`] so the session layer can decide
//! between a credential rejection and an unreachable provider.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Account returned by a successful sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAccount {
    pub uid: String,
    pub email: String,
    pub id_token: String,
    pub refresh_token: String,
}

/// Identity provider failure categories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider refused the credentials (unknown user, wrong password,
    /// disabled account).
    #[error("credentials rejected: {0}")]
    Rejected(String),
    /// Sign-up failed because the email already has an account.
    #[error("account already exists")]
    AccountExists,
    /// The provider could not be reached or failed server-side.
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    /// Any other error reported by the provider.
    #[error("provider error: {0}")]
    Other(String),
}

/// Primary authentication capability.
pub trait AuthProvider: Send + Sync {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<ProviderAccount, ProviderError>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<ProviderAccount, ProviderError>> + Send;

    fn send_password_reset(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// End the provider session for `account`. Token-based providers have
    /// nothing to revoke client-side, so the default does nothing.
    fn sign_out(&self, _account: &ProviderAccount) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Identity Toolkit REST client.
#[derive(Clone)]
pub struct IdentityToolkitClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl IdentityToolkitClient {
    /// Create a new client for `base_url` (e.g. `https://identitytoolkit.googleapis.com/v1`).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// POST a JSON body to an `accounts:*` endpoint and parse the response.
    async fn post<B, T>(&self, method: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/accounts:{}", self.base_url, method);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ProviderError::Other(format!("JSON parse error: {}", e)));
        }

        if status.is_server_error() {
            return Err(ProviderError::Unreachable(format!("HTTP {}", status)));
        }

        let body = response.text().await.unwrap_or_default();
        let code = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", status));

        Err(classify_error_code(&code))
    }
}

/// Map an Identity Toolkit error code to a [`ProviderError`].
///
/// Codes may carry a suffix, as in `WEAK_PASSWORD : Password should be at least 6 characters`.
pub fn classify_error_code(code: &str) -> ProviderError {
    let head = code.split(':').next().unwrap_or(code).trim();
    match head {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED"
        | "INVALID_EMAIL" => ProviderError::Rejected(head.to_string()),
        "EMAIL_EXISTS" => ProviderError::AccountExists,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => ProviderError::Unreachable(head.to_string()),
        _ => ProviderError::Other(code.to_string()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    refresh_token: String,
}

impl AccountResponse {
    fn into_account(self, requested_email: &str) -> ProviderAccount {
        ProviderAccount {
            uid: self.local_id,
            email: if self.email.is_empty() {
                requested_email.to_string()
            } else {
                self.email
            },
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        }
    }
}

#[derive(Deserialize)]
struct OobCodeResponse {}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl AuthProvider for IdentityToolkitClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderAccount, ProviderError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post("signInWithPassword", &request).await?;
        Ok(response.into_account(email))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderAccount, ProviderError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post("signUp", &request).await?;
        tracing::info!(email, uid = %response.local_id, "Provider account created");
        Ok(response.into_account(email))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let request = OobCodeRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        let _: OobCodeResponse = self.post("sendOobCode", &request).await?;
        Ok(())
    }
}
