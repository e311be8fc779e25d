// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session token authentication middleware.
//!
//! The agent hands UI surfaces an HS256 token at login. A token is only
//! honoured while its subject is still the device's signed-in user, so
//! logout and inactivity expiry invalidate outstanding tokens.

use crate::db::UserRecordStore;
use crate::services::{AuthProvider, KvStore};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "campus_session";

/// Session token lifetime.
pub const SESSION_TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from the session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Middleware that requires a valid token for the current session.
pub async fn require_auth<A, S, K>(
    State(state): State<Arc<AppState<A, S, K>>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token.to_string(),
            None => return Err(StatusCode::UNAUTHORIZED),
        }
    };

    let claims = verify_session_token(&token, &state.config.session_signing_key)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let is_current = state
        .sessions
        .current_user()
        .is_some_and(|user| user.id == claims.sub);
    if !is_current {
        return Err(StatusCode::UNAUTHORIZED);
    }

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
    });

    Ok(next.run(request).await)
}

/// Create a session token for `user_id`.
pub fn create_session_token(user_id: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = crate::time_utils::unix_now() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + SESSION_TOKEN_TTL_SECS as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

/// Decode and validate a session token.
pub fn verify_session_token(token: &str, signing_key: &[u8]) -> anyhow::Result<Claims> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    Ok(decode::<Claims>(token, &key, &validation)?.claims)
}
