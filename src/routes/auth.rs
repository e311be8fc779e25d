// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes for local UI surfaces.

use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::db::UserRecordStore;
use crate::error::{AppError, Result};
use crate::middleware::auth::{create_session_token, AuthUser, SESSION_COOKIE};
use crate::models::User;
use crate::services::{ActivityKind, AuthProvider, KvStore};
use crate::AppState;

/// Routes that do not need a session.
pub fn routes<A, S, K>() -> Router<Arc<AppState<A, S, K>>>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    Router::new()
        .route("/auth/login", post(login::<A, S, K>))
        .route("/auth/signup", post(signup::<A, S, K>))
        .route("/auth/logout", post(logout::<A, S, K>))
        .route("/auth/password-reset", post(password_reset::<A, S, K>))
}

/// Routes that require the current session token.
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn protected_routes<A, S, K>() -> Router<Arc<AppState<A, S, K>>>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    Router::new()
        .route("/auth/session", get(get_session::<A, S, K>))
        .route("/auth/activity", post(record_activity::<A, S, K>))
}

// ─── Requests / Responses ────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 256))]
    pub password: String,
    #[validate(length(max = 100))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub kind: ActivityKind,
}

/// Successful login/signup.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
}

/// Current session details.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionStatusResponse {
    pub user: User,
    /// Whether the provider holds a live account for this session
    pub provider_linked: bool,
    /// Seconds until inactivity logout, if the timer is enabled
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub inactivity_remaining_secs: Option<u64>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

fn validate<T: Validate>(request: &T) -> Result<()> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

fn expired_session_cookie() -> Cookie<'static> {
    let mut cookie = session_cookie(String::new());
    cookie.make_removal();
    cookie
}

fn issue_session<A, S, K>(
    state: &AppState<A, S, K>,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let token = create_session_token(&user.id, &state.config.session_signing_key)?;
    let jar = jar.add(session_cookie(token.clone()));
    Ok((jar, Json(SessionResponse { user, token })))
}

// ─── Handlers ────────────────────────────────────────────────

/// Email/password login through the reconciliation flow.
async fn login<A, S, K>(
    State(state): State<Arc<AppState<A, S, K>>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    validate(&request)?;
    let user = state.sessions.login(&request.email, &request.password).await?;
    issue_session(&state, jar, user)
}

async fn signup<A, S, K>(
    State(state): State<Arc<AppState<A, S, K>>>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    validate(&request)?;
    let user = state
        .sessions
        .signup(&request.email, &request.password, request.name.as_deref())
        .await?;
    issue_session(&state, jar, user)
}

async fn logout<A, S, K>(
    State(state): State<Arc<AppState<A, S, K>>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>)>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    state.sessions.logout().await?;
    // Bearer-only clients send no cookie, so the expired one is always set.
    let jar = jar.add(expired_session_cookie());
    Ok((
        jar,
        Json(MessageResponse {
            success: true,
            message: "Signed out.".to_string(),
        }),
    ))
}

/// Always answers the same way so the endpoint cannot be used to probe
/// which emails have accounts.
async fn password_reset<A, S, K>(
    State(state): State<Arc<AppState<A, S, K>>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    validate(&request)?;
    state.sessions.send_password_reset(&request.email).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "If an account exists for this email, a reset link has been sent.".to_string(),
    }))
}

async fn get_session<A, S, K>(
    State(state): State<Arc<AppState<A, S, K>>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<SessionStatusResponse>>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    let user = state
        .sessions
        .current_user()
        .filter(|u| u.id == auth.user_id)
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(SessionStatusResponse {
        user,
        provider_linked: state.sessions.provider_account().await.is_some(),
        inactivity_remaining_secs: state.sessions.inactivity_remaining().map(|d| d.as_secs()),
    }))
}

async fn record_activity<A, S, K>(
    State(state): State<Arc<AppState<A, S, K>>>,
    Json(request): Json<ActivityRequest>,
) -> Json<MessageResponse>
where
    A: AuthProvider + 'static,
    S: UserRecordStore + 'static,
    K: KvStore + 'static,
{
    let reset = state.sessions.record_activity(request.kind);
    Json(MessageResponse {
        success: reset,
        message: if reset {
            "Activity recorded.".to_string()
        } else {
            "Inactivity timer not running.".to_string()
        },
    })
}
