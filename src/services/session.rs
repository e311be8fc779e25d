// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: login reconciliation and session lifecycle.
//!
//! Resolves one authoritative [`User`] from three independent sources: the
//! identity provider, the `users` document store and the device-local session
//! cache. When the provider refuses a user whose password matches the
//! redundant hash on their user record, the manager recreates the provider
//! account and relinks the record to the new id (see [`FallbackPolicy`]).
//!
//! This is also the single place where errors are classified. Expected
//! outcomes such as wrong passwords are returned without logging; anything
//! else is logged once here and reaches callers only as an [`AppError`]
//! whose user-facing message is generic.
//!
//! Known gap: two concurrent first logins for the same provider account can
//! both find no record and both write one. There is no transaction around
//! that read-then-write.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, RwLock};

use crate::config::{Config, FallbackPolicy};
use crate::db::UserRecordStore;
use crate::error::{AppError, Result};
use crate::models::{Role, User};
use crate::services::identity::{AuthProvider, ProviderAccount, ProviderError};
use crate::services::inactivity::{ActivityKind, InactivityTimer, TimerState};
use crate::services::password;
use crate::services::session_cache::{KvStore, SessionCache};

/// Behavioural knobs for [`SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub fallback_policy: FallbackPolicy,
    /// Lowercased emails promoted to admin at signup
    pub admin_emails: HashSet<String>,
    /// `None` disables inactivity auto-logout
    pub inactivity_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fallback_policy: FallbackPolicy::Availability,
            admin_emails: HashSet::new(),
            inactivity_timeout: None,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            fallback_policy: config.fallback_policy,
            admin_emails: config.admin_emails.clone(),
            inactivity_timeout: config.inactivity_timeout,
        }
    }
}

/// Owns the current session for one device.
///
/// Pass a handle (usually `Arc<SessionManager<..>>`) to whatever needs the
/// session; subscribe with [`SessionManager::subscribe`] to follow auth state.
pub struct SessionManager<A, S, K> {
    provider: A,
    store: S,
    cache: SessionCache<K>,
    options: SessionOptions,
    account: RwLock<Option<ProviderAccount>>,
    inactivity: Mutex<Option<InactivityTimer>>,
    state: watch::Sender<Option<User>>,
}

impl<A, S, K> SessionManager<A, S, K>
where
    A: AuthProvider,
    S: UserRecordStore,
    K: KvStore,
{
    pub fn new(provider: A, store: S, cache: SessionCache<K>, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            provider,
            store,
            cache,
            options,
            account: RwLock::new(None),
            inactivity: Mutex::new(None),
            state,
        }
    }

    pub fn provider(&self) -> &A {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &SessionCache<K> {
        &self.cache
    }

    // ─── Auth State ──────────────────────────────────────────────

    /// Follow auth state changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.state.subscribe()
    }

    /// The user of the current session, if any.
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().clone()
    }

    /// Provider tokens for the current session. `None` for signed-out and
    /// provider-less sessions.
    pub async fn provider_account(&self) -> Option<ProviderAccount> {
        self.account.read().await.clone()
    }

    /// Cheap check of the cached `authUser` flag.
    pub fn has_cached_session(&self) -> bool {
        self.cache.has_session()
    }

    /// Publish the cached user at startup, before any network call.
    pub fn restore(&self) -> Option<User> {
        if !self.cache.has_session() {
            return None;
        }

        let Some(user) = self.cache.load() else {
            // Flag without a usable payload: drop both.
            if let Err(e) = self.cache.clear() {
                tracing::warn!(error = %e, "Failed to clear stale session cache");
            }
            return None;
        };

        self.arm_inactivity();
        self.state.send_replace(Some(user.clone()));
        tracing::info!(user_id = %user.id, "Session restored from cache");
        Some(user)
    }

    /// React to the provider reporting a new auth state. `None` means the
    /// provider has no active session; the cache is evicted.
    pub async fn on_auth_state_changed(
        &self,
        account: Option<ProviderAccount>,
    ) -> Result<Option<User>> {
        let Some(account) = account else {
            self.expire_session().await;
            return Ok(None);
        };

        let result = async {
            let user = match self.store.get_user(&account.uid).await? {
                Some(user) => self.relink(user, &account.uid).await?,
                None => {
                    let user = User::new(&account.uid, &account.email);
                    self.store.upsert_user(&user).await?;
                    user
                }
            };
            Ok::<_, AppError>(Some(self.establish(user, Some(account)).await))
        }
        .await;

        report("auth_state", result)
    }

    // ─── Login ───────────────────────────────────────────────────

    /// Resolve a session from email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::BadRequest(
                "Email and password are required".to_string(),
            ));
        }

        let result = match self.provider.sign_in(email, password).await {
            Ok(account) => self.complete_provider_login(account, password).await,
            Err(primary) if self.options.fallback_policy == FallbackPolicy::Disabled => {
                Err(classify_sign_in_error(primary))
            }
            Err(primary) => self.fallback_login(email, password, primary).await,
        };

        report("login", result)
    }

    /// Provider accepted the credentials. The provider owns identity; the
    /// document store owns profile and role, so a missing record is created.
    async fn complete_provider_login(
        &self,
        account: ProviderAccount,
        password: &str,
    ) -> Result<User> {
        let user = match self.store.get_user(&account.uid).await? {
            Some(user) => self.relink(user, &account.uid).await?,
            None => {
                let mut user = User::new(&account.uid, &account.email);
                user.password_hash = Some(password::hash(password)?);
                self.store.upsert_user(&user).await?;
                tracing::info!(user_id = %user.id, "Created missing user record");
                user
            }
        };

        Ok(self.establish(user, Some(account)).await)
    }

    /// Provider refused. Check the redundant hash on the user record and,
    /// if it matches, repair the provider account.
    async fn fallback_login(
        &self,
        email: &str,
        password: &str,
        primary: ProviderError,
    ) -> Result<User> {
        // "No record" and "wrong password" must be indistinguishable.
        let denied = match primary {
            ProviderError::Unreachable(msg) => AppError::ProviderUnreachable(msg),
            _ => AppError::InvalidCredentials,
        };

        let Some(record) = self.store.find_user_by_email(email).await? else {
            return Err(denied);
        };

        let verified = record
            .password_hash
            .as_deref()
            .is_some_and(|stored| password::verify(password, stored));
        if !verified {
            return Err(denied);
        }

        tracing::info!(user_id = %record.id, "Password matched user record, repairing provider account");

        match self.repair_provider_account(email, password).await {
            Ok(account) => {
                let user = self.relink(record, &account.uid).await?;
                Ok(self.establish(user, Some(account)).await)
            }
            Err(e) if self.options.fallback_policy == FallbackPolicy::Availability => {
                tracing::warn!(
                    user_id = %record.id,
                    error = %e,
                    "Provider account repair failed, continuing with provider-less session"
                );
                Ok(self.establish(record, None).await)
            }
            Err(e) => Err(classify_sign_in_error(e)),
        }
    }

    /// Make `record` live under `uid`, both as its id and as its document
    /// key. The document it was read from is removed.
    async fn relink(&self, record: User, uid: &str) -> Result<User> {
        if record.id == uid && !record.is_misfiled() {
            return Ok(record);
        }

        let old_key = record.stored_key().to_string();
        let user = User {
            id: uid.to_string(),
            doc_key: None,
            ..record
        };
        self.store.relink_user(&old_key, &user).await?;
        Ok(user)
    }

    /// Create the provider account again and sign in with it.
    async fn repair_provider_account(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderAccount, ProviderError> {
        let created = self.provider.sign_up(email, password).await?;

        match self.provider.sign_in(email, password).await {
            Ok(account) => Ok(account),
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in after account repair failed, using sign-up tokens");
                Ok(created)
            }
        }
    }

    // ─── Signup / Logout / Reset ─────────────────────────────────

    /// Create a provider account and its user record, then sign in.
    pub async fn signup(&self, email: &str, password: &str, name: Option<&str>) -> Result<User> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::BadRequest(
                "Email and password are required".to_string(),
            ));
        }

        let result = async {
            // Best effort only: nothing stops a concurrent signup between
            // this read and the write below.
            if self.store.find_user_by_email(email).await?.is_some() {
                return Err(AppError::EmailInUse);
            }

            let account = self
                .provider
                .sign_up(email, password)
                .await
                .map_err(|e| match e {
                    ProviderError::Rejected(code) => AppError::BadRequest(code),
                    ProviderError::Other(msg) if msg.starts_with("WEAK_PASSWORD") => {
                        AppError::BadRequest("Password is too weak".to_string())
                    }
                    other => classify_provider_error(other),
                })?;

            let mut user = User::new(&account.uid, email);
            user.name = name.unwrap_or_default().trim().to_string();
            user.role = if self.is_admin_email(email) {
                Role::Admin
            } else {
                Role::User
            };
            user.password_hash = Some(password::hash(password)?);
            self.store.upsert_user(&user).await?;

            tracing::info!(user_id = %user.id, role = ?user.role, "User registered");
            Ok(self.establish(user, Some(account)).await)
        }
        .await;

        report("signup", result)
    }

    /// Sign out and evict the cached session.
    pub async fn logout(&self) -> Result<()> {
        let user_id = self.current_user().map(|u| u.id);
        let cleared = self.end_session().await;
        tracing::info!(user_id = ?user_id, "Signed out");
        report("logout", cleared)
    }

    /// Ask the provider to email a reset link. Unknown emails succeed too.
    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::BadRequest("Email is required".to_string()));
        }

        let result = match self.provider.send_password_reset(email).await {
            Ok(()) | Err(ProviderError::Rejected(_)) => Ok(()),
            Err(e) => Err(classify_provider_error(e)),
        };

        report("password_reset", result)
    }

    // ─── Inactivity ──────────────────────────────────────────────

    /// Register user input. Returns `false` when no timer is running.
    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        self.timer()
            .as_mut()
            .map(|timer| timer.record(kind))
            .unwrap_or(false)
    }

    /// Time left before auto-logout, if a timer is running.
    pub fn inactivity_remaining(&self) -> Option<Duration> {
        match self.timer().as_ref().map(InactivityTimer::state) {
            Some(TimerState::Active { remaining }) => Some(remaining),
            _ => None,
        }
    }

    /// Advance the inactivity timer; signs out on expiry. Returns `true`
    /// when this call expired the session.
    pub async fn expire_if_idle(&self, elapsed: Duration) -> bool {
        let expired = self
            .timer()
            .as_mut()
            .map(|timer| timer.tick(elapsed))
            .unwrap_or(false);

        if expired {
            self.expire_session().await;
        }
        expired
    }

    /// Forced sign-out (inactivity or provider revocation).
    pub async fn expire_session(&self) {
        if let Err(e) = self.end_session().await {
            tracing::warn!(error = %e, "Failed to clear session cache on expiry");
        }
    }

    // ─── Internals ───────────────────────────────────────────────

    fn is_admin_email(&self, email: &str) -> bool {
        self.options
            .admin_emails
            .contains(&email.trim().to_ascii_lowercase())
    }

    fn timer(&self) -> MutexGuard<'_, Option<InactivityTimer>> {
        self.inactivity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn arm_inactivity(&self) {
        if let Some(ceiling) = self.options.inactivity_timeout {
            self.timer()
                .get_or_insert_with(|| InactivityTimer::new(ceiling))
                .rearm();
        }
    }

    /// Make `user` the current session. Cache failures are logged, not fatal.
    async fn establish(&self, user: User, account: Option<ProviderAccount>) -> User {
        let user = user.redacted();

        if let Err(e) = self.cache.save(&user) {
            tracing::warn!(error = %e, "Failed to persist session cache");
        }

        *self.account.write().await = account;
        self.arm_inactivity();
        self.state.send_replace(Some(user.clone()));

        tracing::info!(user_id = %user.id, role = ?user.role, "Session established");
        user
    }

    async fn end_session(&self) -> Result<()> {
        let account = self.account.write().await.take();
        if let Some(account) = &account {
            self.provider.sign_out(account).await;
        }

        *self.timer() = None;
        let cleared = self.cache.clear();
        self.state.send_replace(None);
        cleared
    }
}

/// Log unexpected failures once. Expected ones pass through silently.
fn report<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if !e.is_silent() {
            tracing::error!(operation, kind = e.kind(), error = %e, "Authentication operation failed");
        }
    }
    result
}

fn classify_provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::Rejected(_) => AppError::InvalidCredentials,
        ProviderError::AccountExists => AppError::EmailInUse,
        ProviderError::Unreachable(msg) => AppError::ProviderUnreachable(msg),
        ProviderError::Other(msg) => AppError::Provider(msg),
    }
}

/// During login an existing account means the provider holds different
/// credentials for this email, which is a credential failure.
fn classify_sign_in_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::AccountExists => AppError::InvalidCredentials,
        other => classify_provider_error(other),
    }
}
