// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use campus_auth::config::Config;
use campus_auth::db::{FirestoreDb, UserRecordStore};
use campus_auth::error::AppError;
use campus_auth::models::User;
use campus_auth::routes::create_router;
use campus_auth::services::{
    AuthProvider, MemoryKvStore, ProviderAccount, ProviderError, SessionCache, SessionManager,
    SessionOptions,
};
use campus_auth::AppState;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Fake identity provider ──────────────────────────────────────

/// In-memory identity provider with switchable failure modes.
#[derive(Default)]
pub struct FakeAuthProvider {
    /// email -> (uid, password)
    accounts: Mutex<HashMap<String, (String, String)>>,
    next_uid: AtomicUsize,
    pub unreachable: AtomicBool,
    pub reject_sign_up: AtomicBool,
    pub sign_in_calls: AtomicUsize,
    pub sign_up_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account directly, bypassing `sign_up` bookkeeping.
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let uid = format!("uid-{}", self.next_uid.fetch_add(1, Ordering::SeqCst) + 1);
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (uid.clone(), password.to_string()));
        uid
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.accounts.lock().unwrap().contains_key(email)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn sign_up_count(&self) -> usize {
        self.sign_up_calls.load(Ordering::SeqCst)
    }

    pub fn sign_in_count(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    fn account(uid: &str, email: &str) -> ProviderAccount {
        ProviderAccount {
            uid: uid.to_string(),
            email: email.to_string(),
            id_token: format!("id-token-{}", uid),
            refresh_token: format!("refresh-token-{}", uid),
        }
    }
}

impl AuthProvider for FakeAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderAccount, ProviderError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unreachable("connection refused".to_string()));
        }

        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            None => Err(ProviderError::Rejected("EMAIL_NOT_FOUND".to_string())),
            Some((_, stored)) if stored != password => {
                Err(ProviderError::Rejected("INVALID_PASSWORD".to_string()))
            }
            Some((uid, _)) => Ok(Self::account(uid, email)),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderAccount, ProviderError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unreachable("connection refused".to_string()));
        }
        if self.reject_sign_up.load(Ordering::SeqCst) {
            return Err(ProviderError::Other("OPERATION_NOT_ALLOWED".to_string()));
        }
        if self.has_account(email) {
            return Err(ProviderError::AccountExists);
        }

        let uid = self.add_account(email, password);
        Ok(Self::account(&uid, email))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unreachable("connection refused".to_string()));
        }
        if !self.has_account(email) {
            return Err(ProviderError::Rejected("EMAIL_NOT_FOUND".to_string()));
        }
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─── In-memory user store ────────────────────────────────────────

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<BTreeMap<String, User>>,
    pub offline: AtomicBool,
}

#[allow(dead_code)]
impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    /// Store `user` under a document key other than its id, the way older
    /// writers left some documents.
    pub fn insert_at(&self, key: &str, mut user: User) {
        user.doc_key = (key != user.id).then(|| key.to_string());
        self.users.lock().unwrap().insert(key.to_string(), user);
    }

    pub fn keys(&self) -> Vec<String> {
        self.users.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.users.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::DocumentStore(
                "Database not connected (offline mode)".to_string(),
            ));
        }
        Ok(())
    }
}

impl UserRecordStore for MemoryUserStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        self.check()?;
        Ok(self.get(id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.check()?;
        self.insert(user.clone());
        Ok(())
    }

    async fn relink_user(&self, old_key: &str, user: &User) -> Result<(), AppError> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        users.remove(old_key);
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

// ─── Builders ────────────────────────────────────────────────────

pub type TestSessions = SessionManager<FakeAuthProvider, MemoryUserStore, MemoryKvStore>;

/// Session manager over fakes with the given options.
#[allow(dead_code)]
pub fn test_sessions(
    provider: FakeAuthProvider,
    store: MemoryUserStore,
    options: SessionOptions,
) -> TestSessions {
    SessionManager::new(
        provider,
        store,
        SessionCache::new(MemoryKvStore::new()),
        options,
    )
}

/// A stored user record with a redundant hash for `password`.
#[allow(dead_code)]
pub fn legacy_record(id: &str, email: &str, password: &str) -> User {
    let mut user = User::new(id, email);
    user.password_hash = Some(campus_auth::services::password::hash(password).unwrap());
    user
}

/// Create a test app over fakes.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(
    provider: FakeAuthProvider,
    store: MemoryUserStore,
) -> (
    axum::Router,
    Arc<AppState<FakeAuthProvider, MemoryUserStore, MemoryKvStore>>,
) {
    let config = Config::test_default();
    let sessions = Arc::new(test_sessions(
        provider,
        store,
        SessionOptions::from(&config),
    ));

    let state = Arc::new(AppState { config, sessions });

    (create_router(state.clone()), state)
}
