// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login reconciliation tests.
//!
//! These tests verify that:
//! 1. A password matching the stored hash repairs a missing provider account
//! 2. A mismatched password never touches the provider account
//! 3. Each fallback policy behaves as configured when the repair fails

use campus_auth::config::FallbackPolicy;
use campus_auth::error::AppError;
use campus_auth::models::Role;
use campus_auth::services::{password, SessionOptions};
use std::sync::atomic::Ordering;

mod common;
use common::{legacy_record, test_sessions, FakeAuthProvider, MemoryUserStore};

fn options(policy: FallbackPolicy) -> SessionOptions {
    SessionOptions {
        fallback_policy: policy,
        ..SessionOptions::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROVIDER ACCEPTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_provider_login_uses_stored_role() {
    let provider = FakeAuthProvider::new();
    let uid = provider.add_account("teacher@campus.test", "secret1");

    let store = MemoryUserStore::new();
    let mut record = legacy_record(&uid, "teacher@campus.test", "secret1");
    record.role = Role::Teacher;
    record.name = "Ms. Frizzle".to_string();
    store.insert(record);

    let sessions = test_sessions(provider, store, SessionOptions::default());
    let user = sessions
        .login("teacher@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(user.id, uid);
    assert_eq!(user.role, Role::Teacher);
    assert_eq!(user.name, "Ms. Frizzle");
    assert!(user.password_hash.is_none(), "Hash must not leave the store");
    assert_eq!(sessions.current_user(), Some(user));
    assert!(sessions.provider_account().await.is_some());
    assert!(sessions.has_cached_session());
    assert_eq!(sessions.provider().sign_up_count(), 0);
}

#[tokio::test]
async fn test_provider_login_creates_missing_record() {
    let provider = FakeAuthProvider::new();
    let uid = provider.add_account("new@campus.test", "secret1");

    let sessions = test_sessions(provider, MemoryUserStore::new(), SessionOptions::default());
    let user = sessions.login("new@campus.test", "secret1").await.unwrap();

    assert_eq!(user.id, uid);
    assert_eq!(user.role, Role::User);

    let stored = sessions.store().get(&uid).expect("Record should be created");
    assert_eq!(stored.email, "new@campus.test");
    let hash = stored.password_hash.expect("Record should carry a hash");
    assert!(password::verify("secret1", &hash));
}

#[tokio::test]
async fn test_login_trims_email() {
    let provider = FakeAuthProvider::new();
    provider.add_account("a@campus.test", "secret1");

    let sessions = test_sessions(provider, MemoryUserStore::new(), SessionOptions::default());
    let user = sessions.login("  a@campus.test ", "secret1").await.unwrap();
    assert_eq!(user.email, "a@campus.test");
}

#[tokio::test]
async fn test_login_rejects_empty_input() {
    let sessions = test_sessions(
        FakeAuthProvider::new(),
        MemoryUserStore::new(),
        SessionOptions::default(),
    );

    let err = sessions.login("", "secret1").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = sessions.login("a@campus.test", "").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    assert_eq!(sessions.provider().sign_in_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// FALLBACK
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_fallback_repairs_account_and_relinks_record() {
    let store = MemoryUserStore::new();
    let mut record = legacy_record("legacy-1", "student@campus.test", "secret1");
    record.name = "Arnold".to_string();
    store.insert(record);

    let sessions = test_sessions(FakeAuthProvider::new(), store, SessionOptions::default());
    let user = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(user.email, "student@campus.test");
    assert_eq!(user.role, Role::User);
    assert_eq!(user.name, "Arnold");
    assert_ne!(user.id, "legacy-1", "Record should follow the new provider id");

    assert_eq!(sessions.provider().sign_up_count(), 1);
    assert!(sessions.provider().has_account("student@campus.test"));

    let account = sessions.provider_account().await.unwrap();
    assert_eq!(account.uid, user.id);

    // Old key gone, new key holds the same profile and hash.
    assert!(sessions.store().get("legacy-1").is_none());
    let relinked = sessions.store().get(&user.id).unwrap();
    assert_eq!(relinked.name, "Arnold");
    assert!(password::verify("secret1", relinked.password_hash.as_deref().unwrap()));
    assert_eq!(sessions.store().len(), 1);
}

#[tokio::test]
async fn test_fallback_relink_removes_document_under_its_own_key() {
    // Document key K0, but the record names U1 as its id.
    let store = MemoryUserStore::new();
    store.insert_at("K0", legacy_record("U1", "student@campus.test", "secret1"));

    let sessions = test_sessions(FakeAuthProvider::new(), store, SessionOptions::default());
    let user = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(sessions.store().keys(), vec![user.id.clone()]);
    let relinked = sessions.store().get(&user.id).unwrap();
    assert!(relinked.doc_key.is_none());
    assert_eq!(relinked.email, "student@campus.test");
}

#[tokio::test]
async fn test_fallback_repairs_misfiled_record_with_matching_id() {
    // The recreated account gets the id the record already names, but the
    // document still sits under a stale key.
    let store = MemoryUserStore::new();
    store.insert_at("K0", legacy_record("uid-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(FakeAuthProvider::new(), store, SessionOptions::default());
    let user = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(user.id, "uid-1");
    assert_eq!(sessions.store().keys(), vec!["uid-1".to_string()]);
}

#[tokio::test]
async fn test_provider_login_moves_misfiled_record() {
    let provider = FakeAuthProvider::new();
    let uid = provider.add_account("teacher@campus.test", "secret1");

    // Keyed by the provider uid, but the stored id field is stale.
    let store = MemoryUserStore::new();
    let mut record = legacy_record("old-id", "teacher@campus.test", "secret1");
    record.role = Role::Teacher;
    store.insert_at(&uid, record);

    let sessions = test_sessions(provider, store, SessionOptions::default());
    let user = sessions
        .login("teacher@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(user.id, uid);
    assert_eq!(user.role, Role::Teacher);
    assert_eq!(sessions.store().keys(), vec![uid.clone()]);
    assert_eq!(sessions.store().get(&uid).unwrap().id, uid);
}

#[tokio::test]
async fn test_fallback_second_login_goes_through_provider() {
    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(FakeAuthProvider::new(), store, SessionOptions::default());
    let first = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();
    sessions.logout().await.unwrap();

    let second = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(sessions.provider().sign_up_count(), 1, "Repair happens once");
}

#[tokio::test]
async fn test_fallback_password_mismatch_never_signs_up() {
    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(FakeAuthProvider::new(), store, SessionOptions::default());
    let err = sessions
        .login("student@campus.test", "secret2")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidCredentials));
    assert!(err.is_silent());
    assert_eq!(sessions.provider().sign_up_count(), 0);
    assert!(sessions.current_user().is_none());
    assert!(!sessions.has_cached_session());
    assert!(sessions.store().get("legacy-1").is_some());
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_are_indistinguishable() {
    let provider = FakeAuthProvider::new();
    provider.add_account("known@campus.test", "secret1");

    let sessions = test_sessions(provider, MemoryUserStore::new(), SessionOptions::default());

    let unknown = sessions
        .login("nobody@campus.test", "secret1")
        .await
        .unwrap_err();
    let wrong = sessions
        .login("known@campus.test", "wrong")
        .await
        .unwrap_err();

    assert_eq!(unknown.kind(), wrong.kind());
    assert_eq!(unknown.user_message(), wrong.user_message());
    assert_eq!(sessions.provider().sign_up_count(), 0);
}

#[tokio::test]
async fn test_fallback_record_without_hash_is_rejected() {
    let store = MemoryUserStore::new();
    store.insert(campus_auth::models::User::new(
        "legacy-1",
        "student@campus.test",
    ));

    let sessions = test_sessions(FakeAuthProvider::new(), store, SessionOptions::default());
    let err = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidCredentials));
    assert_eq!(sessions.provider().sign_up_count(), 0);
}

#[tokio::test]
async fn test_provider_password_changed_keeps_session_under_availability() {
    // Provider holds a newer password; the record still has the old hash.
    let provider = FakeAuthProvider::new();
    provider.add_account("student@campus.test", "newsecret");

    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "oldsecret"));

    let sessions = test_sessions(provider, store, options(FallbackPolicy::Availability));
    let user = sessions
        .login("student@campus.test", "oldsecret")
        .await
        .unwrap();

    assert_eq!(user.id, "legacy-1");
    assert!(sessions.provider_account().await.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// POLICIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_availability_policy_allows_provider_less_session() {
    let provider = FakeAuthProvider::new();
    provider.reject_sign_up.store(true, Ordering::SeqCst);

    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(provider, store, options(FallbackPolicy::Availability));
    let user = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(user.id, "legacy-1");
    assert_eq!(sessions.current_user().unwrap().id, "legacy-1");
    assert!(sessions.provider_account().await.is_none());
    assert!(sessions.store().get("legacy-1").is_some(), "No relink without an account");
}

#[tokio::test]
async fn test_consistency_policy_refuses_when_repair_fails() {
    let provider = FakeAuthProvider::new();
    provider.reject_sign_up.store(true, Ordering::SeqCst);

    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(provider, store, options(FallbackPolicy::Consistency));
    let err = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Provider(_)));
    assert!(!err.is_silent());
    assert!(sessions.current_user().is_none());
    assert!(!sessions.has_cached_session());
}

#[tokio::test]
async fn test_consistency_policy_still_repairs() {
    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(
        FakeAuthProvider::new(),
        store,
        options(FallbackPolicy::Consistency),
    );
    let user = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();

    assert_ne!(user.id, "legacy-1");
    assert!(sessions.provider_account().await.is_some());
}

#[tokio::test]
async fn test_disabled_policy_skips_fallback() {
    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(
        FakeAuthProvider::new(),
        store,
        options(FallbackPolicy::Disabled),
    );
    let err = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidCredentials));
    assert_eq!(sessions.provider().sign_up_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// FAILURE CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unreachable_provider_without_record() {
    let provider = FakeAuthProvider::new();
    provider.set_unreachable(true);

    let sessions = test_sessions(provider, MemoryUserStore::new(), SessionOptions::default());
    let err = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProviderUnreachable(_)));
    assert!(!err.is_silent());
}

#[tokio::test]
async fn test_unreachable_provider_wrong_password_same_error() {
    let provider = FakeAuthProvider::new();
    provider.set_unreachable(true);

    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(provider, store, SessionOptions::default());
    let err = sessions
        .login("student@campus.test", "nope")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProviderUnreachable(_)));
}

#[tokio::test]
async fn test_unreachable_provider_matching_hash_under_availability() {
    let provider = FakeAuthProvider::new();
    provider.set_unreachable(true);

    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(provider, store, options(FallbackPolicy::Availability));
    let user = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap();

    assert_eq!(user.id, "legacy-1");
    assert!(sessions.provider_account().await.is_none());
}

#[tokio::test]
async fn test_unreachable_provider_matching_hash_under_consistency() {
    let provider = FakeAuthProvider::new();
    provider.set_unreachable(true);

    let store = MemoryUserStore::new();
    store.insert(legacy_record("legacy-1", "student@campus.test", "secret1"));

    let sessions = test_sessions(provider, store, options(FallbackPolicy::Consistency));
    let err = sessions
        .login("student@campus.test", "secret1")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProviderUnreachable(_)));
}

#[tokio::test]
async fn test_document_store_failure_is_reported() {
    let provider = FakeAuthProvider::new();
    provider.add_account("a@campus.test", "secret1");

    let store = MemoryUserStore::new();
    store.offline.store(true, Ordering::SeqCst);

    let sessions = test_sessions(provider, store, SessionOptions::default());
    let err = sessions.login("a@campus.test", "secret1").await.unwrap_err();

    assert!(matches!(err, AppError::DocumentStore(_)));
    assert!(!err.is_silent());
    assert!(
        !err.user_message().contains("offline"),
        "Backend detail must not reach the user"
    );
    assert!(sessions.current_user().is_none());
}
