//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

use crate::error::AppError;
use crate::models::User;
use std::future::Future;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
}

/// Application-managed user records.
///
/// Lookups return canonical [`User`] values; implementations normalize
/// whatever shape the stored documents have.
pub trait UserRecordStore: Send + Sync {
    /// Get a user by provider id (the document key).
    fn get_user(&self, id: &str) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    /// Find the first user whose `email` field matches exactly.
    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    /// Whole-document upsert keyed by `user.id`.
    fn upsert_user(&self, user: &User) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Move the record stored under document key `old_key` to `user.id`.
    fn relink_user(
        &self,
        old_key: &str,
        user: &User,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
