// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations on the `users` collection.

use crate::db::{collections, UserRecordStore};
use crate::error::AppError;
use crate::models::{User, UserDocument};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            AppError::DocumentStore(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::DocumentStore(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client.as_ref().ok_or_else(|| {
            AppError::DocumentStore("Database not connected (offline mode)".to_string())
        })
    }

    /// Delete a user document. Used by account cleanup and tests.
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::DocumentStore(e.to_string()))?;
        Ok(())
    }
}

impl UserRecordStore for FirestoreDb {
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let doc: Option<UserDocument> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::DocumentStore(e.to_string()))?;

        Ok(doc.and_then(|d| {
            let user = d.normalize(id);
            if user.is_none() {
                tracing::warn!(user_id = id, "Skipping user document without email");
            }
            user
        }))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.to_string();
        let docs: Vec<UserDocument> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::DocumentStore(e.to_string()))?;

        Ok(docs.into_iter().find_map(|d| {
            let key = d.doc_key.clone().unwrap_or_default();
            d.normalize(&key)
        }))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::DocumentStore(e.to_string()))?;
        Ok(())
    }

    /// Write the record under its new key and drop the old key in one
    /// transaction, so a half-applied relink never leaves two records.
    async fn relink_user(&self, old_key: &str, user: &User) -> Result<(), AppError> {
        if old_key == user.id {
            return self.upsert_user(user).await;
        }

        let client = self.get_client()?;

        let mut transaction = client.begin_transaction().await.map_err(|e| {
            AppError::DocumentStore(format!("Failed to begin transaction: {}", e))
        })?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::DocumentStore(format!("Failed to add user to transaction: {}", e))
            })?;

        client
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(old_key)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::DocumentStore(format!("Failed to add deletion to transaction: {}", e))
            })?;

        transaction.commit().await.map_err(|e| {
            AppError::DocumentStore(format!("Transaction commit failed: {}", e))
        })?;

        tracing::info!(
            old_key,
            new_id = %user.id,
            "User record relinked to new provider id"
        );

        Ok(())
    }
}
