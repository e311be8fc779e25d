//! User model for storage, session cache and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Access role. Unknown values in stored documents normalize to `User`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    #[default]
    User,
}

impl Role {
    fn from_loose(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "teacher" => Role::Teacher,
            _ => Role::User,
        }
    }
}

/// Canonical user record, keyed by the auth provider's account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Provider-assigned id (also used as document ID)
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
    /// Redundant `salt:digest` used only by the login fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// When the record was first written (RFC 3339)
    pub created_at: String,
    #[serde(
        default,
        rename = "photoURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub photo_url: Option<String>,
    /// Firestore document key when it differs from `id` (legacy documents)
    #[serde(skip)]
    #[cfg_attr(feature = "binding-generation", ts(skip))]
    pub doc_key: Option<String>,
}

impl User {
    /// A fresh record with default role and no profile data.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: String::new(),
            role: Role::User,
            password_hash: None,
            created_at: crate::time_utils::format_utc_rfc3339(chrono::Utc::now()),
            photo_url: None,
            doc_key: None,
        }
    }

    /// Key of the document this record was read from.
    pub fn stored_key(&self) -> &str {
        self.doc_key.as_deref().unwrap_or(&self.id)
    }

    /// Whether the record sits under a key other than its id.
    pub fn is_misfiled(&self) -> bool {
        self.stored_key() != self.id
    }

    /// Copy without the password hash, for anything that leaves the process.
    pub fn redacted(&self) -> Self {
        Self {
            password_hash: None,
            ..self.clone()
        }
    }
}

/// Raw user document as it may exist in Firestore.
///
/// Older writers stored the id as `uid`, omitted `name` or `role`, or wrote
/// free-form role strings. Everything is optional here and fixed up by
/// [`UserDocument::normalize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    /// Firestore document key, filled in by the client on reads
    #[serde(alias = "_firestore_id", skip_serializing)]
    pub doc_key: Option<String>,
    pub id: Option<String>,
    pub uid: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub password_hash: Option<String>,
    pub created_at: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl UserDocument {
    /// Convert into the canonical [`User`]. `doc_key` is the Firestore
    /// document id and is the last resort for the user id.
    ///
    /// The document key is kept in [`User::doc_key`] when it differs from the
    /// resolved id, so a later relink removes the right document.
    ///
    /// Returns `None` for documents without an email, which cannot take part
    /// in any login path.
    pub fn normalize(self, doc_key: &str) -> Option<User> {
        let email = self.email.filter(|e| !e.trim().is_empty())?;
        let id = self
            .id
            .filter(|s| !s.is_empty())
            .or(self.uid.filter(|s| !s.is_empty()))
            .unwrap_or_else(|| doc_key.to_string());

        Some(User {
            email,
            name: self.name.unwrap_or_default(),
            role: self.role.as_deref().map(Role::from_loose).unwrap_or_default(),
            password_hash: self.password_hash.filter(|h| !h.is_empty()),
            created_at: self.created_at.unwrap_or_default(),
            photo_url: self.photo_url,
            doc_key: (!doc_key.is_empty() && id != doc_key).then(|| doc_key.to_string()),
            id,
        })
    }
}
