//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup. A `.env` file is honoured for local development.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// What the login flow does when the auth provider rejects a user whose
/// password matches the redundant hash in their user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Let the user in even if the provider account cannot be repaired.
    /// The session then uses the document's own id.
    Availability,
    /// Repair the provider account or fail.
    Consistency,
    /// Never consult the document store when the provider refuses.
    Disabled,
}

impl FromStr for FallbackPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "availability" => Ok(Self::Availability),
            "consistency" => Ok(Self::Consistency),
            "disabled" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::Invalid("AUTH_FALLBACK_POLICY", other.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Identity Toolkit REST endpoint (overridable for the auth emulator)
    pub identity_base_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Address the local agent binds to
    pub bind_addr: String,
    /// Server port
    pub port: u16,
    /// UI origin allowed by CORS
    pub frontend_url: String,
    /// Where the device-local session cache lives
    pub session_cache_path: PathBuf,
    /// Emails forced to the admin role at signup (lowercased)
    pub admin_emails: HashSet<String>,
    /// Idle time before forced sign-out; `None` disables the timer
    pub inactivity_timeout: Option<Duration>,
    pub fallback_policy: FallbackPolicy,

    // --- Secrets ---
    /// Identity Toolkit web API key
    pub identity_api_key: String,
    /// HS256 key for agent session tokens (raw bytes)
    pub session_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let inactivity_secs: u64 = match env::var("INACTIVITY_TIMEOUT_SECS") {
            Ok(v) => v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("INACTIVITY_TIMEOUT_SECS", v))?,
            Err(_) => 0,
        };

        let fallback_policy = match env::var("AUTH_FALLBACK_POLICY") {
            Ok(v) => v.parse()?,
            Err(_) => FallbackPolicy::Availability,
        };

        Ok(Self {
            identity_base_url: env::var("IDENTITY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_BASE_URL.to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_cache_path: env::var("SESSION_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".campus-session.json")),
            admin_emails: parse_email_list(&env::var("ADMIN_EMAILS").unwrap_or_default()),
            inactivity_timeout: (inactivity_secs > 0).then(|| Duration::from_secs(inactivity_secs)),
            fallback_policy,

            identity_api_key: env::var("IDENTITY_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("IDENTITY_API_KEY"))?,
            session_signing_key: env::var("SESSION_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("SESSION_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Deterministic configuration for tests. Points the identity client at
    /// a closed local port so nothing leaves the machine.
    pub fn test_default() -> Self {
        Self {
            identity_base_url: "http://127.0.0.1:9/v1".to_string(),
            gcp_project_id: "test-project".to_string(),
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            frontend_url: "http://localhost:3000".to_string(),
            session_cache_path: env::temp_dir().join("campus-auth-test-session.json"),
            admin_emails: parse_email_list("admin@campus.test"),
            inactivity_timeout: None,
            fallback_policy: FallbackPolicy::Availability,
            identity_api_key: "test_api_key".to_string(),
            session_signing_key: b"test_session_key_32_bytes_min!!!".to_vec(),
        }
    }
}

fn parse_email_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
