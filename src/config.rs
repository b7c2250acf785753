//! Configuration types, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

/// JMAP server configuration.
#[derive(Debug, Clone)]
pub struct JmapConfig {
    /// Session resource URL (e.g. `https://mail.example.com/.well-known/jmap`).
    pub session_url: String,
    /// Bearer token for the mail account.
    pub token: SecretString,
}

impl JmapConfig {
    /// Build config from environment variables.
    /// Returns `None` if `PARCEL_WATCH_JMAP_SESSION_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let session_url = std::env::var("PARCEL_WATCH_JMAP_SESSION_URL").ok()?;
        let token = std::env::var("PARCEL_WATCH_JMAP_TOKEN").unwrap_or_default();
        Some(Self {
            session_url,
            token: SecretString::from(token),
        })
    }
}

/// Carrier registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// URL returning the `code -> display name` carrier map.
    pub url: String,
    /// How long a fetched carrier list stays fresh.
    pub ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "https://api.parcel.app/external/supported_carriers.json".to_string(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("PARCEL_WATCH_CARRIERS_URL") {
            config.url = url;
        }
        config
    }
}

/// Delivery submission API configuration.
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl SubmitConfig {
    /// Returns `None` if `PARCEL_WATCH_PARCEL_API_KEY` is not set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("PARCEL_WATCH_PARCEL_API_KEY").ok()?;
        let url = std::env::var("PARCEL_WATCH_PARCEL_URL")
            .unwrap_or_else(|_| "https://api.parcel.app/external/add-delivery/".to_string());
        Some(Self {
            url,
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(10),
        })
    }
}

/// Extraction service configuration.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl ExtractionConfig {
    /// Returns `None` if `PARCEL_WATCH_EXTRACTOR_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("PARCEL_WATCH_EXTRACTOR_URL").ok()?;
        let api_key = std::env::var("PARCEL_WATCH_EXTRACTOR_API_KEY").unwrap_or_default();
        Some(Self {
            url,
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(15),
        })
    }
}
