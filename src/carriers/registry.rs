//! Cached carrier vocabulary, fetched from the downstream tracker's
//! registry endpoint.
//!
//! The registry is externally controlled and changes rarely, so entries
//! are cached in memory with a freshness window. A failed refresh serves
//! the stale cache rather than failing the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::carriers::exclusions;
use crate::carriers::resolver::{self, AliasRules};
use crate::config::RegistryConfig;
use crate::error::RegistryError;

/// Request timeout for the registry fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// One carrier known to the downstream tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierEntry {
    /// Canonical short code (e.g. `ups`).
    pub code: String,
    /// Display name (e.g. `UPS`).
    pub name: String,
}

struct Remote {
    client: reqwest::Client,
    url: String,
}

struct Cache {
    entries: Arc<Vec<CarrierEntry>>,
    fetched_at: Option<Instant>,
}

/// In-memory carrier vocabulary with TTL refresh and exclusion policy.
pub struct CarrierRegistry {
    remote: Option<Remote>,
    ttl: Duration,
    aliases: AliasRules,
    cache: RwLock<Cache>,
}

impl CarrierRegistry {
    /// Registry backed by the remote carrier map.
    pub fn new(client: reqwest::Client, config: &RegistryConfig) -> Self {
        Self {
            remote: Some(Remote {
                client,
                url: config.url.clone(),
            }),
            ttl: config.ttl,
            aliases: AliasRules::default(),
            cache: RwLock::new(Cache {
                entries: Arc::new(Vec::new()),
                fetched_at: None,
            }),
        }
    }

    /// Registry with a fixed vocabulary and no remote refresh (tests,
    /// offline operation). The exclusion policy still applies.
    pub fn with_entries(entries: Vec<CarrierEntry>) -> Self {
        let kept = entries
            .into_iter()
            .filter(|e| !exclusions::is_excluded(&e.code))
            .collect::<Vec<_>>();
        Self {
            remote: None,
            ttl: Duration::MAX,
            aliases: AliasRules::default(),
            cache: RwLock::new(Cache {
                entries: Arc::new(kept),
                fetched_at: Some(Instant::now()),
            }),
        }
    }

    /// Replace the alias rules (deployment configuration).
    pub fn with_aliases(mut self, aliases: AliasRules) -> Self {
        self.aliases = aliases;
        self
    }

    /// Current non-excluded vocabulary, refreshing the cache if stale.
    ///
    /// Serves the stale cache on refresh failure; errors only when there
    /// is no cache to fall back to.
    pub async fn entries(&self) -> Result<Arc<Vec<CarrierEntry>>, RegistryError> {
        {
            let cache = self.cache.read().await;
            if self.is_fresh(&cache) {
                return Ok(Arc::clone(&cache.entries));
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if self.is_fresh(&cache) {
            return Ok(Arc::clone(&cache.entries));
        }

        let remote = match &self.remote {
            Some(remote) => remote,
            None => return Ok(Arc::clone(&cache.entries)),
        };

        match fetch_carrier_map(remote).await {
            Ok(map) => {
                let mut kept: Vec<CarrierEntry> = map
                    .into_iter()
                    .filter(|(code, _)| !exclusions::is_excluded(code))
                    .map(|(code, name)| CarrierEntry { code, name })
                    .collect();
                kept.sort_by(|a, b| a.code.cmp(&b.code));
                debug!(carriers = kept.len(), "Carrier vocabulary refreshed");
                cache.entries = Arc::new(kept);
                cache.fetched_at = Some(Instant::now());
                Ok(Arc::clone(&cache.entries))
            }
            Err(e) => {
                if cache.entries.is_empty() {
                    Err(e)
                } else {
                    warn!(error = %e, "Carrier list refresh failed, serving stale cache");
                    Ok(Arc::clone(&cache.entries))
                }
            }
        }
    }

    fn is_fresh(&self, cache: &Cache) -> bool {
        match cache.fetched_at {
            Some(at) => self.remote.is_none() || at.elapsed() < self.ttl,
            None => false,
        }
    }

    /// Resolve free-text carrier input to a canonical code.
    ///
    /// Alias rules run first (they apply even when the vocabulary is
    /// unavailable), then the tiered match against the cached vocabulary.
    pub async fn resolve(&self, carrier_text: &str, tracking_number: &str) -> Option<String> {
        if let Some(code) = self.aliases.apply(carrier_text, tracking_number) {
            debug!(carrier = %carrier_text, code = %code, "Carrier resolved by alias rule");
            return Some(code.to_string());
        }
        let entries = self.entries().await.ok()?;
        resolver::resolve_in(&entries, carrier_text)
    }

    /// Whether a code exists in the current vocabulary. Unavailable
    /// vocabulary counts as invalid.
    pub async fn is_valid_code(&self, code: &str) -> bool {
        match self.entries().await {
            Ok(entries) => entries.iter().any(|e| e.code == code),
            Err(_) => false,
        }
    }

    /// `code: name` lines for the extraction prompt. Empty on failure.
    pub async fn vocabulary_lines(&self) -> String {
        match self.entries().await {
            Ok(entries) => entries
                .iter()
                .map(|e| format!("{}: {}", e.code, e.name))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(_) => String::new(),
        }
    }

    /// Case-insensitive word-boundary patterns over display names, for
    /// the classifier's carrier-mention tier. Empty on failure.
    pub async fn name_patterns(&self) -> Vec<Regex> {
        match self.entries().await {
            Ok(entries) => entries
                .iter()
                .filter_map(|e| {
                    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&e.name))).ok()
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

async fn fetch_carrier_map(remote: &Remote) -> Result<HashMap<String, String>, RegistryError> {
    let response = remote
        .client
        .get(&remote.url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| RegistryError::Fetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(RegistryError::Fetch(format!(
            "HTTP {}",
            response.status().as_u16()
        )));
    }

    response
        .json::<HashMap<String, String>>()
        .await
        .map_err(|e| RegistryError::Fetch(format!("decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, name: &str) -> CarrierEntry {
        CarrierEntry {
            code: code.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn fixed_vocabulary_applies_exclusions() {
        let registry = CarrierRegistry::with_entries(vec![
            entry("ups", "UPS"),
            entry("amzlus", "Amazon US"),
            entry("doordash", "DoorDash"),
            entry("cp", "Canada Post"),
        ]);
        let entries = registry.entries().await.unwrap();
        let codes: Vec<&str> = entries.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["ups", "cp"]);
    }

    #[tokio::test]
    async fn vocabulary_lines_format() {
        let registry =
            CarrierRegistry::with_entries(vec![entry("ups", "UPS"), entry("cp", "Canada Post")]);
        assert_eq!(registry.vocabulary_lines().await, "ups: UPS\ncp: Canada Post");
    }

    #[tokio::test]
    async fn is_valid_code_checks_current_vocabulary() {
        let registry = CarrierRegistry::with_entries(vec![entry("ups", "UPS")]);
        assert!(registry.is_valid_code("ups").await);
        assert!(!registry.is_valid_code("fedex").await);
    }

    #[tokio::test]
    async fn name_patterns_match_whole_words_only() {
        let registry = CarrierRegistry::with_entries(vec![entry("ups", "UPS")]);
        let patterns = registry.name_patterns().await;
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].is_match("your UPS package"));
        assert!(patterns[0].is_match("your ups package"));
        assert!(!patterns[0].is_match("pushups are great"));
    }

    #[tokio::test]
    async fn name_patterns_escape_metacharacters() {
        let registry =
            CarrierRegistry::with_entries(vec![entry("laser", "OnTrac - Lasership")]);
        let patterns = registry.name_patterns().await;
        assert!(patterns[0].is_match("handed to OnTrac - Lasership today"));
        assert!(!patterns[0].is_match("OnTrac handles this one"));
    }

    #[tokio::test]
    async fn resolve_prefers_alias_rules() {
        let registry = CarrierRegistry::with_entries(vec![
            entry("intelc", "Dragonfly - Intelcom"),
            entry("uniuni", "UniUni"),
            entry("ups", "UPS"),
        ]);
        assert_eq!(
            registry.resolve("Dragonfly", "D00012345").await,
            Some("intelc".into())
        );
        // Tracking prefix rule wins even when the carrier text says otherwise
        assert_eq!(
            registry.resolve("AliExpress Standard", "JY25CA10A002279541").await,
            Some("uniuni".into())
        );
    }
}
