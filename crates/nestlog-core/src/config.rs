//! Sync endpoint configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the sync server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the sync server (e.g., `https://app.example.com`)
    pub base_url: String,
}

impl SyncConfig {
    /// Create a sync configuration from a base URL.
    ///
    /// The URL must include an http/https scheme; a trailing slash is
    /// stripped so endpoint paths can be appended directly.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: normalize_endpoint(base_url.into())?,
        })
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(Error::InvalidInput(
            "sync base URL must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "sync base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_strips_trailing_slash() {
        let config = SyncConfig::new("https://app.example.com/").unwrap();
        assert_eq!(config.base_url, "https://app.example.com");
    }

    #[test]
    fn test_new_rejects_invalid_values() {
        assert!(SyncConfig::new("").is_err());
        assert!(SyncConfig::new("   ").is_err());
        assert!(SyncConfig::new("app.example.com").is_err());
    }

    #[test]
    fn test_new_accepts_http() {
        let config = SyncConfig::new("http://localhost:3000").unwrap();
        assert_eq!(config.base_url, "http://localhost:3000");
    }
}
