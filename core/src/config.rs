//! Host configuration, fixed at client construction.

use crate::error::TrackerError;
use crate::http::HttpRequest;

pub const DEFAULT_SCHEME: &str = "https";
pub const DEFAULT_HOST: &str = "www.pivotaltracker.com";
pub const DEFAULT_API_PREFIX: &str = "/services/v3";

/// Where requests go. Read-only once handed to a client, so concurrent
/// requests never share mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    scheme: String,
    host: String,
    api_prefix: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Build from an origin such as `http://127.0.0.1:4000`.
    pub fn from_base_url(base_url: &str) -> Result<Self, TrackerError> {
        let (scheme, host) = base_url
            .split_once("://")
            .ok_or_else(|| TrackerError::Config(format!("missing scheme in {base_url:?}")))?;
        let host = host.trim_end_matches('/');
        if scheme.is_empty() || host.is_empty() {
            return Err(TrackerError::Config(format!("invalid base url {base_url:?}")));
        }
        Ok(Self::new(host).with_scheme(scheme))
    }

    /// Defaults overridden by `TRACKER_HOST`, `TRACKER_SCHEME` and
    /// `TRACKER_API_PREFIX`. Unset or empty variables keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(host) = var("TRACKER_HOST") {
            config.host = host.trim_end_matches('/').to_string();
        }
        if let Some(scheme) = var("TRACKER_SCHEME") {
            config.scheme = scheme;
        }
        if let Some(prefix) = var("TRACKER_API_PREFIX") {
            config = config.with_api_prefix(&prefix);
        }
        config
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// The prefix always starts with `/` and never ends with one; an empty
    /// prefix means paths hang directly off the host.
    pub fn with_api_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.api_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Absolute URL for a descriptor whose path already carries the prefix.
    pub fn url_for(&self, request: &HttpRequest) -> String {
        format!("{}{}", self.origin(), request.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_public_service() {
        let config = TrackerConfig::default();
        assert_eq!(config.origin(), "https://www.pivotaltracker.com");
        assert_eq!(config.api_prefix(), "/services/v3");
    }

    #[test]
    fn base_url_splits_scheme_and_host() {
        let config = TrackerConfig::from_base_url("http://127.0.0.1:4000/").unwrap();
        assert_eq!(config.scheme(), "http");
        assert_eq!(config.host(), "127.0.0.1:4000");
        assert_eq!(config.api_prefix(), DEFAULT_API_PREFIX);
    }

    #[test]
    fn base_url_without_scheme_is_rejected() {
        let err = TrackerConfig::from_base_url("localhost:4000").unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn api_prefix_is_normalized() {
        assert_eq!(TrackerConfig::default().with_api_prefix("services/v5/").api_prefix(), "/services/v5");
        assert_eq!(TrackerConfig::default().with_api_prefix("/").api_prefix(), "");
    }

    #[test]
    fn env_overrides_apply_and_blank_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("TRACKER_HOST", "tracker.internal/"),
            ("TRACKER_SCHEME", "http"),
            ("TRACKER_API_PREFIX", "  "),
        ]
        .into_iter()
        .collect();
        let config = TrackerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.origin(), "http://tracker.internal");
        assert_eq!(config.api_prefix(), DEFAULT_API_PREFIX);
    }
}
