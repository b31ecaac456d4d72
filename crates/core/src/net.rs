//! Network configuration shared by every node that talks HTTP
//!
//! The process environment is read once into a [`NetworkConfig`]. Nodes that
//! change network settings update the shared snapshot instead of mutating
//! environment variables, and HTTP clients are built from the snapshot with
//! explicit proxies.

use crate::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default Hugging Face hub endpoint
pub const DEFAULT_HF_ENDPOINT: &str = "https://huggingface.co";

/// Proxy and mirror settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub all_proxy: Option<String>,
    pub no_proxy: Option<String>,
    pub pip_index_url: Option<String>,
    pub pip_proxy: Option<String>,
    pub hf_endpoint: Option<String>,
    pub gh_proxy: Option<String>,
}

/// Network configuration handle passed to nodes and HTTP clients
pub type SharedNetworkConfig = Arc<RwLock<NetworkConfig>>;

impl NetworkConfig {
    /// Snapshot the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; upper-case names win over lower-case
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let either = |upper: &str, lower: &str| get(upper).or_else(|| get(lower));

        Self {
            http_proxy: either("HTTP_PROXY", "http_proxy"),
            https_proxy: either("HTTPS_PROXY", "https_proxy"),
            all_proxy: either("ALL_PROXY", "all_proxy"),
            no_proxy: either("NO_PROXY", "no_proxy"),
            pip_index_url: get("PIP_INDEX_URL"),
            pip_proxy: get("PIP_PROXY"),
            hf_endpoint: get("HF_ENDPOINT"),
            gh_proxy: get("GH_PROXY"),
        }
    }

    /// Wrap in a shared handle
    pub fn into_shared(self) -> SharedNetworkConfig {
        Arc::new(RwLock::new(self))
    }

    /// Active proxy settings as `(variable name, value)` pairs
    pub fn proxy_entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("HTTP_PROXY", &self.http_proxy),
            ("HTTPS_PROXY", &self.https_proxy),
            ("ALL_PROXY", &self.all_proxy),
            ("NO_PROXY", &self.no_proxy),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }

    /// Hugging Face endpoint, falling back to the public hub
    pub fn hf_endpoint_or_default(&self) -> &str {
        self.hf_endpoint.as_deref().unwrap_or(DEFAULT_HF_ENDPOINT)
    }

    /// Build an HTTP client honouring this configuration
    ///
    /// System proxy detection is disabled so that only the snapshot applies.
    pub fn http_client(&self, timeout: Option<Duration>) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let no_proxy = self
            .no_proxy
            .as_deref()
            .and_then(reqwest::NoProxy::from_string);

        if let Some(url) = &self.http_proxy {
            let proxy = reqwest::Proxy::http(url).map_err(|e| invalid_proxy("HTTP_PROXY", url, e))?;
            builder = builder.proxy(proxy.no_proxy(no_proxy.clone()));
        }
        if let Some(url) = &self.https_proxy {
            let proxy =
                reqwest::Proxy::https(url).map_err(|e| invalid_proxy("HTTPS_PROXY", url, e))?;
            builder = builder.proxy(proxy.no_proxy(no_proxy.clone()));
        }
        if let Some(url) = &self.all_proxy {
            let proxy = reqwest::Proxy::all(url).map_err(|e| invalid_proxy("ALL_PROXY", url, e))?;
            builder = builder.proxy(proxy.no_proxy(no_proxy));
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
    }
}

fn invalid_proxy(name: &str, url: &str, err: reqwest::Error) -> Error {
    Error::config(format!("Invalid {} '{}': {}", name, url, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_upper_case_wins() {
        let config = NetworkConfig::from_lookup(lookup(&[
            ("HTTP_PROXY", "http://upper:1"),
            ("http_proxy", "http://lower:2"),
            ("https_proxy", "http://lower:3"),
        ]));
        assert_eq!(config.http_proxy.as_deref(), Some("http://upper:1"));
        assert_eq!(config.https_proxy.as_deref(), Some("http://lower:3"));
        assert!(config.all_proxy.is_none());
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = NetworkConfig::from_lookup(lookup(&[("HF_ENDPOINT", "  ")]));
        assert!(config.hf_endpoint.is_none());
        assert_eq!(config.hf_endpoint_or_default(), DEFAULT_HF_ENDPOINT);
    }

    #[test]
    fn test_proxy_entries_order() {
        let config = NetworkConfig {
            no_proxy: Some("localhost".into()),
            http_proxy: Some("http://p:1".into()),
            ..Default::default()
        };
        assert_eq!(
            config.proxy_entries(),
            vec![("HTTP_PROXY", "http://p:1"), ("NO_PROXY", "localhost")]
        );
    }

    #[test]
    fn test_http_client_with_proxies() {
        let config = NetworkConfig {
            http_proxy: Some("http://127.0.0.1:7890".into()),
            all_proxy: Some("http://127.0.0.1:7891".into()),
            no_proxy: Some("localhost,127.0.0.1".into()),
            ..Default::default()
        };
        assert!(config.http_client(Some(Duration::from_secs(5))).is_ok());
    }
}
