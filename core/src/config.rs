use std::fmt;
use tracing::warn;
use url::Url;

use crate::error::ConfigError;

pub const URL_VARS: [&str; 2] = ["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
pub const KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"];

/// Where the hosted backend lives and the public key used to talk to it.
///
/// Built once by the application's composition root and handed to the backend client; nothing
/// in this workspace reads it from a global.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: Url,
    pub api_key: String,
}

impl BackendConfig {
    pub fn new(url: &str, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingKey(KEY_VARS[0]));
        }
        let url = Url::parse(url.trim())?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        Ok(Self { url, api_key })
    }

    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|name| std::env::var(name).ok()) }

    /// Resolves the configuration through `lookup`, trying each variable name in order
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let first = |names: &[&str]| names.iter().filter_map(|name| lookup(name)).find(|value| !value.trim().is_empty());
        let url = first(&URL_VARS).ok_or(ConfigError::MissingUrl(URL_VARS[0]))?;
        let key = first(&KEY_VARS).ok_or(ConfigError::MissingKey(KEY_VARS[0]))?;
        Self::new(&url, key)
    }

    /// Like [`BackendConfig::from_env`], but a missing or invalid configuration only logs a
    /// warning: callers render nothing instead of failing.
    pub fn from_env_or_warn() -> Option<Self> {
        match Self::from_env() {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Backend not configured: {}", e);
                None
            }
        }
    }
}

// keep the key out of logs
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig").field("url", &self.url.as_str()).field("api_key", &"<redacted>").finish()
    }
}
