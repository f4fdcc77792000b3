use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(600);

const ENV_BASE_URL: &str = "STOREFRONT_API_BASE_URL";
const ENV_TIMEOUT_MS: &str = "STOREFRONT_TIMEOUT_MS";
const ENV_RETRY_ATTEMPTS: &str = "STOREFRONT_RETRY_ATTEMPTS";
const ENV_RETRY_DELAY_MS: &str = "STOREFRONT_RETRY_DELAY_MS";

/// Settings for [`crate::http::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Option<Duration>,
    /// Total attempts per request, the first one included.
    pub retry_attempts: u32,
    /// Flat delay between attempts.
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Some(DEFAULT_TIMEOUT),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build the configuration from `STOREFRONT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|value| !value.trim().is_empty()) {
            config.base_url = base_url;
        }
        if let Some(ms) = parse_number(&lookup, ENV_TIMEOUT_MS)? {
            config.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(attempts) = parse_number(&lookup, ENV_RETRY_ATTEMPTS)? {
            config.retry_attempts = attempts.max(1) as u32;
        }
        if let Some(ms) = parse_number(&lookup, ENV_RETRY_DELAY_MS)? {
            config.retry_delay = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }
}

fn parse_number<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Locates the per-user directory holding persisted session data.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("app", "storefront", "storefront-rs")
            .ok_or(ConfigError::MissingProjectDirs)?;
        Self::from_root(dirs.config_dir().to_path_buf())
    }

    /// Use an explicit directory instead of the platform default.
    pub fn from_root(root: PathBuf) -> Result<Self, ConfigError> {
        fs::create_dir_all(&root).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(&root)?;
        Ok(Self { root })
    }

    /// Path of the file backing a secure-store key.
    pub fn secure_file(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Errors that can occur while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for storefront-rs")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Some(DEFAULT_TIMEOUT));
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(600));
    }

    #[test]
    fn environment_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://shop.example.com/api"),
            (ENV_TIMEOUT_MS, "0"),
            (ENV_RETRY_ATTEMPTS, "4"),
            (ENV_RETRY_DELAY_MS, "50"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://shop.example.com/api");
        assert_eq!(config.timeout, None);
        assert_eq!(config.retry_attempts, 4);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_RETRY_ATTEMPTS, "many")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: ENV_RETRY_ATTEMPTS, .. }
        ));
    }

    #[test]
    fn secure_file_sanitizes_key() {
        let temp_dir = TempDir::new().unwrap();
        let locator = ConfigLocator::from_root(temp_dir.path().to_path_buf()).unwrap();
        let path = locator.secure_file("auth/session v1");
        assert!(path.ends_with("auth_session_v1.json"));
    }
}
