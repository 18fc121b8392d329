//! Layered configuration for identity, analytics account and polling.
//!
//! Values are resolved with priority:
//! 1. Environment variables (`LAKEJOB_*`)
//! 2. Config file (`~/.config/lakejob/config.toml` or an explicit path)
//! 3. Default values
//!
//! CLI flags are applied on top by the binary.

use crate::jobs::{PollPolicy, MIN_POLL_INTERVAL};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default identity provider host
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default resource the token is requested for
pub const DEFAULT_RESOURCE: &str = "https://management.core.windows.net/";

/// Public client id used for the device code flow when none is configured
pub const DEFAULT_DEVICE_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Default Data Lake Analytics job endpoint suffix
pub const DEFAULT_DNS_SUFFIX: &str = "azuredatalakeanalytics.net";

const ENV_AUTHORITY_HOST: &str = "LAKEJOB_AUTHORITY_HOST";
const ENV_TENANT: &str = "LAKEJOB_TENANT";
const ENV_RESOURCE: &str = "LAKEJOB_RESOURCE";
const ENV_CLIENT_ID: &str = "LAKEJOB_CLIENT_ID";
const ENV_USERNAME: &str = "LAKEJOB_USERNAME";
const ENV_PASSWORD: &str = "LAKEJOB_PASSWORD";
const ENV_CLIENT_SECRET: &str = "LAKEJOB_CLIENT_SECRET";
const ENV_CERT_PATH: &str = "LAKEJOB_CERT_PATH";
const ENV_CERT_THUMBPRINT: &str = "LAKEJOB_CERT_THUMBPRINT";
const ENV_ACCOUNT: &str = "LAKEJOB_ACCOUNT";
const ENV_DNS_SUFFIX: &str = "LAKEJOB_DNS_SUFFIX";

/// Environment variables understood by [`load_settings`], for help output.
pub const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    (ENV_AUTHORITY_HOST, "Identity provider host"),
    (ENV_TENANT, "Tenant id or domain"),
    (ENV_RESOURCE, "Resource URI the token is requested for"),
    (ENV_CLIENT_ID, "Application (client) id"),
    (ENV_USERNAME, "User name for password authentication"),
    (ENV_PASSWORD, "Password for password authentication"),
    (ENV_CLIENT_SECRET, "Service principal secret"),
    (ENV_CERT_PATH, "PEM private key for certificate authentication"),
    (ENV_CERT_THUMBPRINT, "Hex SHA-1 thumbprint of the certificate"),
    (ENV_ACCOUNT, "Data Lake Analytics account name"),
    (ENV_DNS_SUFFIX, "Job endpoint DNS suffix"),
];

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    identity: Option<IdentityFileConfig>,
    analytics: Option<AnalyticsFileConfig>,
    poll: Option<PollFileConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct IdentityFileConfig {
    authority_host: Option<String>,
    tenant: Option<String>,
    resource: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    client_secret: Option<String>,
    certificate_path: Option<PathBuf>,
    certificate_thumbprint: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalyticsFileConfig {
    account: Option<String>,
    dns_suffix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PollFileConfig {
    interval_secs: Option<u64>,
    backoff_factor: Option<f64>,
    max_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

/// Identity provider settings shared by all authentication flows.
#[derive(Clone, Default)]
pub struct IdentitySettings {
    pub authority_host: String,
    pub tenant: Option<String>,
    pub resource: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_secret: Option<String>,
    pub certificate_path: Option<PathBuf>,
    pub certificate_thumbprint: Option<String>,
}

impl IdentitySettings {
    /// Client id for the device code flow, falling back to the public CLI client.
    pub fn device_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| DEFAULT_DEVICE_CLIENT_ID.to_string())
    }
}

impl std::fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("authority_host", &self.authority_host)
            .field("tenant", &self.tenant)
            .field("resource", &self.resource)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("certificate_path", &self.certificate_path)
            .field("certificate_thumbprint", &self.certificate_thumbprint)
            .finish()
    }
}

/// Data Lake Analytics account settings.
#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub account: Option<String>,
    pub dns_suffix: String,
}

impl AnalyticsSettings {
    /// The account name, or an error naming the missing setting.
    pub fn require_account(&self) -> Result<&str> {
        self.account.as_deref().with_context(|| {
            format!(
                "No Data Lake Analytics account configured (set {} or [analytics] account)",
                ENV_ACCOUNT
            )
        })
    }
}

/// Effective runtime configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub identity: IdentitySettings,
    pub analytics: AnalyticsSettings,
    pub poll: PollPolicy,
    /// Highest-priority source that contributed a value (for display)
    pub source: ConfigSource,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from config file
    ConfigFile,
    /// Loaded from environment variable
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::ConfigFile => write!(f, "config file"),
            ConfigSource::Environment => write!(f, "environment variable"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identity: IdentitySettings {
                authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
                resource: DEFAULT_RESOURCE.to_string(),
                ..Default::default()
            },
            analytics: AnalyticsSettings {
                account: None,
                dns_suffix: DEFAULT_DNS_SUFFIX.to_string(),
            },
            poll: PollPolicy::default(),
            source: ConfigSource::Default,
        }
    }
}

/// Get the path to the default configuration file
pub fn default_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("lakejob").join("config.toml"))
}

/// Get the path to the config file for documentation purposes
pub fn config_file_path_string() -> String {
    default_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/lakejob/config.toml".to_string())
}

/// Parse a config file. Fails on unreadable or malformed files.
pub fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Load the default config file, warning about and skipping a broken one.
fn load_default_config_file() -> Option<ConfigFile> {
    let path = default_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match read_config_file(&path) {
        Ok(config) => {
            tracing::debug!("Loaded config from {:?}", path);
            Some(config)
        }
        Err(e) => {
            tracing::warn!("{:#}", e);
            None
        }
    }
}

/// Load settings from the environment and a config file.
///
/// An explicit `config_path` must exist and parse; the default location is optional.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let file = match config_path {
        Some(path) => Some(read_config_file(path)?),
        None => load_default_config_file(),
    };

    Ok(resolve_settings(file, |key| std::env::var(key).ok()))
}

/// Merge defaults, a parsed config file and environment lookups into settings.
pub fn resolve_settings<F>(file: Option<ConfigFile>, env: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    // Priority 2: Config file
    if let Some(file) = file {
        settings.source = ConfigSource::ConfigFile;

        if let Some(identity) = file.identity {
            let target = &mut settings.identity;
            if let Some(host) = non_empty(identity.authority_host) {
                target.authority_host = trim_url(&host);
            }
            if let Some(resource) = non_empty(identity.resource) {
                target.resource = resource;
            }
            target.tenant = non_empty(identity.tenant);
            target.client_id = non_empty(identity.client_id);
            target.username = non_empty(identity.username);
            target.password = identity.password.filter(|p| !p.is_empty());
            target.client_secret = identity.client_secret.filter(|s| !s.is_empty());
            target.certificate_path = identity.certificate_path;
            target.certificate_thumbprint = non_empty(identity.certificate_thumbprint);
        }

        if let Some(analytics) = file.analytics {
            settings.analytics.account = non_empty(analytics.account);
            if let Some(suffix) = non_empty(analytics.dns_suffix) {
                settings.analytics.dns_suffix = suffix;
            }
        }

        if let Some(poll) = file.poll {
            let mut policy = PollPolicy::default();
            if let Some(secs) = poll.interval_secs {
                if secs == 0 {
                    tracing::warn!("[poll] interval_secs = 0 is too short, using {:?}", MIN_POLL_INTERVAL);
                }
                policy = policy.with_interval(Duration::from_secs(secs));
            }
            if let Some(factor) = poll.backoff_factor {
                let max = poll
                    .max_interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(policy.max_interval);
                policy = policy.with_backoff(factor, max);
            }
            if let Some(secs) = poll.timeout_secs {
                policy = policy.with_timeout(Duration::from_secs(secs));
            }
            settings.poll = policy;
        }
    }

    // Priority 1: Environment variables
    let mut from_env = false;
    let mut lookup = |key: &str| {
        let value = non_empty(env(key));
        if value.is_some() {
            tracing::debug!("Using {} from environment", key);
            from_env = true;
        }
        value
    };

    if let Some(host) = lookup(ENV_AUTHORITY_HOST) {
        settings.identity.authority_host = trim_url(&host);
    }
    if let Some(resource) = lookup(ENV_RESOURCE) {
        settings.identity.resource = resource;
    }
    if let Some(tenant) = lookup(ENV_TENANT) {
        settings.identity.tenant = Some(tenant);
    }
    if let Some(client_id) = lookup(ENV_CLIENT_ID) {
        settings.identity.client_id = Some(client_id);
    }
    if let Some(username) = lookup(ENV_USERNAME) {
        settings.identity.username = Some(username);
    }
    if let Some(password) = lookup(ENV_PASSWORD) {
        settings.identity.password = Some(password);
    }
    if let Some(secret) = lookup(ENV_CLIENT_SECRET) {
        settings.identity.client_secret = Some(secret);
    }
    if let Some(path) = lookup(ENV_CERT_PATH) {
        settings.identity.certificate_path = Some(PathBuf::from(path));
    }
    if let Some(thumbprint) = lookup(ENV_CERT_THUMBPRINT) {
        settings.identity.certificate_thumbprint = Some(thumbprint);
    }
    if let Some(account) = lookup(ENV_ACCOUNT) {
        settings.analytics.account = Some(account);
    }
    if let Some(suffix) = lookup(ENV_DNS_SUFFIX) {
        settings.analytics.dns_suffix = suffix;
    }

    if from_env {
        settings.source = ConfigSource::Environment;
    }

    settings
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Lakejob Configuration
# Place this file at: ~/.config/lakejob/config.toml

[identity]
# Identity provider host and tenant (id or domain)
# authority_host = "https://login.microsoftonline.com"
# tenant = "contoso.onmicrosoft.com"
# resource = "https://management.core.windows.net/"

# Application id. The device code flow falls back to a public client id.
# client_id = "00000000-0000-0000-0000-000000000000"

# Username/password flow (not usable with multi-factor authentication)
# username = "user@contoso.onmicrosoft.com"
# password = "..."

# Service principal with secret
# client_secret = "..."

# Service principal with certificate
# certificate_path = "/etc/lakejob/sp-key.pem"
# certificate_thumbprint = "0123456789ABCDEF0123456789ABCDEF01234567"

[analytics]
# account = "myadlaaccount"
# dns_suffix = "azuredatalakeanalytics.net"

[poll]
# Seconds between status checks
# interval_secs = 3
# Multiply the interval by this factor after each check (1.0 keeps it fixed)
# backoff_factor = 1.0
# max_interval_secs = 60
# Give up waiting after this many seconds (unset waits forever)
# timeout_secs = 3600
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = resolve_settings(None, env_from(&[]));
        assert_eq!(settings.source, ConfigSource::Default);
        assert_eq!(settings.identity.authority_host, DEFAULT_AUTHORITY_HOST);
        assert_eq!(settings.identity.resource, DEFAULT_RESOURCE);
        assert_eq!(settings.identity.device_client_id(), DEFAULT_DEVICE_CLIENT_ID);
        assert_eq!(settings.analytics.dns_suffix, DEFAULT_DNS_SUFFIX);
        assert!(settings.analytics.require_account().is_err());
        assert_eq!(settings.poll.interval, Duration::from_secs(3));
        assert_eq!(settings.poll.timeout, None);
    }

    #[test]
    fn test_file_then_environment_priority() {
        let file: ConfigFile = toml::from_str(
            r#"
            [identity]
            authority_host = "https://login.example.com/"
            tenant = "file-tenant"
            client_id = "file-client"
            client_secret = "file-secret"

            [analytics]
            account = "fileaccount"

            [poll]
            interval_secs = 10
            backoff_factor = 2.0
            max_interval_secs = 40
            timeout_secs = 120
            "#,
        )
        .unwrap();

        let settings = resolve_settings(
            Some(file),
            env_from(&[("LAKEJOB_TENANT", "env-tenant"), ("LAKEJOB_ACCOUNT", "  ")]),
        );

        assert_eq!(settings.source, ConfigSource::Environment);
        assert_eq!(settings.identity.authority_host, "https://login.example.com");
        assert_eq!(settings.identity.tenant.as_deref(), Some("env-tenant"));
        assert_eq!(settings.identity.client_id.as_deref(), Some("file-client"));
        assert_eq!(settings.identity.device_client_id(), "file-client");
        // Blank environment values do not override the file
        assert_eq!(settings.analytics.require_account().unwrap(), "fileaccount");
        assert_eq!(settings.poll.interval, Duration::from_secs(10));
        assert_eq!(settings.poll.backoff_factor, 2.0);
        assert_eq!(settings.poll.max_interval, Duration::from_secs(40));
        assert_eq!(settings.poll.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_zero_poll_interval_is_raised() {
        let file: ConfigFile = toml::from_str("[poll]\ninterval_secs = 0\n").unwrap();
        let settings = resolve_settings(Some(file), env_from(&[]));
        assert_eq!(settings.poll.interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_explicit_config_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analytics]\naccount = \"tmpaccount\"\ndns_suffix = \"example.net\"").unwrap();

        let parsed = read_config_file(file.path()).unwrap();
        let settings = resolve_settings(Some(parsed), env_from(&[]));
        assert_eq!(settings.source, ConfigSource::ConfigFile);
        assert_eq!(settings.analytics.account.as_deref(), Some("tmpaccount"));
        assert_eq!(settings.analytics.dns_suffix, "example.net");
    }

    #[test]
    fn test_malformed_explicit_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analytics\naccount = ").unwrap();
        assert!(load_settings(Some(file.path())).is_err());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let settings = resolve_settings(
            None,
            env_from(&[("LAKEJOB_PASSWORD", "hunter2"), ("LAKEJOB_CLIENT_SECRET", "s3cr3t")]),
        );
        let rendered = format!("{:?}", settings.identity);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_example_config_parses() {
        let parsed: ConfigFile = toml::from_str(&generate_example_config()).unwrap();
        assert!(parsed.identity.is_some());
        assert!(parsed.analytics.is_some());
        assert!(parsed.poll.is_some());
    }
}
