//! Profile configuration for nestly clients.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `nestly_api::ClientConfig` and `ReconnectConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use nestly_api::{
    AuthorizationGrant, ClientConfig, Credentials, DEFAULT_API_URL, DEFAULT_TOKEN_URL,
    ReconnectConfig, TlsMode, TransportConfig,
};

const KEYRING_SERVICE: &str = "nestly";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// The profile named by `default_profile`, with its name.
    pub fn active_profile(&self) -> Option<(&str, &Profile)> {
        let name = self.default_profile.as_deref()?;
        self.profiles.get_key_value(name).map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}

/// A named Nest account profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL. Defaults to the public developer API.
    pub api_url: Option<String>,

    /// OAuth2 token endpoint for the authorization-code exchange.
    pub token_url: Option<String>,

    /// Access token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// OAuth2 client id.
    pub client_id: Option<String>,

    /// OAuth2 client secret (plaintext; prefer keyring).
    pub client_secret: Option<String>,

    /// One-time authorization code (PIN) from the consent flow.
    pub authorization_code: Option<String>,

    /// Path to an extra CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override request timeout.
    pub timeout: Option<u64>,

    /// Stream reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

/// Stream reconnect policy as written in TOML.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ReconnectSettings {
    /// Delay before the first retry, in milliseconds. Omitted or 0 reconnects immediately.
    pub initial_delay_ms: Option<u64>,

    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: Option<u64>,

    /// Consecutive failed connects before giving up. Omitted retries forever.
    pub max_retries: Option<u32>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "nestly", "nestly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("nestly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// A missing file is not an error; defaults and `NESTLY_*` variables still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NESTLY_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_secret(profile_name: &str, key: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{key}")).ok()?;
    entry.get_password().ok().map(SecretString::from)
}

/// Resolve an access token from the credential chain.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(val) = std::env::var("NESTLY_TOKEN") {
        return Some(SecretString::from(val));
    }

    // 3. System keyring
    if let Some(secret) = keyring_secret(profile_name, "token") {
        return Some(secret);
    }

    // 4. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

/// Resolve an authorization-code grant, if the profile carries a full one.
pub fn resolve_grant(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<AuthorizationGrant>, ConfigError> {
    let (Some(client_id), Some(code)) = (&profile.client_id, &profile.authorization_code) else {
        return Ok(None);
    };

    let client_secret = keyring_secret(profile_name, "client-secret")
        .or_else(|| profile.client_secret.clone().map(SecretString::from));
    let Some(client_secret) = client_secret else {
        return Ok(None);
    };

    let token_url = parse_url(
        "token_url",
        profile.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL),
    )?;

    Ok(Some(AuthorizationGrant {
        client_id: client_id.clone(),
        client_secret,
        code: SecretString::from(code.clone()),
        token_url,
    }))
}

/// Resolve `Credentials` for a profile: an access token wins over a grant.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Credentials, ConfigError> {
    if let Some(token) = resolve_token(profile, profile_name) {
        return Ok(Credentials::AccessToken(token));
    }

    resolve_grant(profile, profile_name)?
        .map(Credentials::AuthorizationCode)
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `ClientConfig` from a profile, falling back to `defaults`.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let api_url = parse_url(
        "api_url",
        profile.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
    )?;

    let credentials = resolve_credentials(profile, profile_name)?;

    let tls = profile
        .ca_cert
        .clone()
        .map_or(TlsMode::System, TlsMode::CustomCa);

    Ok(ClientConfig {
        api_url,
        credentials,
        transport: TransportConfig {
            tls,
            timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
            connect_timeout: Duration::from_secs(defaults.connect_timeout),
        },
    })
}

/// Stream reconnect policy for a profile.
pub fn reconnect_config(profile: &Profile) -> ReconnectConfig {
    let settings = &profile.reconnect;
    let initial_delay = Duration::from_millis(settings.initial_delay_ms.unwrap_or(0));
    let max_delay = settings
        .max_delay_ms
        .map_or(initial_delay.max(Duration::from_secs(30)), Duration::from_millis);

    ReconnectConfig {
        initial_delay,
        max_delay,
        max_retries: settings.max_retries,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
timeout = 45

[profiles.home]
token = "c.plaintext-token"
ca_cert = "/etc/nestly/ca.pem"

[profiles.home.reconnect]
initial_delay_ms = 500
max_retries = 5

[profiles.cabin]
api_url = "https://firebase-apiserver01-tah01-iad01.dapi.production.nest.com:9553"
client_id = "cabin-client"
client_secret = "cabin-secret"
authorization_code = "PIN1234"
timeout = 5
"#;

    fn sample_config() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        load_config_from(&path).unwrap()
    }

    #[test]
    fn load_from_file_applies_defaults() {
        let config = sample_config();

        assert_eq!(config.defaults.timeout, 45);
        assert_eq!(config.defaults.connect_timeout, 10);
        assert_eq!(config.profiles.len(), 2);

        let (name, home) = config.active_profile().unwrap();
        assert_eq!(name, "home");
        assert_eq!(home.token.as_deref(), Some("c.plaintext-token"));
        assert_eq!(home.reconnect.initial_delay_ms, Some(500));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.timeout, 30);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                token_env: Some("MY_NEST_TOKEN".into()),
                timeout: Some(12),
                ..Profile::default()
            },
        );
        save_config_to(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let profile = &loaded.profiles["default"];
        assert_eq!(profile.token_env.as_deref(), Some("MY_NEST_TOKEN"));
        assert_eq!(profile.timeout, Some(12));
        assert!(profile.token.is_none());
    }

    #[test]
    fn grant_requires_id_secret_and_code() {
        let config = sample_config();
        let cabin = &config.profiles["cabin"];

        let grant = resolve_grant(cabin, "nestly-test-cabin").unwrap().unwrap();
        assert_eq!(grant.client_id, "cabin-client");
        assert_eq!(grant.token_url.as_str(), DEFAULT_TOKEN_URL);

        let partial = Profile {
            client_id: Some("cabin-client".into()),
            client_secret: Some("cabin-secret".into()),
            ..Profile::default()
        };
        assert!(resolve_grant(&partial, "nestly-test-partial").unwrap().is_none());
    }

    #[test]
    fn invalid_token_url_is_validation_error() {
        let profile = Profile {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            authorization_code: Some("code".into()),
            token_url: Some("not a url".into()),
            ..Profile::default()
        };

        let err = resolve_grant(&profile, "nestly-test-bad-url").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "token_url"));
    }

    #[test]
    fn client_config_from_profile() {
        let config = sample_config();
        let home = &config.profiles["home"];

        let client = profile_to_client_config(home, "nestly-test-home", &config.defaults).unwrap();

        assert_eq!(client.api_url.as_str(), "https://developer-api.nest.com/");
        assert!(matches!(client.credentials, Credentials::AccessToken(_)));
        assert!(matches!(client.transport.tls, TlsMode::CustomCa(ref p) if p == Path::new("/etc/nestly/ca.pem")));
        assert_eq!(client.transport.timeout, Duration::from_secs(45));
        assert_eq!(client.transport.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn invalid_api_url_is_validation_error() {
        let profile = Profile {
            api_url: Some("::nope".into()),
            token: Some("c.token".into()),
            ..Profile::default()
        };

        let err = profile_to_client_config(&profile, "nestly-test-bad-api", &Defaults::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "api_url"));
    }

    #[test]
    fn reconnect_settings_translate() {
        let config = sample_config();

        let home = reconnect_config(&config.profiles["home"]);
        assert_eq!(home.initial_delay, Duration::from_millis(500));
        assert_eq!(home.max_delay, Duration::from_secs(30));
        assert_eq!(home.max_retries, Some(5));

        let cabin = reconnect_config(&config.profiles["cabin"]);
        assert_eq!(cabin.initial_delay, Duration::ZERO);
        assert_eq!(cabin.max_retries, None);
        assert_eq!(cabin.delay_for(3), Duration::ZERO);
    }
}
