//! Configuration loading and validation for msgbridge.
//!
//! A `Config` is assembled once at startup from, lowest precedence first:
//! provider preset defaults, an optional TOML file, command-line overrides,
//! and environment variables. Credentials are only ever read from the file
//! or the environment, never from command-line arguments.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::str::FromStr;

/// Environment variable holding the backend credential.
pub const API_KEY_ENV: &str = "MSGBRIDGE_API_KEY";
/// Environment variable holding the proxy auth token.
pub const PROXY_TOKEN_ENV: &str = "MSGBRIDGE_PROXY_TOKEN";

/// Root configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Listen address.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The single backend this proxy talks to.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Display name used in logs, errors and `/health`
    pub name: String,
    /// Base URL of the OpenAI-compatible API (e.g. "https://api.x.ai/v1")
    pub url: String,
    pub api_key: ApiKey,
}

impl ProviderConfig {
    /// Full chat completions endpoint, tolerating a trailing slash on the base URL.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.url.trim_end_matches('/'))
    }
}

/// Optional bearer-token gate in front of `/v1/messages`.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub required: bool,
    pub token: Option<ApiKey>,
}

impl AuthConfig {
    /// Auth is only enforced when it is required *and* a token is configured.
    pub fn enforced_token(&self) -> Option<&str> {
        if !self.required {
            return None;
        }
        self.token
            .as_ref()
            .map(|t| t.expose_secret())
            .filter(|t| !t.is_empty())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Credential wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ApiKey::from)
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Known backends with their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Xai,
    Zai,
    Custom,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Xai, Preset::Zai, Preset::Custom];

    /// Identifier accepted on the command line and in config files.
    pub fn id(self) -> &'static str {
        match self {
            Preset::Xai => "xai",
            Preset::Zai => "zai",
            Preset::Custom => "custom",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Preset::Xai => "X.AI",
            Preset::Zai => "Z.AI",
            Preset::Custom => "Custom",
        }
    }

    /// Default base URL; `custom` has none and needs an explicit one.
    pub fn default_url(self) -> Option<&'static str> {
        match self {
            Preset::Xai => Some("https://api.x.ai/v1"),
            Preset::Zai => Some("https://api.z.ai/api/paas/v4"),
            Preset::Custom => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Preset::Xai => 9001,
            Preset::Zai | Preset::Custom => 9000,
        }
    }

    /// Convention env var for this preset's key, e.g. `MSGBRIDGE_XAI_API_KEY`.
    pub fn key_env_var(self) -> String {
        format!("MSGBRIDGE_{}_API_KEY", self.id().to_uppercase())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xai" | "x-ai" | "x.ai" => Ok(Preset::Xai),
            "zai" | "z-ai" | "z.ai" => Ok(Preset::Zai),
            "custom" => Ok(Preset::Custom),
            other => Err(ConfigError::Validation(format!(
                "Unknown provider '{}' (expected one of: xai, zai, custom)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Where the backend credential came from.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Literal string in the config file
    Literal,
    /// Config file value with `${VAR}` references expanded
    EnvExpanded,
    /// Read directly from the named environment variable
    Env(String),
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Env(var) => write!(f, "env ({})", var),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' referenced by '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },

    #[error("No API key for {provider}: set {env} (or {convention})")]
    MissingApiKey {
        provider: String,
        env: String,
        convention: String,
    },
}

/// Config file contents before expansion. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    provider: RawProvider,
    #[serde(default)]
    auth: RawAuth,
    #[serde(default)]
    logging: Option<RawLogging>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProvider {
    preset: Option<Preset>,
    name: Option<String>,
    url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAuth {
    required: Option<bool>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLogging {
    level: String,
}

impl RawConfig {
    /// Parse a TOML document.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::parse_str(&content)
    }
}

/// Command-line overrides. `None` leaves the lower layer in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub preset: Option<Preset>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub require_auth: Option<bool>,
}

/// Expand every `${VAR}` reference in `input` through `lookup`.
///
/// Fails on the first missing variable, an unclosed `${`, or an empty name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_error = |var: &str, message: String| ConfigError::EnvVar {
        var: var.to_string(),
        field: field.to_string(),
        message,
    };

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after
            .find('}')
            .ok_or_else(|| env_error("<unclosed>", "unclosed '${' reference".to_string()))?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(env_error("", "empty variable name in '${}'".to_string()));
        }

        let value = lookup(var_name).ok_or_else(|| env_error(var_name, "not set".to_string()))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

impl Config {
    /// Load from an optional file, apply overrides, and read secrets from the
    /// process environment.
    pub fn load(
        path: Option<&Path>,
        overrides: &Overrides,
    ) -> Result<(Self, KeySource), ConfigError> {
        let raw = match path {
            Some(p) => RawConfig::from_file(p)?,
            None => RawConfig::default(),
        };
        Self::resolve_with(raw, overrides, |name| std::env::var(name).ok())
    }

    /// Merge all layers using `lookup` for environment access, then validate.
    ///
    /// Taking the lookup as a closure keeps this testable without touching
    /// global process state.
    pub fn resolve_with<F>(
        raw: RawConfig,
        overrides: &Overrides,
        lookup: F,
    ) -> Result<(Self, KeySource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let expand = |value: String, field: &str| -> Result<(String, bool), ConfigError> {
            if value.contains("${") {
                Ok((expand_env_vars_with(&value, field, &lookup)?, true))
            } else {
                Ok((value, false))
            }
        };

        let preset = overrides.preset.or(raw.provider.preset).unwrap_or_default();

        let name = overrides
            .name
            .clone()
            .or(raw.provider.name)
            .unwrap_or_else(|| preset.display_name().to_string());

        let url = match overrides.url.clone().or(raw.provider.url) {
            Some(url) => expand(url, "provider.url")?.0,
            None => preset.default_url().map(str::to_string).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "Provider '{}' needs an explicit URL (--url or [provider] url)",
                    preset
                ))
            })?,
        };

        let convention = preset.key_env_var();
        let (api_key, key_source) = if let Some(value) = non_empty(API_KEY_ENV) {
            (value, KeySource::Env(API_KEY_ENV.to_string()))
        } else if let Some(value) = non_empty(&convention) {
            (value, KeySource::Env(convention.clone()))
        } else if let Some(value) = raw.provider.api_key {
            match expand(value, "provider.api_key")? {
                (v, true) => (v, KeySource::EnvExpanded),
                (v, false) => (v, KeySource::Literal),
            }
        } else {
            return Err(ConfigError::MissingApiKey {
                provider: name,
                env: API_KEY_ENV.to_string(),
                convention,
            });
        };

        let token = match non_empty(PROXY_TOKEN_ENV) {
            Some(value) => Some(value),
            None => match raw.auth.token {
                Some(value) => Some(expand(value, "auth.token")?.0),
                None => None,
            },
        };

        let config = Config {
            server: ServerConfig {
                host: overrides
                    .host
                    .clone()
                    .or(raw.server.host)
                    .unwrap_or_else(|| "127.0.0.1".to_string()),
                port: overrides
                    .port
                    .or(raw.server.port)
                    .unwrap_or_else(|| preset.default_port()),
            },
            provider: ProviderConfig {
                name,
                url,
                api_key: ApiKey::from(api_key),
            },
            auth: AuthConfig {
                required: overrides
                    .require_auth
                    .or(raw.auth.required)
                    .unwrap_or(false),
                token: token.map(ApiKey::from),
            },
            logging: raw
                .logging
                .map(|l| LoggingConfig { level: l.level })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok((config, key_source))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Provider name must not be empty".to_string(),
            ));
        }

        let url = self.provider.url.as_str();
        if url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Provider '{}' has empty URL",
                self.provider.name
            )));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "Provider '{}' URL must start with http:// or https://, got '{}'",
                self.provider.name, url
            )));
        }

        if self.provider.api_key.expose_secret().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Provider '{}' has an empty API key",
                self.provider.name
            )));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Validation("Port must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Non-fatal problems worth telling the operator about.
    ///
    /// Returned rather than logged so callers can report them once a
    /// subscriber is installed.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.auth.required && self.auth.enforced_token().is_none() {
            warnings.push(format!(
                "Proxy auth required but {} is not set - auth is disabled",
                PROXY_TOKEN_ENV
            ));
        }
        warnings
    }

    /// Human-readable summary with all credentials redacted.
    pub fn summary(&self) -> String {
        format!(
            "provider: {} ({})\nlisten:   {}\napi key:  {}\nauth:     {}\nlogging:  {}",
            self.provider.name,
            self.provider.url,
            self.server.listen_addr(),
            self.provider.api_key,
            if self.auth.enforced_token().is_some() {
                "bearer token required"
            } else {
                "disabled"
            },
            self.logging.level,
        )
    }
}
