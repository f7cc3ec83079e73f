use std::{env, fmt, net::SocketAddr, time::Duration};

use url::Url;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
pub const DEFAULT_QUEUE_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_POSTHOG_HOST: &str = "https://us.i.posthog.com";
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;
pub const DEFAULT_PROVIDER_ID: &str = "oidc";
pub const DEFAULT_PROVIDER_NAME: &str = "OpenID Connect";
pub const DEFAULT_SCOPES: &str = "openid email profile";

const DEVELOPMENT_SECRET: &str = "tenantdesk-development-secret";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub public_url: Url,
    pub auth: AuthConfig,
    pub queue_url: String,
    pub analytics: Option<AnalyticsConfig>,
    pub robots_indexable: bool,
}

/// Session signing and sign-in provider settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub session_max_age: Duration,
    pub provider: Option<ProviderConfig>,
}

impl AuthConfig {
    /// Returns `true` when no `AUTH_SECRET` was supplied and the built-in
    /// development secret is in use.
    pub fn uses_development_secret(&self) -> bool {
        self.secret == DEVELOPMENT_SECRET
    }
}

/// The single OAuth 2.0 / OpenID Connect provider used for sign-in.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
    pub scopes: Vec<String>,
}

/// Client-side product analytics settings.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub api_key: String,
    pub api_host: Url,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = bind_address()?;
        let public_url = url_var("APP_PUBLIC_URL", DEFAULT_PUBLIC_URL)?;

        let secret = match optional_var("AUTH_SECRET") {
            Some(secret) => secret,
            None if environment.is_production() => {
                return Err(ConfigError::MissingVar("AUTH_SECRET"))
            }
            None => DEVELOPMENT_SECRET.to_string(),
        };
        let session_max_age = Duration::from_secs(number_var(
            "SESSION_MAX_AGE_SECS",
            DEFAULT_SESSION_MAX_AGE_SECS,
        )?);

        let queue_url = optional_var("QUEUE_URL").unwrap_or_else(|| DEFAULT_QUEUE_URL.to_string());

        let analytics = match optional_var("POSTHOG_KEY") {
            Some(api_key) => Some(AnalyticsConfig {
                api_key,
                api_host: url_var("POSTHOG_HOST", DEFAULT_POSTHOG_HOST)?,
            }),
            None => None,
        };

        let robots_indexable = match optional_var("ROBOTS_INDEXABLE") {
            Some(value) => parse_bool("ROBOTS_INDEXABLE", &value)?,
            None => environment.is_production(),
        };

        Ok(Self {
            bind_addr,
            environment,
            public_url,
            auth: AuthConfig {
                secret,
                session_max_age,
                provider: provider_from_env()?,
            },
            queue_url,
            analytics,
            robots_indexable,
        })
    }
}

fn provider_from_env() -> Result<Option<ProviderConfig>, ConfigError> {
    let Some(client_id) = optional_var("AUTH_CLIENT_ID") else {
        return Ok(None);
    };

    let client_secret =
        optional_var("AUTH_CLIENT_SECRET").ok_or(ConfigError::MissingVar("AUTH_CLIENT_SECRET"))?;
    let scopes = optional_var("AUTH_SCOPES")
        .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
        .split_whitespace()
        .map(str::to_string)
        .collect();

    Ok(Some(ProviderConfig {
        id: optional_var("AUTH_PROVIDER_ID").unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string()),
        name: optional_var("AUTH_PROVIDER_NAME")
            .unwrap_or_else(|| DEFAULT_PROVIDER_NAME.to_string()),
        client_id,
        client_secret,
        authorize_url: required_url_var("AUTH_AUTHORIZE_URL")?,
        token_url: required_url_var("AUTH_TOKEN_URL")?,
        userinfo_url: required_url_var("AUTH_USERINFO_URL")?,
        scopes,
    }))
}

fn bind_address() -> Result<SocketAddr, ConfigError> {
    optional_var("APP_BIND_ADDR")
        .as_deref()
        .unwrap_or(DEFAULT_BIND_ADDR)
        .parse()
        .map_err(ConfigError::BindAddress)
}

/// Reads a variable, treating empty values as unset.
fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn url_var(name: &'static str, default: &str) -> Result<Url, ConfigError> {
    let value = optional_var(name).unwrap_or_else(|| default.to_string());
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn required_url_var(name: &'static str) -> Result<Url, ConfigError> {
    let value = optional_var(name).ok_or(ConfigError::MissingVar(name))?;
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn number_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional_var(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            name,
            value: other.to_string(),
        }),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
    InvalidValue {
        name: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(name) => write!(f, "{name} must be set"),
            Self::InvalidUrl { name, source } => write!(f, "invalid {name} value: {source}"),
            Self::InvalidValue { name, value } => write!(f, "invalid {name} value: {value}"),
        }
    }
}

impl std::error::Error for ConfigError {}
