use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use idp_initiated_shared::{RedirectTargetResolver, ResolvedTarget};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub environment: Environment,
    pub public_base_url: String,
    pub sp: ServiceProviderConfig,
    pub identity_providers_path: PathBuf,
    pub session: SessionConfig,
    pub return_urls: ReturnUrlConfig,
    pub https: HttpsConfig,
    pub static_dir: PathBuf,
    pub metadata_timeout_secs: u64,
}

/// Our side of the SAML relationship
#[derive(Debug, Clone)]
pub struct ServiceProviderConfig {
    pub entity_id: String,
    /// Absolute URL of the assertion consumer service
    pub acs_url: String,
    /// Where users land after login when no valid return target was supplied
    pub return_url: ResolvedTarget,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub cookie_name: String,
    pub lifetime_minutes: i64,
}

/// Policy applied to every client-supplied return target
#[derive(Debug, Clone, Default)]
pub struct ReturnUrlConfig {
    pub base_path: Option<String>,
    pub allow_path_relative: bool,
}

#[derive(Debug, Clone)]
pub struct HttpsConfig {
    pub redirect: bool,
    pub port: Option<u16>,
    pub hsts: bool,
    pub hsts_max_age_secs: u64,
}

pub const ACS_PATH: &str = "/Saml2/Acs";
const DEFAULT_SESSION_SECRET: &str = "insecure-development-session-secret";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let environment: Environment = parse_var(&lookup, "APP_ENV", Environment::Development)?;

        let public_base_url = var("PUBLIC_BASE_URL", "https://localhost:8443")
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&public_base_url).map_err(|e| ConfigError::InvalidValue {
            name: "PUBLIC_BASE_URL",
            message: e.to_string(),
        })?;

        let base_path = lookup("RETURN_URL_BASE_PATH").filter(|p| !p.trim().is_empty());
        if let Some(base_path) = &base_path {
            RedirectTargetResolver::new()
                .try_with_base_path(base_path)
                .map_err(|reason| ConfigError::InvalidValue {
                    name: "RETURN_URL_BASE_PATH",
                    message: reason.to_string(),
                })?;
        }
        let return_urls = ReturnUrlConfig {
            base_path,
            allow_path_relative: parse_var(&lookup, "ALLOW_PATH_RELATIVE_RETURN_URLS", false)?,
        };

        let sp_return_url = var("SP_RETURN_URL", "/");
        let return_url = return_urls
            .resolver()
            .resolve(Some(&sp_return_url))
            .map_err(|reason| ConfigError::InvalidValue {
                name: "SP_RETURN_URL",
                message: reason.to_string(),
            })?;

        let secret = lookup("SESSION_SECRET").unwrap_or_else(|| {
            tracing::warn!("SESSION_SECRET not set, using default (insecure for production)");
            DEFAULT_SESSION_SECRET.to_string()
        });

        let lifetime_minutes: i64 = parse_var(&lookup, "SESSION_LIFETIME_MINUTES", 480)?;
        if lifetime_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "SESSION_LIFETIME_MINUTES",
                message: "must be positive".to_string(),
            });
        }

        let https = HttpsConfig {
            redirect: parse_var(&lookup, "HTTPS_REDIRECT", environment.is_production())?,
            port: match lookup("HTTPS_PORT") {
                Some(port) => Some(port.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidValue {
                        name: "HTTPS_PORT",
                        message: e.to_string(),
                    }
                })?),
                None => None,
            },
            hsts: environment.is_production(),
            hsts_max_age_secs: parse_var(&lookup, "HSTS_MAX_AGE_SECS", 2_592_000)?,
        };

        Ok(Config {
            server_addr: var("SERVER_ADDR", "0.0.0.0:8080"),
            environment,
            sp: ServiceProviderConfig {
                entity_id: var("SP_ENTITY_ID", "https://sp.example.com"),
                acs_url: format!("{}{}", public_base_url, ACS_PATH),
                return_url,
            },
            public_base_url,
            identity_providers_path: PathBuf::from(var(
                "IDENTITY_PROVIDERS_PATH",
                "config/identity_providers.json",
            )),
            session: SessionConfig {
                secret,
                cookie_name: var("SESSION_COOKIE_NAME", "idp_initiated_session"),
                lifetime_minutes,
            },
            return_urls,
            https,
            static_dir: PathBuf::from(var("STATIC_DIR", "static")),
            metadata_timeout_secs: parse_var(&lookup, "METADATA_TIMEOUT_SECS", 10)?,
        })
    }

    pub fn redirect_resolver(&self) -> RedirectTargetResolver {
        self.return_urls.resolver()
    }
}

impl ReturnUrlConfig {
    pub fn resolver(&self) -> RedirectTargetResolver {
        let resolver = RedirectTargetResolver::new().allow_path_relative(self.allow_path_relative);
        match &self.base_path {
            Some(base_path) => resolver.with_base_path(base_path),
            None => resolver,
        }
    }
}

impl SessionConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SESSION_SECRET
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
