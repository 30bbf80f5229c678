use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::time::Duration;

const DEV_JWT_SECRET: &str = "dev-only-signing-secret-change-me-before-deploying";
const MIN_PROD_SECRET_LEN: usize = 32;
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

/// Process-wide configuration, built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct RbacConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub store: StoreConfig,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub access: AccessConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub expires_in: Duration,
}

#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Argon2 time cost (passes over memory).
    pub iterations: u32,
    pub memory_kib: u32,
}

#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Role added to users who register without explicit role ids.
    pub default_role: String,
    pub seed_catalog: bool,
    pub strict_route_policies: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

impl RbacConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars {
            lookup: &lookup,
            is_prod: false,
        };
        let environment: Environment = vars.get("ENVIRONMENT", Some("dev"))?.parse().map_err(config_error)?;
        let vars = Vars {
            lookup: &lookup,
            is_prod: environment == Environment::Prod,
        };

        let store_backend: StoreBackend = vars.get("STORE_BACKEND", Some("postgres"))?.parse().map_err(config_error)?;
        let store_url = match store_backend {
            StoreBackend::Postgres => vars.required("DATABASE_URL")?,
            StoreBackend::Memory => lookup("DATABASE_URL").unwrap_or_default(),
        };

        let secret = match lookup("JWT_SECRET") {
            Some(secret) => secret,
            None if environment == Environment::Prod => {
                return Err(config_error("JWT_SECRET is required in production but not set"));
            }
            None => {
                tracing::warn!("JWT_SECRET not set, using the development signing secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let config = RbacConfig {
            common,
            environment,
            service_name: vars.get("SERVICE_NAME", Some("rbac-service"))?,
            service_version: vars.get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: vars.get("LOG_LEVEL", Some("info"))?,
            store: StoreConfig {
                backend: store_backend,
                url: store_url,
                max_connections: vars.parsed("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: vars.parsed("DATABASE_MIN_CONNECTIONS", 1)?,
            },
            jwt: JwtConfig {
                secret: SecretString::new(secret),
                expires_in: parse_duration(&vars.get("JWT_EXPIRES_IN", Some("24h"))?)?,
            },
            password: PasswordConfig {
                iterations: vars.parsed("PASSWORD_HASH_COST", 2)?,
                memory_kib: vars.parsed("PASSWORD_HASH_MEMORY_KIB", 19 * 1024)?,
            },
            access: AccessConfig {
                default_role: vars.get("DEFAULT_ROLE", Some("user"))?,
                seed_catalog: parse_bool(&vars.get("SEED_CATALOG", Some("false"))?),
                strict_route_policies: parse_bool(&vars.get("STRICT_ROUTE_POLICIES", Some("false"))?),
            },
            security: SecurityConfig {
                allowed_origins: vars
                    .get("ALLOWED_ORIGINS", Some("http://localhost:3000"))?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                global_ip_limit: vars.parsed("RATE_LIMIT_GLOBAL_IP_LIMIT", 100)?,
                global_ip_window_seconds: vars.parsed("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", 900)?,
                login_attempts: vars.parsed("RATE_LIMIT_LOGIN_ATTEMPTS", 10)?,
                login_window_seconds: vars.parsed("RATE_LIMIT_LOGIN_WINDOW_SECONDS", 900)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.jwt.expires_in.is_zero() {
            return Err(config_error("JWT_EXPIRES_IN must be positive"));
        }
        if self.jwt.expires_in > MAX_TOKEN_LIFETIME {
            return Err(config_error("JWT_EXPIRES_IN must not exceed 365 days"));
        }

        if self.password.iterations == 0 {
            return Err(config_error("PASSWORD_HASH_COST must be positive"));
        }

        if self.access.default_role.trim().is_empty() {
            return Err(config_error("DEFAULT_ROLE must not be empty"));
        }

        if self.environment == Environment::Prod {
            if self.jwt.secret.expose_secret().len() < MIN_PROD_SECRET_LEN {
                return Err(config_error(format!(
                    "JWT_SECRET must be at least {} bytes in production",
                    MIN_PROD_SECRET_LEN
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.store.backend == StoreBackend::Memory {
                tracing::error!("In-memory store selected in production - data will not survive restarts");
            }
        }

        Ok(())
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
    is_prod: bool,
}

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Production refuses to fall back to defaults for keys without one.
    fn get(&self, key: &str, default: Option<&str>) -> Result<String, AppError> {
        match ((self.lookup)(key), default) {
            (Some(val), _) => Ok(val),
            (None, Some(def)) => Ok(def.to_string()),
            (None, None) if self.is_prod => Err(config_error(format!(
                "{} is required in production but not set",
                key
            ))),
            (None, None) => Err(config_error(format!("{} is required but not set", key))),
        }
    }

    fn required(&self, key: &str) -> Result<String, AppError> {
        self.get(key, None)
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| config_error(format!("{} is invalid: {}", key, e))),
            None => Ok(default),
        }
    }
}

/// Accepts humantime strings (`24h`, `90m`, `1d 12h`) or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, AppError> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(raw)
        .map_err(|e| config_error(format!("Invalid duration '{}': {}", raw, e)))
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn config_error(msg: impl std::fmt::Display) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}
