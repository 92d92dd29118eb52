use std::path::PathBuf;

use thiserror::Error;

use parlor_gateway::DmPolicy;

const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "changeme", "secret"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PARLOR_PORT is not a valid port: {0:?}")]
    InvalidPort(String),

    #[error("PARLOR_AUTH_MODE must be \"session\" or \"jwt\", got {0:?}")]
    UnknownAuthMode(String),

    #[error("PARLOR_JWT_SECRET is required when PARLOR_AUTH_MODE=jwt")]
    MissingJwtSecret,

    #[error("PARLOR_JWT_SECRET is still a placeholder value")]
    PlaceholderJwtSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Session,
    Jwt { secret: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dm_policy: DmPolicy,
    pub auth: AuthMode,
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port_raw = or("PARLOR_PORT", "8080");
        let port = port_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port_raw.clone()))?;

        let auth = match or("PARLOR_AUTH_MODE", "session").as_str() {
            "session" => AuthMode::Session,
            "jwt" => {
                let secret = get("PARLOR_JWT_SECRET").ok_or(ConfigError::MissingJwtSecret)?;
                if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
                    return Err(ConfigError::PlaceholderJwtSecret);
                }
                AuthMode::Jwt { secret }
            }
            other => return Err(ConfigError::UnknownAuthMode(other.to_string())),
        };

        let dm_policy = get("PARLOR_DM_POLICY")
            .map(|raw| match raw.parse::<DmPolicy>() {
                Ok(policy) => policy,
                Err(never) => match never {},
            })
            .unwrap_or_default();

        Ok(Self {
            host: or("PARLOR_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(or("PARLOR_DB_PATH", "parlor.db")),
            dm_policy,
            auth,
            cors_origin: or("PARLOR_CORS_ORIGIN", "http://localhost:3000"),
        })
    }
}
