use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use wall_api::WallSettings;
use wall_gateway::BrokerConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("WALL_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub broker: BrokerConfig,
    pub settings: WallSettings,
}

impl Config {
    /// Read configuration from the environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("WALL_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let defaults = WallSettings::default();
        let broker_defaults = BrokerConfig::default();

        Ok(Self {
            host: lookup("WALL_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "WALL_PORT")?.unwrap_or(3000),
            db_path: lookup("WALL_DB_PATH").unwrap_or_else(|| "wall.db".into()).into(),
            jwt_secret,
            broker: BrokerConfig {
                queue_capacity: parse_positive(&lookup, "WALL_QUEUE_CAPACITY")?
                    .unwrap_or(broker_defaults.queue_capacity),
                max_subscribers_per_channel: parse(&lookup, "WALL_MAX_SUBSCRIBERS_PER_CHANNEL")?,
            },
            settings: WallSettings {
                public_url: lookup("WALL_PUBLIC_URL").unwrap_or_else(|| defaults.public_url.clone()),
                heartbeat: parse_positive(&lookup, "WALL_HEARTBEAT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.heartbeat),
                max_page_limit: parse_positive(&lookup, "WALL_PAGE_LIMIT_MAX")?
                    .unwrap_or(defaults.max_page_limit),
                ..defaults
            },
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::Invalid { name, value }),
        },
    }
}

/// Like [`parse`], but zero is rejected. A zero heartbeat would make every
/// idle stream spin on pings.
fn parse_positive<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + Default + PartialEq,
    F: Fn(&str) -> Option<String>,
{
    match parse::<T, F>(lookup, name)? {
        Some(parsed) if parsed == T::default() => Err(ConfigError::Invalid {
            name,
            value: lookup(name).unwrap_or_default(),
        }),
        other => Ok(other),
    }
}
