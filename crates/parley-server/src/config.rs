use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use parley_core::SyncConfig;
use parley_core::config::{HEARTBEAT_INTERVAL_MS, OFFLINE_GRACE_MS, ONLINE_THRESHOLD_MS, TYPING_TTL_MS};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is unset or still a placeholder; it must match the identity provider's signing secret");
        }

        let sync = SyncConfig {
            online_threshold_ms: parse(&lookup, "PARLEY_ONLINE_THRESHOLD_MS", ONLINE_THRESHOLD_MS)?,
            heartbeat_interval_ms: parse(&lookup, "PARLEY_HEARTBEAT_INTERVAL_MS", HEARTBEAT_INTERVAL_MS)?,
            typing_ttl_ms: parse(&lookup, "PARLEY_TYPING_TTL_MS", TYPING_TTL_MS)?,
            offline_grace_ms: parse(&lookup, "PARLEY_OFFLINE_GRACE_MS", OFFLINE_GRACE_MS)?,
            ..SyncConfig::default()
        };
        sync.validate().context("Invalid presence/typing timing")?;

        Ok(Self {
            host: lookup("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "PARLEY_PORT", 3000)?,
            db_path: lookup("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into()).into(),
            jwt_secret,
            sync,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: '{}'", key, raw)),
        None => Ok(default),
    }
}
