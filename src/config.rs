use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub bot_token: String,
    pub chat_id: String,
}

impl Config {
    /// Loads the server configuration from the environment. The Telegram
    /// credentials and the database URL have no sane defaults, so a missing
    /// one aborts startup.
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "8080"),
            database_url: required("DATABASE_URL"),
            bot_token: required("TELEGRAM_BOT_TOKEN"),
            chat_id: required("TELEGRAM_CHAT_ID"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn required(key: &str) -> String {
    env::var(key)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Required environment variable {key} missing: {e}");
        })
        .expect("Environment misconfigured!")
}
