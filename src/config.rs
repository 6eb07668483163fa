use std::{env, fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

const DEV_TOKEN_SECRET: &str = "bloodshare-dev-secret-change-me";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub token_secret: String,
    pub token_ttl_hours: i64,
    pub password_iterations: u32,
    /// Radius used when matching donors to a new blood request.
    pub match_radius_km: f64,
    /// Radius used by the public nearby-donor search when none is given.
    pub nearby_default_km: f64,
    pub cors_allow_origin: Option<String>,
    /// Upper bound on a single mail relay or SMS provider call.
    pub notify_timeout_secs: u64,
    pub email: EmailConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Clone, Default)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SmsConfig {
    pub api_url: String,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from: Option<String>,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.from.is_some()
    }
}

impl SmsConfig {
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from.is_some()
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let token_secret = optional("TOKEN_SECRET").unwrap_or_else(|| {
            warn!("TOKEN_SECRET not set, using development secret");
            DEV_TOKEN_SECRET.to_string()
        });

        Ok(Self {
            database_url: try_load("DATABASE_URL", "sqlite://bloodshare.db")?,
            host: try_load("HOST", "127.0.0.1")?,
            port: try_load("PORT", "5000")?,
            token_secret,
            token_ttl_hours: try_load("TOKEN_TTL_HOURS", "24")?,
            password_iterations: try_load("PASSWORD_ITERATIONS", "100000")?,
            match_radius_km: try_load("MATCH_RADIUS_KM", "50")?,
            nearby_default_km: try_load("NEARBY_DEFAULT_KM", "10")?,
            cors_allow_origin: optional("CORS_ALLOW_ORIGIN"),
            notify_timeout_secs: try_load("NOTIFY_TIMEOUT_SECS", "10")?,
            email: EmailConfig {
                api_url: optional("EMAIL_API_URL"),
                api_key: optional("EMAIL_API_KEY"),
                from: optional("EMAIL_FROM"),
            },
            sms: SmsConfig {
                api_url: try_load("TWILIO_API_URL", "https://api.twilio.com")?,
                account_sid: optional("TWILIO_ACCOUNT_SID"),
                auth_token: optional("TWILIO_AUTH_TOKEN"),
                from: optional("TWILIO_PHONE_NUMBER"),
            },
        })
    }

    pub fn notifications_configured(&self) -> bool {
        self.email.is_configured() || self.sms.is_configured()
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            token_secret: DEV_TOKEN_SECRET.to_string(),
            token_ttl_hours: 24,
            password_iterations: 100_000,
            match_radius_km: 50.0,
            nearby_default_km: 10.0,
            cors_allow_origin: None,
            notify_timeout_secs: 10,
            email: EmailConfig::default(),
            sms: SmsConfig {
                api_url: "https://api.twilio.com".to_string(),
                ..SmsConfig::default()
            },
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = optional(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            message: e.to_string(),
        }
    })
}
