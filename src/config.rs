use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub refresh_cookie_secure: bool,
    pub refresh_cookie_domain: Option<String>,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        Ok(Self {
            database_url,
            database_max_pool_size: env::var("DATABASE_MAX_POOL_SIZE")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_MAX_POOL_SIZE),
            server_host: env_or("SERVER_HOST", "127.0.0.1"),
            server_port: env_parse("SERVER_PORT", "3000")?,
            jwt_secret,
            jwt_issuer: env_or("JWT_ISSUER", "tracker"),
            jwt_audience: env_or("JWT_AUDIENCE", "tracker-clients"),
            jwt_expiry_minutes: env_parse("JWT_EXPIRY_MINUTES", "60")?,
            refresh_token_expiry_days: env_parse("REFRESH_TOKEN_EXPIRY_DAYS", "30")?,
            refresh_cookie_secure: env::var("REFRESH_COOKIE_SECURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            refresh_cookie_domain: env::var("REFRESH_COOKIE_DOMAIN").ok(),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN").ok(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_or(key, default)
        .parse()
        .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>()))
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
