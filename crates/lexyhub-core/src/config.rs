use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let list = |var: &str, default: &str| -> Vec<String> {
        or_default(var, default)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("LEXYHUB_ENV", "development"))?;

    let bind_addr: SocketAddr = parse_as(
        "LEXYHUB_BIND_ADDR",
        &or_default("LEXYHUB_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("LEXYHUB_LOG_LEVEL", "info");

    let db_max_connections: u32 = parse_as(
        "LEXYHUB_DB_MAX_CONNECTIONS",
        &or_default("LEXYHUB_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "LEXYHUB_DB_MIN_CONNECTIONS",
        &or_default("LEXYHUB_DB_MIN_CONNECTIONS", "1"),
    )?;
    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "LEXYHUB_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }
    let db_acquire_timeout_secs: u64 = parse_as(
        "LEXYHUB_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("LEXYHUB_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let default_market = or_default("LEXYHUB_DEFAULT_MARKET", crate::DEFAULT_MARKET);
    let telemetry_lookback_days: u32 = parse_as(
        "LEXYHUB_TELEMETRY_LOOKBACK_DAYS",
        &or_default("LEXYHUB_TELEMETRY_LOOKBACK_DAYS", "7"),
    )?;
    let trend_lookback_days: u32 = parse_as(
        "LEXYHUB_TREND_LOOKBACK_DAYS",
        &or_default("LEXYHUB_TREND_LOOKBACK_DAYS", "30"),
    )?;
    let social_platforms = list("LEXYHUB_SOCIAL_PLATFORMS", "reddit,pinterest,tiktok");
    let trend_feed_urls = list("LEXYHUB_TREND_FEED_URLS", "");

    let http_timeout_secs: u64 = parse_as(
        "LEXYHUB_HTTP_TIMEOUT_SECS",
        &or_default("LEXYHUB_HTTP_TIMEOUT_SECS", "30"),
    )?;
    let http_user_agent = or_default(
        "LEXYHUB_HTTP_USER_AGENT",
        "lexyhub/0.1 (keyword-intelligence)",
    );
    let http_max_retries: u32 = parse_as(
        "LEXYHUB_HTTP_MAX_RETRIES",
        &or_default("LEXYHUB_HTTP_MAX_RETRIES", "3"),
    )?;
    let http_retry_backoff_base_secs: u64 = parse_as(
        "LEXYHUB_HTTP_RETRY_BACKOFF_BASE_SECS",
        &or_default("LEXYHUB_HTTP_RETRY_BACKOFF_BASE_SECS", "2"),
    )?;

    let seasonal_lookahead_days: u32 = parse_as(
        "LEXYHUB_SEASONAL_LOOKAHEAD_DAYS",
        &or_default("LEXYHUB_SEASONAL_LOOKAHEAD_DAYS", "45"),
    )?;
    let seasonal_country = or_default("LEXYHUB_SEASONAL_COUNTRY", "US");
    let classification_batch: u32 = parse_as(
        "LEXYHUB_CLASSIFICATION_BATCH",
        &or_default("LEXYHUB_CLASSIFICATION_BATCH", "100"),
    )?;
    let stale_run_minutes: u32 = parse_as(
        "LEXYHUB_STALE_RUN_MINUTES",
        &or_default("LEXYHUB_STALE_RUN_MINUTES", "120"),
    )?;
    let trigger_limit: usize = parse_as(
        "LEXYHUB_TRIGGER_LIMIT",
        &or_default("LEXYHUB_TRIGGER_LIMIT", "6"),
    )?;
    let trigger_window_secs: u64 = parse_as(
        "LEXYHUB_TRIGGER_WINDOW_SECS",
        &or_default("LEXYHUB_TRIGGER_WINDOW_SECS", "60"),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        default_market,
        telemetry_lookback_days,
        trend_lookback_days,
        social_platforms,
        trend_feed_urls,
        http_timeout_secs,
        http_user_agent,
        http_max_retries,
        http_retry_backoff_base_secs,
        seasonal_lookahead_days,
        seasonal_country,
        classification_batch,
        stale_run_minutes,
        trigger_limit,
        trigger_window_secs,
    })
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "LEXYHUB_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
