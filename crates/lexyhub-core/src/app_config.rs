use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub default_market: String,
    pub telemetry_lookback_days: u32,
    pub trend_lookback_days: u32,
    pub social_platforms: Vec<String>,
    pub trend_feed_urls: Vec<String>,
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
    pub http_max_retries: u32,
    pub http_retry_backoff_base_secs: u64,
    pub seasonal_lookahead_days: u32,
    pub seasonal_country: String,
    pub classification_batch: u32,
    pub stale_run_minutes: u32,
    pub trigger_limit: usize,
    pub trigger_window_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("default_market", &self.default_market)
            .field("telemetry_lookback_days", &self.telemetry_lookback_days)
            .field("trend_lookback_days", &self.trend_lookback_days)
            .field("social_platforms", &self.social_platforms)
            .field("trend_feed_urls", &self.trend_feed_urls)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("http_max_retries", &self.http_max_retries)
            .field(
                "http_retry_backoff_base_secs",
                &self.http_retry_backoff_base_secs,
            )
            .field("seasonal_lookahead_days", &self.seasonal_lookahead_days)
            .field("seasonal_country", &self.seasonal_country)
            .field("classification_batch", &self.classification_batch)
            .field("stale_run_minutes", &self.stale_run_minutes)
            .field("trigger_limit", &self.trigger_limit)
            .field("trigger_window_secs", &self.trigger_window_secs)
            .finish()
    }
}
