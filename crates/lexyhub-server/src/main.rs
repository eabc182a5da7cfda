mod api;
mod middleware;
mod rate_limit;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use lexyhub_pipeline::{JobContext, JobSettings};
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = lexyhub_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = lexyhub_db::PoolConfig::from_app_config(&config);
    let pool = lexyhub_db::connect_pool(&config.database_url, pool_config).await?;
    lexyhub_db::run_migrations(&pool).await?;

    let jobs = JobContext::postgres(pool, JobSettings::from_app_config(&config));
    let _scheduler = scheduler::build_scheduler(jobs.clone()).await?;

    let limiter = Arc::new(RateLimiter::new(
        config.trigger_limit,
        Duration::from_secs(config.trigger_window_secs),
    ));
    let app = build_app(AppState { jobs, limiter });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = ?config.env, "lexyhub-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
