mod jobs;

use clap::{Parser, Subcommand};
use lexyhub_core::JobName;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lexyhub-cli")]
#[command(about = "LexyHub keyword aggregation command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// List the job catalogue
    Jobs,
    /// Run one job now and print its summary as JSON
    Run {
        /// Job name, e.g. trend-aggregation
        #[arg(value_parser = parse_job)]
        job: JobName,
    },
    /// Show recent job runs
    Runs {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Fail runs left in `running` past the stale threshold
    Reap,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

fn parse_job(value: &str) -> Result<JobName, String> {
    value.parse::<JobName>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("lexyhub-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = lexyhub_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match command {
        Commands::Jobs => jobs::print_catalogue()?,
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            let pool = connect(&config).await?;
            lexyhub_db::health_check(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let pool = connect(&config).await?;
            let applied = lexyhub_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        Commands::Run { job } => jobs::run(connect(&config).await?, &config, job).await?,
        Commands::Reap => {
            jobs::run(connect(&config).await?, &config, JobName::ReapStaleRuns).await?;
        }
        Commands::Runs { limit } => jobs::print_runs(connect(&config).await?, limit).await?,
    }

    Ok(())
}

async fn connect(config: &lexyhub_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = lexyhub_db::PoolConfig::from_app_config(config);
    Ok(lexyhub_db::connect_pool(&config.database_url, pool_config).await?)
}

#[cfg(test)]
mod tests;
