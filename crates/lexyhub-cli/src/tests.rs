use super::*;

#[test]
fn parses_run_with_job_name() {
    let cli = Cli::try_parse_from(["lexyhub-cli", "run", "trend-aggregation"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Run {
            job: JobName::TrendAggregation
        })
    ));
}

#[test]
fn rejects_unknown_job_name() {
    let err = Cli::try_parse_from(["lexyhub-cli", "run", "keyword-sync"]).unwrap_err();
    assert!(err.to_string().contains("keyword-sync"));
}

#[test]
fn runs_limit_defaults_to_twenty() {
    let cli = Cli::try_parse_from(["lexyhub-cli", "runs"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Runs { limit: 20 })));

    let cli = Cli::try_parse_from(["lexyhub-cli", "runs", "--limit", "5"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Runs { limit: 5 })));
}

#[test]
fn parses_db_commands() {
    let cli = Cli::try_parse_from(["lexyhub-cli", "db", "migrate"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_reap_and_jobs() {
    let cli = Cli::try_parse_from(["lexyhub-cli", "reap"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Reap)));
    let cli = Cli::try_parse_from(["lexyhub-cli", "jobs"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Jobs)));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["lexyhub-cli"]).unwrap();
    assert!(cli.command.is_none());
}
