//! Administrative commands for the survey database.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use diesel::{Connection, PgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use ortho_config::OrthoConfig;
use survey_backend::domain::ports::SubmissionCountFilter;
use survey_backend::domain::{DataResetRequest, Sector, SizeBand};
use survey_backend::outbound::persistence::DbPool;
use survey_backend::settings::SurveySettings;
use survey_backend::telemetry::init_tracing;
use survey_backend::wiring::{aggregation_service, data_reset_service, reporting_service};
use tokio::runtime::Builder;
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// `survey-admin` command arguments.
#[derive(Debug, Parser)]
#[command(name = "survey-admin", about = "Maintain the survey database", version)]
struct CliArgs {
    /// Database connection URL. Falls back to settings, then `DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url", global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Recompute the aggregate cache from raw answers.
    RebuildCache,
    /// Print live submission totals.
    Counts {
        #[arg(long, value_parser = parse_sector)]
        sector: Option<Sector>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        quarter: Option<u8>,
        #[arg(long = "size-band", value_parser = parse_size_band)]
        size_band: Option<SizeBand>,
    },
    /// Delete every submission, answer, receipt code, and cache row.
    ResetData {
        /// Must be exactly `DELETE ALL SURVEY DATA`.
        #[arg(long = "confirm", value_name = "phrase")]
        confirmation: String,
        /// Operator recorded in the audit log.
        #[arg(long = "requested-by", value_name = "label")]
        requested_by: String,
    },
}

fn parse_sector(raw: &str) -> Result<Sector, String> {
    raw.parse().map_err(|error| format!("{error}"))
}

fn parse_size_band(raw: &str) -> Result<SizeBand, String> {
    SizeBand::new(raw).map_err(|error| error.to_string())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let args = CliArgs::parse();
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build Tokio runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: CliArgs) -> Result<()> {
    let settings = SurveySettings::load_from_iter([OsString::from("survey-admin")])
        .map_err(|error| eyre!("failed to load settings: {error}"))?;
    let database_url = resolve_database_url(args.database_url, &settings)?;

    if matches!(args.command, Command::Migrate) {
        return migrate(database_url).await;
    }

    let pool = DbPool::new(settings.pool_config(database_url))
        .await
        .wrap_err("failed to create database pool")?;

    match args.command {
        Command::Migrate => Ok(()),
        Command::RebuildCache => rebuild_cache(pool).await,
        Command::Counts {
            sector,
            year,
            quarter,
            size_band,
        } => {
            let filter = SubmissionCountFilter {
                sector,
                year,
                quarter,
                size_band,
            };
            print_counts(pool, &filter).await
        }
        Command::ResetData {
            confirmation,
            requested_by,
        } => reset_data(pool, confirmation, requested_by).await,
    }
}

fn resolve_database_url(explicit: Option<String>, settings: &SurveySettings) -> Result<String> {
    match explicit {
        Some(url) if url.trim().is_empty() => Err(eyre!("--database-url must not be empty")),
        Some(url) => Ok(url),
        None => settings
            .database_url()
            .ok_or_else(|| eyre!("no database URL: pass --database-url or set SURVEY_DATABASE_URL")),
    }
}

async fn migrate(database_url: String) -> Result<()> {
    let applied = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
        let mut connection =
            PgConnection::establish(&database_url).wrap_err("failed to connect for migrations")?;
        let versions = connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|error| eyre!("migration failed: {error}"))?;
        Ok(versions.iter().map(ToString::to_string).collect())
    })
    .await
    .wrap_err("migration task panicked")??;

    info!(count = applied.len(), "migrations applied");
    println!("applied={}", applied.join(","));
    Ok(())
}

async fn rebuild_cache(pool: DbPool) -> Result<()> {
    let report = aggregation_service(&pool)
        .rebuild_cache()
        .await
        .map_err(|error| eyre!("cache rebuild failed: {error}"))?;
    println!("surveys={}", report.surveys);
    println!("questions={}", report.questions);
    println!("entries={}", report.entries);
    Ok(())
}

async fn print_counts(pool: DbPool, filter: &SubmissionCountFilter) -> Result<()> {
    let counts = reporting_service(&pool)
        .submission_counts(filter)
        .await
        .map_err(|error| eyre!("count query failed: {error}"))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&counts).wrap_err("failed to render counts")?
    );
    Ok(())
}

async fn reset_data(pool: DbPool, confirmation: String, requested_by: String) -> Result<()> {
    let deleted = data_reset_service(&pool)
        .reset(DataResetRequest {
            requested_by,
            confirmation,
        })
        .await
        .map_err(|error| eyre!("reset refused: {error}"))?;
    println!("answers={}", deleted.answers);
    println!("receipt_codes={}", deleted.receipt_codes);
    println!("submissions={}", deleted.submissions);
    println!("cache_entries={}", deleted.cache_entries);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn reset_requires_both_flags() {
        let parsed = CliArgs::try_parse_from(["survey-admin", "reset-data", "--confirm", "x"]);
        assert!(parsed.is_err());
    }

    #[rstest]
    fn database_url_is_global() {
        let args = CliArgs::try_parse_from([
            "survey-admin",
            "rebuild-cache",
            "--database-url",
            "postgres://db/survey",
        ])
        .expect("arguments parse");
        assert_eq!(args.database_url.as_deref(), Some("postgres://db/survey"));
        assert!(matches!(args.command, Command::RebuildCache));
    }

    #[rstest]
    #[case(&["survey-admin", "counts", "--quarter", "5"])]
    #[case(&["survey-admin", "counts", "--sector", "jewellers"])]
    fn invalid_count_filters_are_rejected(#[case] argv: &[&str]) {
        assert!(CliArgs::try_parse_from(argv).is_err());
    }

    #[rstest]
    fn blank_explicit_url_is_rejected() {
        let error = resolve_database_url(Some("  ".to_owned()), &SurveySettings::default())
            .expect_err("blank url");
        assert!(error.to_string().contains("must not be empty"));
    }

    #[rstest]
    fn explicit_url_wins() {
        let settings = SurveySettings {
            database_url: Some("postgres://settings/db".to_owned()),
            ..SurveySettings::default()
        };
        let url = resolve_database_url(Some("postgres://flag/db".to_owned()), &settings)
            .expect("explicit url");
        assert_eq!(url, "postgres://flag/db");
    }
}
