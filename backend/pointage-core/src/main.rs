// src/main.rs
use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pointage_core::clock::Clock;
use pointage_core::config::Config;
use pointage_core::dataset::Dataset;
use pointage_core::export::{export_file_name, write_csv};
use pointage_core::payroll::current_month;
use pointage_core::server::app;
use pointage_core::system::PointageSystem;

/// Attendance and payroll engine for QR-code pointages.
#[derive(Parser, Debug)]
#[command(name = "pointage-core", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default).
    Serve {
        /// JSON dataset to preload; overrides DATASET_PATH.
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Also add the legal holidays of this year.
        #[arg(long)]
        legal_holidays: Option<i32>,
    },
    /// Compute one month from a dataset file and write the CSV export.
    Payroll {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        mois: Option<u32>,
        #[arg(long)]
        annee: Option<i32>,
        /// Output file; defaults to paies_MM_YYYY.csv.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pin "today" for reproducible runs of the current month.
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Add the legal holidays of the payroll year before computing.
        #[arg(long)]
        legal_holidays: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve {
        dataset: None,
        legal_holidays: None,
    }) {
        Command::Serve { dataset, legal_holidays } => serve(config, dataset, legal_holidays).await,
        Command::Payroll {
            dataset,
            mois,
            annee,
            output,
            today,
            legal_holidays,
        } => run_payroll(config, dataset, mois, annee, output, today, legal_holidays),
    }
}

fn build_system(config: &Config, clock: Clock) -> Result<PointageSystem> {
    let policy = config.policy().context("Invalid attendance configuration")?;
    Ok(PointageSystem::new(clock, policy, config.rules()))
}

fn load_into(system: &PointageSystem, path: &PathBuf) -> Result<()> {
    let dataset = Dataset::from_path(path).with_context(|| format!("Failed to load dataset {}", path.display()))?;
    system.load_dataset(dataset).context("Failed to import dataset")?;
    Ok(())
}

async fn serve(config: Config, dataset: Option<PathBuf>, legal_holidays: Option<i32>) -> Result<()> {
    let clock = config.clock()?;
    let system = build_system(&config, clock)?;

    match dataset.or_else(|| config.dataset_path.clone().map(PathBuf::from)) {
        Some(path) => load_into(&system, &path)?,
        None => warn!("No dataset configured; starting with an empty store"),
    }
    if let Some(year) = legal_holidays {
        system.generate_legal_holidays(year)?;
    }

    let addr = config.socket_addr()?;
    let router = app(system);

    match config.tls_paths() {
        Some((cert, key)) => {
            let tls_config = RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| format!("Failed to load TLS cert/key from {} and {}", cert, key))?;
            info!("TLS configuration loaded from {} and {}", cert, key);
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(router.into_make_service())
                .await?;
        }
        None => {
            info!("Starting server on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await?;
        }
    }
    Ok(())
}

fn run_payroll(
    config: Config,
    dataset: PathBuf,
    mois: Option<u32>,
    annee: Option<i32>,
    output: Option<PathBuf>,
    today: Option<NaiveDate>,
    legal_holidays: bool,
) -> Result<()> {
    let clock = match today {
        Some(day) => Clock::pinned(NaiveDateTime::new(day, NaiveTime::MIN)),
        None => config.clock()?,
    };
    let (default_mois, default_annee) = current_month(clock.today());
    let (mois, annee) = (mois.unwrap_or(default_mois), annee.unwrap_or(default_annee));

    let system = build_system(&config, clock)?;
    load_into(&system, &dataset)?;
    if legal_holidays {
        system.generate_legal_holidays(annee)?;
    }

    let batch = system.compute_all(mois, annee)?;
    for failure in &batch.erreurs {
        warn!("Skipped agent {} ({}): {}", failure.agent_id, failure.nom, failure.message);
    }

    let path = output.unwrap_or_else(|| PathBuf::from(export_file_name(mois, annee)));
    let file = std::fs::File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(file, &batch.paies)?;
    info!(
        "Wrote {} payroll row(s) for {:02}/{} to {} ({} error(s))",
        batch.paies.len(),
        mois,
        annee,
        path.display(),
        batch.erreurs.len()
    );
    Ok(())
}
