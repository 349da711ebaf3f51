//! XFER - account transfer tool

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use xfer_common::logging::{init_logging, LogConfig, LogLevel};
use xfer_pipeline::config::{TransferConfig, CONFIG_PATH_ENV};
use xfer_pipeline::db::{create_pool, health_check};
use xfer_pipeline::provision::TestTableProvisioner;
use xfer_pipeline::schema::SchemaCatalog;
use xfer_pipeline::{TransferOrchestrator, TransferPlan, TransferStores};

#[derive(Parser, Debug)]
#[command(name = "xfer")]
#[command(author, version, about = "Account transfer between numbering schemes")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the transfer once
    Run {
        /// Clone the configured tables into test copies and run against those
        #[arg(long)]
        prepare_test_tables: bool,
    },

    /// Provision test tables only
    Provision,

    /// Validate the configuration against the live tables and print the generated SQL
    Plan {
        /// Skip reading column types; every column is treated as text
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("xfer")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "xfer failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = TransferConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate()?;

    match cli.command {
        Command::Plan { offline } => {
            let plan = if offline {
                TransferPlan::from_config(&config)?
            } else {
                let main_pool = create_pool(&config.database.main()).await?;
                let lookup_pool = create_pool(&config.database.lookup()).await?;
                let catalog = SchemaCatalog::load(&config, &main_pool, &lookup_pool).await?;
                TransferPlan::with_schema(&config, &catalog)?
            };
            let statements = serde_json::to_string_pretty(&plan.statements())?;
            info!(
                page_size = plan.page_size,
                batch_size = plan.batch_size,
                "Configuration is valid"
            );
            println!("{statements}");
        }
        Command::Provision => {
            let main_pool = create_pool(&config.database.main()).await?;
            let substitution = TestTableProvisioner::new(main_pool, config.provisioning.clone())
                .provision()
                .await?;
            info!(
                tables = ?substitution.test_tables().collect::<Vec<_>>(),
                "Test tables ready"
            );
        }
        Command::Run { prepare_test_tables } => {
            let main_pool = create_pool(&config.database.main()).await?;
            let lookup_pool = create_pool(&config.database.lookup()).await?;
            health_check(&main_pool).await?;
            health_check(&lookup_pool).await?;

            let config = if prepare_test_tables || config.provisioning.enabled {
                let substitution =
                    TestTableProvisioner::new(main_pool.clone(), config.provisioning.clone())
                        .provision()
                        .await?;
                substitution.apply(config)
            } else {
                config
            };

            let catalog = SchemaCatalog::load(&config, &main_pool, &lookup_pool).await?;
            let plan = TransferPlan::with_schema(&config, &catalog)?;
            let stores = TransferStores::postgres(&plan, main_pool, lookup_pool);
            let summary = TransferOrchestrator::new(plan, stores).run().await?;

            info!(
                summary = %serde_json::to_string(&summary)?,
                "Transfer summary"
            );
        }
    }

    Ok(())
}
