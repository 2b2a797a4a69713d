use clap::{Parser, Subcommand};
use log::{error, info};
use pulsewatch::common::Config;
use pulsewatch::common::config::load_config;
use pulsewatch::engine::{Orchestrator, RunReport, setup, validate};
use pulsewatch::errors::Result;
use pulsewatch::utils::logger::LoggerConfig;
use std::process::ExitCode;

/// Exit code for configuration and startup failures.
const EXIT_STARTUP: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "pulsewatch", version, about = "Web health sampling into Kafka and TimescaleDB")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "PULSEWATCH_CONFIG", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Sample the targets and publish to Kafka
    Agent,
    /// Consume from Kafka and bulk load into TimescaleDB
    Sink,
    /// Run samplers and sink in one process
    Run,
    /// Create the topic and provision the hypertable
    Setup,
    /// Check that the topic and the hypertable are in place
    Validate,
}

impl Command {
    fn role(self) -> &'static str {
        match self {
            Command::Agent => "agent",
            Command::Sink => "sink",
            Command::Run => "run",
            Command::Setup => "setup",
            Command::Validate => "validate",
        }
    }
}

fn report_exit(report: RunReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn execute(command: Command, config: Config) -> Result<ExitCode> {
    match command {
        Command::Agent => Ok(report_exit(Orchestrator::new(config).run_agent().await?)),
        Command::Sink => Ok(report_exit(Orchestrator::new(config).run_sink().await?)),
        Command::Run => Ok(report_exit(Orchestrator::new(config).run_all().await?)),
        Command::Setup => {
            setup(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate => {
            let report = validate(&config).await?;
            info!(
                "Validation: topic ready = {}, table ready = {}",
                report.topic_ready, report.table_ready
            );
            if report.is_ready() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pulsewatch: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let role = cli.command.role();
    if let Err(e) = LoggerConfig::for_app(&config.name, role, &config.logger).init() {
        eprintln!("pulsewatch: cannot initialise logging: {e}");
        return ExitCode::from(EXIT_STARTUP);
    }
    info!("Starting {} ({}) with {}", config.name, role, cli.config);

    match execute(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{} failed: {}", role, e);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}
