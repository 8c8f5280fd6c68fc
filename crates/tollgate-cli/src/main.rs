//! Tollgate CLI entrypoint.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;
mod config;
mod handlers;

#[cfg(test)]
mod handlers_tests;

use commands::Commands;
use config::{CliConfig, OutputFormat};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about = "Pipeline trigger gate", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Output format, overriding the configured one
    #[arg(short, long, global = true, value_enum)]
    output: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tollgate_scheduler=debug,tollgate_bundle=debug"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = CliConfig::load(cli.config.as_deref())?;
    let output = cli.output.unwrap_or(config.output_format);

    match cli.command {
        Commands::Resolve { rules, reference } => handlers::resolve(&rules, &reference, output)?,
        Commands::Evaluate {
            definition,
            rules,
            reference,
            kind,
        } => handlers::evaluate(&definition, &rules, &reference, kind.into(), output)?,
        Commands::Rewrite {
            definition,
            action_types,
        } => handlers::rewrite(&definition, &action_types, &config)?,
        Commands::Trigger { event, no_wait } => {
            handlers::trigger(&config, &event, !no_wait, output).await?
        }
        Commands::Config => handlers::show_config(&config, cli.config.as_deref())?,
    }

    Ok(())
}
