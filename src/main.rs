mod cli;
mod core;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::serve_cmd::ServeArgs;
use crate::core::config::ExporterConfig;

#[derive(Parser)]
#[command(
    name = "cloudcost-exporter",
    about = "Prometheus exporter for OpenCost cloud costs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file
    #[arg(short, long, global = true, env = "CLOUDCOST_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the metrics server (default)
    Serve,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
}

fn init_tracing(config: &ExporterConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.log_format == "text" {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(cli.config.as_deref())?,
            ConfigAction::Check => cli::config_cmd::check(cli.config.as_deref())?,
        },
        None | Some(Commands::Serve) => {
            let mut config = ExporterConfig::load(cli.config.as_deref())?;
            cli.serve.apply(&mut config);

            let issues = config.validate();
            if !issues.is_empty() {
                for issue in &issues {
                    eprintln!("  - {}", issue);
                }
                bail!("Invalid configuration");
            }

            init_tracing(&config)?;
            cli::serve_cmd::run(config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_without_subcommand() {
        let cli = Cli::try_parse_from(["cloudcost-exporter", "--port", "9200"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.serve.port, Some(9200));
    }

    #[test]
    fn kube_percent_flag_without_value_enables() {
        let cli = Cli::try_parse_from(["cloudcost-exporter", "--emit-kube-percent-metrics"])
            .unwrap();
        assert_eq!(cli.serve.emit_kube_percent_metrics, Some(true));
    }

    #[test]
    fn serve_subcommand_accepts_overrides() {
        let cli =
            Cli::try_parse_from(["cloudcost-exporter", "serve", "--port", "9200"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.serve.port, Some(9200));
    }

    #[test]
    fn kube_percent_flag_accepts_boolish_values() {
        for (raw, expected) in [("1", true), ("yes", true), ("on", true), ("0", false), ("no", false)] {
            let arg = format!("--emit-kube-percent-metrics={raw}");
            let cli = Cli::try_parse_from(["cloudcost-exporter", arg.as_str()]).unwrap();
            assert_eq!(cli.serve.emit_kube_percent_metrics, Some(expected), "value {raw}");
        }
    }

    #[test]
    fn config_subcommand_accepts_global_path() {
        let cli = Cli::try_parse_from([
            "cloudcost-exporter",
            "config",
            "check",
            "--config",
            "/tmp/x.toml",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Check
            })
        ));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
    }
}
