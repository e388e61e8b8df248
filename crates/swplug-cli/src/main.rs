use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};

use swplug_core::config::WorkerConfig;

mod logging;
mod simulate;

#[derive(Parser)]
#[command(
    name = "swplug",
    about = "Compose service worker plugins and simulate the resulting worker",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate the configured worker, then replay requests against it
    Simulate {
        /// Origin the worker is served from
        #[arg(long, default_value = "https://app.local")]
        origin: String,

        /// Fetch over the real network instead of the scripted one
        #[arg(long)]
        live: bool,

        /// Go offline after activation
        #[arg(long)]
        offline: bool,

        /// Extra scripted response, as URL=BODY
        #[arg(long = "route", value_parser = parse_route)]
        routes: Vec<(String, String)>,

        /// Path or URL to request (repeatable)
        #[arg(long = "fetch")]
        fetches: Vec<String>,

        /// JSON message to post from an open page (repeatable)
        #[arg(long = "message")]
        messages: Vec<String>,

        /// Push payload to deliver
        #[arg(long)]
        push: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
}

fn parse_route(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(url, body)| (url.to_string(), body.to_string()))
        .ok_or_else(|| format!("expected URL=BODY, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(WorkerConfig::default_path);
    let config = WorkerConfig::load(&config_path)?;

    logging::init(cli.verbose, &config.logging.clone().unwrap_or_default())?;
    tracing::debug!(path = %config_path.display(), "Config loaded");

    match cli.command {
        Commands::Simulate {
            origin,
            live,
            offline,
            routes,
            fetches,
            messages,
            push,
            json,
        } => {
            let script = simulate::Script {
                origin,
                live,
                offline,
                routes,
                fetches,
                messages,
                push,
            };
            let report = simulate::run(&config, &script).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print();
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    bail!("{} has {} error(s)", config_path.display(), errors.len());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route() {
        assert_eq!(
            parse_route("https://a/x=hello=world").unwrap(),
            ("https://a/x".to_string(), "hello=world".to_string())
        );
        assert!(parse_route("no-separator").is_err());
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::try_parse_from([
            "swplug",
            "--verbose",
            "simulate",
            "--offline",
            "--fetch",
            "/app.js",
            "--fetch",
            "/",
            "--route",
            "https://app.local/x=x",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Simulate {
            offline,
            fetches,
            routes,
            origin,
            ..
        } = cli.command
        else {
            panic!("expected simulate");
        };
        assert!(offline);
        assert_eq!(fetches, vec!["/app.js", "/"]);
        assert_eq!(routes.len(), 1);
        assert_eq!(origin, "https://app.local");
    }

    #[test]
    fn test_config_validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");
        std::fs::write(&path, "{ preset: 'offline_first', assets: ['/'] }").unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        let (_warnings, errors) = config.validate();
        assert_eq!(errors.len(), 1);
    }
}
