//! Ferry CLI
//!
//! Runs the rendezvous relay and manages its configuration file.

mod config;

use clap::{Parser, Subcommand};
use ferry_transport::RelayServer;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::Config;

/// Ferry - rendezvous relay for handing files between connected peers
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve {
        /// Listen address (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,

        /// WebSocket endpoint path (overrides the config file)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Output path (defaults to the user config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    init_logging(cli.verbose, &config.logging.level);

    match cli.command {
        Commands::Serve { bind, path } => {
            if let Some(bind) = bind {
                config.server.listen_addr = bind;
            }
            if let Some(path) = path {
                config.server.path = path;
            }
            config.validate()?;
            serve(&config).await?;
        }
        Commands::InitConfig { output, force } => {
            init_config(output, force)?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run the relay until Ctrl-C
async fn serve(config: &Config) -> anyhow::Result<()> {
    let server = RelayServer::bind_with_config(config.relay_config()?).await?;

    println!("Ferry relay");
    println!("Listening on: ws://{}{}", server.local_addr()?, config.server.path);
    println!("Max clients: {}", config.server.max_clients);
    println!("Press Ctrl+C to stop");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    Ok(())
}

/// Write the default configuration
fn init_config(output: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(Config::default_path);

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::parse_from(["ferry", "serve", "--bind", "127.0.0.1:9000", "--path", "/relay"]);
        match cli.command {
            Commands::Serve { bind, path } => {
                assert_eq!(bind.as_deref(), Some("127.0.0.1:9000"));
                assert_eq!(path.as_deref(), Some("/relay"));
            }
            Commands::InitConfig { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        init_config(Some(path.clone()), false).unwrap();
        assert!(init_config(Some(path.clone()), false).is_err());
        assert!(init_config(Some(path), true).is_ok());
    }
}
