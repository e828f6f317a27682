//! Filemgr Daemon
//!
//! Serves a sandboxed directory tree over HTTP.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::router::route_table;
use daemon::server::{serve, wait_for_shutdown_signal};
use tracing_subscriber::EnvFilter;

/// Filemgr Daemon - sandboxed file management over HTTP.
#[derive(Parser, Debug)]
#[command(name = "filemgr-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Managed root directory (overrides file.root)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Print the route table
    Routes,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Write the default configuration file
    Init {
        /// Replace an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // `config init` must work even when the existing file is broken
    if let Commands::Config(ConfigCommands::Init { force }) = cli.command {
        init_tracing(cli.verbose, "info");
        return init_config(&config_path, force);
    }

    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    if let Commands::Serve { bind, root } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind = bind.clone();
        }
        if let Some(root) = root {
            config.file.root = root.clone();
        }
    }

    init_tracing(cli.verbose, &config.server.log_level);
    tracing::debug!("Using config file: {:?}", config_path);

    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Filemgr daemon starting...");
            serve(&config, wait_for_shutdown_signal()).await?;
        }
        Commands::Config(ConfigCommands::Show) => {
            print!("{}", config.to_toml()?);
        }
        Commands::Config(ConfigCommands::Init { .. }) => {}
        Commands::Routes => {
            for route in route_table(&config.route_prefix()?) {
                println!("{:<6} {}", route.method, route.path);
            }
        }
    }

    Ok(())
}

/// Initialize tracing; `RUST_LOG` wins over both `-v` and the configured level.
fn init_tracing(verbose: bool, level: &str) {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {} (use --force to replace it)",
            path.display()
        );
    }

    Config::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["filemgr-daemon", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { bind, root } => {
                assert!(bind.is_none());
                assert!(root.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "filemgr-daemon",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--root",
            "/srv/files",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve { bind, root } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
                assert_eq!(root, Some(PathBuf::from("/srv/files")));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_config_show_command() {
        let cli = Cli::try_parse_from(["filemgr-daemon", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Show)));
    }

    #[test]
    fn test_config_init_force() {
        let cli = Cli::try_parse_from(["filemgr-daemon", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Init { force: true })
        ));
    }

    #[test]
    fn test_routes_command() {
        let cli = Cli::try_parse_from(["filemgr-daemon", "routes"]).unwrap();
        assert!(matches!(cli.command, Commands::Routes));
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["filemgr-daemon", "routes", "-v", "-c", "/tmp/filemgr.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/filemgr.toml")));
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["filemgr-daemon"]).is_err());
    }

    #[test]
    fn test_init_config_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.toml");

        init_config(&path, false).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.route_prefix, Config::default().server.route_prefix);

        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
    }
}
