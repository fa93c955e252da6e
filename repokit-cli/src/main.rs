use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "repokit")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a query string compiles into a pagination plan and predicate
    Explain {
        /// Criteria as a URL query string, e.g. "status.in=1,2&per_page=20"
        query: String,

        /// Emit compact JSON on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Check that the configured database is reachable
    Ping {
        /// Read configuration from this file instead of the search path
        #[arg(short, long, env = "REPOKIT_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Explain { query, compact } => commands::explain::execute(&query, compact),
        Commands::Ping { config } => commands::ping::execute(config).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(source) = e.source() {
            eprintln!("\n{} {}", "Caused by:".yellow(), source);
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_explain() {
        let cli = Cli::try_parse_from(["repokit", "explain", "name=john&per_page=5"]).unwrap();
        match cli.command {
            Commands::Explain { query, compact } => {
                assert_eq!(query, "name=john&per_page=5");
                assert!(!compact);
            }
            _ => panic!("expected explain"),
        }
    }

    #[test]
    fn test_parse_ping_with_config() {
        let cli = Cli::try_parse_from(["repokit", "ping", "--config", "db.toml"]).unwrap();
        match cli.command {
            Commands::Ping { config } => assert_eq!(config, Some(PathBuf::from("db.toml"))),
            _ => panic!("expected ping"),
        }
    }

    #[test]
    fn test_explain_requires_query() {
        assert!(Cli::try_parse_from(["repokit", "explain"]).is_err());
    }
}
