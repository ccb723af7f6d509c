//! # biosite CLI Module
//!
//! This module implements the CLI interface for biosite.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show row counts per table
//! - `init` - Initialize a new database
//! - `export` - Dump every content table to a JSON file
//! - `create-user` - Create an administrator account

mod commands;

use crate::config::{ConfigError, ServerConfig};
use biosite_core::BiositeError;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// biosite - biography website backend
///
/// Serves the achievements timeline, gallery, events, subscriptions and
/// contact messages of a biography site over a JSON REST API.
#[derive(Parser, Debug)]
#[command(name = "biosite")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides config and BIOSITE_DB)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Open POST /auth/register to the public
        #[arg(long)]
        allow_registration: bool,
    },

    /// Show row counts per table
    Status,

    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Export all content tables as JSON
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Create an administrator account
    CreateUser {
        #[arg(short, long)]
        email: String,

        /// At least 8 characters; shows up in the process list, so prefer
        /// BIOSITE_ADMIN_PASSWORD or --password-stdin
        #[arg(short, long, env = "BIOSITE_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Read the password from the first line of standard input
        #[arg(long)]
        password_stdin: bool,

        #[arg(short, long)]
        name: Option<String>,
    },
}

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] BiositeError),

    #[error("no password given (use --password-stdin or BIOSITE_ADMIN_PASSWORD)")]
    MissingPassword,

    #[error("failed to read password: {0}")]
    Input(#[from] std::io::Error),
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server {
            host,
            port,
            allow_registration,
        }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.allow_registration |= allow_registration;
            cmd_server(config).await?;
        }
        Some(Commands::Status) | None => cmd_status(&config, json_mode)?,
        Some(Commands::Init { force }) => cmd_init(&config.database, force)?,
        Some(Commands::Export { output }) => cmd_export(&config.database, &output)?,
        Some(Commands::CreateUser {
            email,
            password,
            password_stdin,
            name,
        }) => {
            let password = read_password(password, password_stdin, std::io::stdin().lock())?;
            cmd_create_user(&config, json_mode, email, password, name)?;
        }
    }
    Ok(())
}

/// Standard input wins over `--password` and the environment.
fn read_password(
    given: Option<String>,
    from_stdin: bool,
    mut input: impl BufRead,
) -> Result<String, CliError> {
    let password = if from_stdin {
        let mut line = String::new();
        input.read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else {
        given.unwrap_or_default()
    };
    if password.is_empty() {
        return Err(CliError::MissingPassword);
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "biosite",
            "server",
            "--port",
            "9000",
            "-D",
            "site.redb",
            "--quiet",
        ])
        .expect("parse");
        assert!(cli.quiet);
        assert_eq!(cli.database, Some(PathBuf::from("site.redb")));
        assert!(matches!(
            cli.command,
            Some(Commands::Server {
                port: Some(9000),
                ..
            })
        ));
    }

    #[test]
    fn create_user_requires_email() {
        assert!(Cli::try_parse_from(["biosite", "create-user", "--password", "x"]).is_err());
        assert!(
            Cli::try_parse_from(["biosite", "create-user", "--email", "a@b.co", "--password-stdin"])
                .is_ok()
        );
        assert!(
            Cli::try_parse_from([
                "biosite",
                "create-user",
                "--email",
                "a@b.co",
                "--password",
                "long-enough"
            ])
            .is_ok()
        );
    }

    #[test]
    fn password_is_read_from_the_first_stdin_line() {
        let password = read_password(
            Some("from-flag".into()),
            true,
            &b"correct horse\r\nsecond line\n"[..],
        )
        .expect("password");
        assert_eq!(password, "correct horse");
    }

    #[test]
    fn password_falls_back_to_the_argument() {
        let password =
            read_password(Some("long-enough".into()), false, &b""[..]).expect("password");
        assert_eq!(password, "long-enough");
    }

    #[test]
    fn missing_password_is_an_error() {
        assert!(matches!(
            read_password(None, false, &b""[..]),
            Err(CliError::MissingPassword)
        ));
        assert!(matches!(
            read_password(None, true, &b"\n"[..]),
            Err(CliError::MissingPassword)
        ));
    }
}
