//! ssh-add-with-pass - add a passphrase-protected key to ssh-agent from a
//! script.
//!
//! The passphrase is read from the first line of standard input:
//!
//! ```text
//! pass show ssh/id_ed25519 | ssh-add-with-pass ~/.ssh/id_ed25519
//! ```

use std::future::{Future, pending};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ssh_add_with_pass::{
    AgentConfig, EnvConfig, FileConfig, Outcome, Reporter, Result, Secret, add_identity,
    read_secret,
};

/// Add an SSH key to the agent, answering its passphrase prompt from stdin.
#[derive(Debug, Parser)]
#[command(name = "ssh-add-with-pass")]
#[command(version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Private key file to add
    #[arg(value_name = "KEY_FILE")]
    key_file: PathBuf,

    /// Agent program to run instead of ssh-add
    #[arg(long, value_name = "PROGRAM")]
    agent: Option<String>,

    /// Path to a TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Build the layered configuration and read the secret.
fn prepare(cli: &Cli) -> Result<(AgentConfig, Secret)> {
    let mut config = AgentConfig::default();
    if let Some(path) = &cli.config {
        tracing::debug!(path = %path.display(), "loading configuration");
        config = config.apply_file(FileConfig::load(path)?);
    }
    config = config.apply_env(&EnvConfig::default())?;
    if let Some(agent) = &cli.agent {
        config.program.clone_from(agent);
    }
    config.validate()?;

    let secret = read_secret(io::stdin().lock())?;
    Ok((config, secret))
}

/// Resolves on the first SIGINT, SIGTERM or SIGHUP.
fn interrupted() -> impl Future<Output = ()> {
    let signals = pass_pty::interrupt_signals();
    async move {
        match signals {
            Ok(mut signals) => {
                if signals.recv().await.is_none() {
                    pending::<()>().await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for interrupt signals");
                pending::<()>().await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let mut reporter = Reporter::stderr();
    let outcome = match prepare(&cli) {
        Ok((config, secret)) => {
            tracing::debug!(program = %config.program, key = %cli.key_file.display(), "adding identity");
            add_identity(&config, &cli.key_file, &secret, interrupted()).await
        }
        Err(e) => Outcome::failed(e),
    };

    ExitCode::from(reporter.report(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_v_prints_version() {
        let err = Cli::try_parse_from(["ssh-add-with-pass", "-v"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn key_file_is_required() {
        let err = Cli::try_parse_from(["ssh-add-with-pass"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_options() {
        let cli = Cli::try_parse_from([
            "ssh-add-with-pass",
            "--agent",
            "/usr/bin/ssh-add",
            "--log-level",
            "debug",
            "/home/me/.ssh/id_ed25519",
        ])
        .unwrap();
        assert_eq!(cli.agent.as_deref(), Some("/usr/bin/ssh-add"));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.key_file, PathBuf::from("/home/me/.ssh/id_ed25519"));
    }
}
