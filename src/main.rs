//! `npmrc-auth`: refresh Artifact Registry credentials in `.npmrc` files.
//!
//! Reads registry declarations from the project `.npmrc`, obtains an access
//! token and writes it to the user `~/.npmrc`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use npmrc_auth_rs::{AuthConfig, StaticToken, TokenChain, TokenSource, UpdateOptions};

/// Refresh Google Artifact Registry credentials for npm.
#[derive(Parser, Debug)]
#[command(name = "npmrc-auth", version, about)]
struct Cli {
    /// Path to the project .npmrc declaring registries
    /// [default: .npmrc in the nearest directory with package.json]
    #[arg(long, value_name = "PATH")]
    repo_config: Option<String>,

    /// Path to the .npmrc that receives credentials [default: ~/.npmrc]
    #[arg(long, value_name = "PATH")]
    credential_config: Option<String>,

    /// Write credentials for every registry host, not only Artifact Registry
    #[arg(long)]
    allow_all_domains: bool,

    /// Use this access token instead of looking one up
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Print debug logs
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AuthConfig::from_options(UpdateOptions {
        repo_config: cli.repo_config,
        credential_config: cli.credential_config,
        cwd: None,
        allow_all_domains: cli.allow_all_domains,
    })?;

    let source: Box<dyn TokenSource> = match cli.token {
        Some(token) => Box::new(StaticToken::new(token)),
        None => Box::new(TokenChain::google_default()),
    };
    let token = source
        .fetch_token()
        .context("could not obtain an access token")?;

    let summary = config.apply(&token).with_context(|| {
        format!(
            "failed to update {} from {}",
            config.credential_config.display(),
            config.repo_config.display()
        )
    })?;

    if summary.is_noop() {
        warn!(
            path = %config.repo_config.display(),
            "no registry in the project config received credentials; use --allow-all-domains for registries outside Artifact Registry"
        );
    }
    if config.is_shared() {
        println!("Credentials updated in {}", summary.target.display());
    } else {
        println!(
            "Credentials for registries in {} updated in {}",
            summary.source.display(),
            summary.target.display()
        );
    }

    Ok(())
}
