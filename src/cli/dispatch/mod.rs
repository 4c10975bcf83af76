//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{oracle, ARG_API_TOKEN, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| SecretString::from(dsn.clone()));
    let api_token = matches
        .get_one::<String>(ARG_API_TOKEN)
        .filter(|token| !token.trim().is_empty())
        .map(|token| SecretString::from(token.trim().to_string()))
        .context("missing required argument: --api-token")?;

    let oracle_opts = oracle::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        api_token,
        oracle_url: oracle_opts.url,
        oracle_timeout: oracle_opts.timeout,
    }))
}
