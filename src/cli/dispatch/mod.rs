//! Map parsed CLI arguments to the action to run.

use crate::cli::actions::{Action, clear_attempts, server};
use crate::cli::commands::{attempts, auth};
use anyhow::{Context, Result};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    match matches.subcommand() {
        Some((attempts::CMD_CLEAR_ATTEMPTS, sub_m)) => {
            let options = attempts::Options::parse(sub_m)?;
            Ok(Action::ClearAttempts(clear_attempts::Args {
                dsn,
                email: options.email,
                client_ip: options.client_ip,
                store_timeout_ms: auth_opts.store_timeout_ms,
            }))
        }
        _ => Ok(Action::Server(server::Args {
            port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
            dsn,
            max_attempts: auth_opts.max_attempts,
            window_seconds: auth_opts.window_seconds,
            store_timeout_ms: auth_opts.store_timeout_ms,
            trust_proxy: auth_opts.trust_proxy,
        })),
    }
}
