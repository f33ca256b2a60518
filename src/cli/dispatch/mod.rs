//! Map parsed arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    hash, ARG_DB_MAX_CONNECTIONS, ARG_DB_PASSWORD, ARG_DSN, ARG_MAX_BODY_BYTES, ARG_PORT,
    ARG_SIGNUP_TIMEOUT,
};
use crate::enlist::request_log::DEFAULT_BODY_LIMIT;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let db_password = matches
        .get_one::<String>(ARG_DB_PASSWORD)
        .map(|password| SecretString::from(password.clone()));

    let db_max_connections = matches
        .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
        .copied()
        .unwrap_or(5);

    let signup_timeout = Duration::from_secs(
        matches
            .get_one::<u64>(ARG_SIGNUP_TIMEOUT)
            .copied()
            .unwrap_or(10),
    );

    let max_body_bytes = matches
        .get_one::<usize>(ARG_MAX_BODY_BYTES)
        .copied()
        .unwrap_or(DEFAULT_BODY_LIMIT);

    Ok(Action::Server(Args {
        port,
        dsn,
        db_password,
        db_max_connections,
        signup_timeout,
        max_body_bytes,
        hash: hash::parse(matches),
    }))
}
