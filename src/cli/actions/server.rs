use crate::{
    cli::telemetry,
    enlist::{self, handlers::SignupConfig, hasher::HashConfig, ServerConfig},
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub db_password: Option<SecretString>,
    pub db_max_connections: u32,
    pub signup_timeout: Duration,
    pub max_body_bytes: usize,
    pub hash: HashConfig,
}

/// Merge the optional database password into the DSN.
///
/// # Errors
/// Returns an error if the DSN is not a valid URL or cannot carry credentials.
pub fn build_dsn(dsn: &str, password: Option<&SecretString>) -> Result<SecretString> {
    let mut dsn = Url::parse(dsn).context("Invalid database connection string")?;

    if let Some(password) = password {
        dsn.set_password(Some(password.expose_secret()))
            .map_err(|()| anyhow!("Error setting password"))?;
    }

    Ok(SecretString::from(dsn.to_string()))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let dsn = build_dsn(&args.dsn, args.db_password.as_ref())?;

    let config = ServerConfig::new(args.port, dsn)
        .with_db_max_connections(args.db_max_connections)
        .with_max_body_bytes(args.max_body_bytes)
        .with_hash(args.hash)
        .with_signup(SignupConfig::default().with_timeout(args.signup_timeout));

    debug!("Server config: {:?}", config);

    let result = enlist::new(config).await;

    telemetry::shutdown_tracer();

    result
}
