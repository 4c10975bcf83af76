use crate::{
    api::{self, ApiToken, Services},
    cli::{globals::GlobalArgs, telemetry},
    latch::{HttpConnector, MemoryStorage, PgStorage, Storage},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub api_token: SecretString,
    pub oracle_url: String,
    pub oracle_timeout: Duration,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &self.dsn.as_ref().map(|_| "***"))
            .field("api_token", &"***")
            .field("oracle_url", &self.oracle_url)
            .field("oracle_timeout", &self.oracle_timeout)
            .finish()
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if storage cannot be reached, the oracle URL is invalid, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let globals = GlobalArgs::new(args.oracle_url, args.oracle_timeout, args.api_token);

    debug!("Global args: {:?}", globals);

    let storage = storage(args.dsn.as_ref()).await?;

    let connector = HttpConnector::new(&globals.oracle_url, globals.oracle_timeout)
        .with_context(|| format!("Invalid oracle URL: {}", globals.oracle_url))?;

    let services = Services::new(storage, Arc::new(connector), globals.oracle_timeout);

    let result = api::new(args.port, services, ApiToken::new(globals.api_token)).await;

    telemetry::shutdown_tracer();

    result
}

async fn storage(dsn: Option<&SecretString>) -> Result<Arc<dyn Storage>> {
    match dsn {
        Some(dsn) => {
            let storage = PgStorage::connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?;
            Ok(Arc::new(storage))
        }
        None => {
            warn!("No DSN given, latch credentials and bindings are kept in memory only");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}
