//! drip - paced outbound message campaign scheduler
//!
//! Main entry point for the drip server: opens the campaign store, wires
//! the dispatcher to the send endpoint, and serves the management API.

use anyhow::Result;
use clap::Parser;
use drip::database::{DatabaseConfig, DatabaseConnection, DatabasePath};
use drip::dispatcher::Dispatcher;
use drip::pacing::{DEFAULT_TZ_OFFSET_HOURS, tz_from_offset_hours};
use drip::rest_api::{AppState, create_router};
use drip::sender::HttpMessageSender;
use drip::server::{bind, run_scheduler_loop, serve};
use drip::store::{CampaignStore, SqliteCampaignStore};
use drip::time_provider::production_time_provider;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "drip", version, about = "Paced outbound message campaign scheduler")]
struct Args {
    /// Address to bind the management API on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Path to the SQLite campaign store
    #[arg(long, default_value = "data/drip.db")]
    database: PathBuf,

    /// URL of the downstream send endpoint
    #[arg(long)]
    endpoint_url: String,

    /// Campaign timezone as whole hours east of UTC
    #[arg(long, default_value_t = DEFAULT_TZ_OFFSET_HOURS)]
    tz_offset_hours: i32,

    /// Internal dispatch tick in seconds; 0 relies on an external trigger
    #[arg(long, default_value_t = 60)]
    tick_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("drip=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let tz = tz_from_offset_hours(args.tz_offset_hours)
        .ok_or_else(|| anyhow::anyhow!("invalid timezone offset: {}", args.tz_offset_hours))?;

    let path = DatabasePath::from_path(&args.database)?;
    let connection = DatabaseConnection::initialize(DatabaseConfig::new(path)).await?;
    let store: Arc<dyn CampaignStore> = Arc::new(SqliteCampaignStore::new(connection));
    info!(database = %args.database.display(), "Campaign store ready");

    let sender = Arc::new(HttpMessageSender::new(&args.endpoint_url)?);
    let time = production_time_provider();
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        sender,
        time.clone(),
        tz,
    ));

    if args.tick_secs > 0 {
        tokio::spawn(run_scheduler_loop(
            dispatcher.clone(),
            Duration::from_secs(args.tick_secs),
        ));
        info!(tick_secs = args.tick_secs, "Internal scheduler tick enabled");
    }

    let state = AppState {
        store,
        dispatcher,
        time,
        tz,
    };
    let (listener, addr) = bind(args.listen).await?;
    info!("drip API listening on http://{addr}");
    serve(listener, create_router(state)).await?;

    Ok(())
}
