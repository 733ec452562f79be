use anyhow::anyhow;
use anyhow::Context;
use clap::Parser;
use config::Config;
use config::Overrides;
use slog::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::PgCounterStore;

mod config;
mod http;
mod model;
mod pool;
mod service;
mod store;

type DbConnection = diesel::PgConnection;

/// Counts visits to a web page and reports the running total
#[derive(Debug, Parser)]
#[command(name = "visitor-counter", version)]
struct Args {
    /// TOML config file; built-in defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// PostgreSQL URL of the database holding the counter table
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Name of the counter table
    #[arg(long, env = "TABLE_NAME")]
    table_name: Option<String>,

    /// Address for the HTTP server to listen on
    #[arg(long)]
    bind_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply(Overrides {
        database_url: args.database_url,
        table_name: args.table_name,
        bind_address: args.bind_address,
    })?;
    let db_url = config.database.url()?.to_string();

    let log =
        config.log.to_logger("visitor-counter").context("creating logger")?;
    let pool = pool::create_pool(log.clone(), &db_url, &config.database)
        .await
        .context("setting up database pool")?;
    let store =
        PgCounterStore::new(pool, config.database.table_name.clone());
    if config.database.create_table {
        store.ensure_table().await?;
        info!(&log, "ensured counter table exists";
            "table_name" => %store.table());
    }

    info!(&log, "setting up dropshot server";
        "table_name" => %store.table());
    let server = http::create_dropshot_server(
        config.dropshot,
        log.clone(),
        Arc::new(store),
    )
    .await?;
    info!(&log, "set up dropshot server";
        "local_address" => ?server.local_addr());
    server.await.map_err(|error| anyhow!("waiting for server: {:#}", error))
}
