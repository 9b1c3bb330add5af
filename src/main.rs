use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Context;

use crate::artwork::ArtworkCache;
use crate::cli::Cli;
use crate::config::Config;
use crate::http::AppState;
use crate::mpd::MpdAdapter;
use crate::pairing::{PairingStore, TouchRemoteListener};

mod artwork;
mod cli;
mod codec;
mod config;
mod error;
mod http;
mod mdns;
mod model;
mod mpd;
mod pairing;
mod query;
mod sort;
mod tags;

#[tokio::main]
async fn main() -> ExitCode {
    color_eyre::install().ok();
    setup_tracing(None);

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> color_eyre::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(Config::default_path)
        .ok_or_else(|| color_eyre::eyre::eyre!("no --config given and no platform config directory found"))?;
    let config = Config::load(&config_path).wrap_err("loading configuration")?;

    if let Some(filename) = &config.logging.filename {
        setup_tracing(Some(filename));
    }

    let mpd = MpdAdapter::connect(config.mpd_addr()).await.wrap_err("connecting to mpd")?;

    let pairing_conn = rusqlite::Connection::open(&config.db.path).wrap_err("opening pairing store")?;
    let pairing = Arc::new(PairingStore::open(pairing_conn).wrap_err("initializing pairing store")?);

    let artwork_conn = rusqlite::Connection::open(&config.db.path).wrap_err("opening artwork cache")?;
    let artwork = Arc::new(ArtworkCache::open(artwork_conn).wrap_err("initializing artwork cache")?);

    let remotes = Arc::new(TouchRemoteListener::new());
    let _remote_browser = mdns::spawn_remote_browser(remotes.clone())?;
    let _advertisement = mdns::advertise(config.server.port, &config.server.name, &config.server.id)?;

    let state = AppState {
        mpd,
        remotes,
        pairing,
        artwork,
        server_name: config.server.name.clone(),
        server_id: config.server.id.clone(),
    };

    let addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.wrap_err_with(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "serving dacp/daap");
    axum::serve(listener, http::router(state)).await.wrap_err("http server")?;

    Ok(())
}

fn setup_tracing(filename: Option<&std::path::Path>) {
    use tracing_subscriber::filter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = filter::EnvFilter::builder().from_env().unwrap_or_else(|_| filter::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match filename {
        Some(path) => {
            let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(path) else {
                return;
            };
            registry.with(fmt::layer().with_writer(file).with_ansi(false)).try_init()
        }
        None => registry.with(fmt::layer().pretty().with_line_number(true)).try_init(),
    };
    let _ignore_err = result;
}
