mod api;
mod catalog;
mod config;
mod coordinator;
mod hub;
mod openapi;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use actix::Actor;
use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::Parser;
use clicktrack_types::{HubConfigResponse, SystemClock};
use tracing_subscriber::EnvFilter;

use crate::catalog::{DirCatalog, TrackCatalog};
use crate::coordinator::Coordinator;
use crate::hub::Hub;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "clicktrack-hub")]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:3000
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Directory of playable audio files
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Optional hub config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Delay between accepting play and the shared start, in ms
    #[arg(long)]
    lead_time_ms: Option<u64>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,clicktrack_hub=info,actix_web=info")
        }))
        .init();

    let cfg = config::ServerConfig::load_or_default(args.config.as_deref())?;
    let bind = match args.bind {
        Some(addr) => addr,
        None => match config::bind_from_config(&cfg)? {
            Some(addr) => addr,
            None => config::DEFAULT_BIND
                .parse()
                .context("parse default bind")?,
        },
    };
    let media_dir = args
        .media_dir
        .unwrap_or_else(|| config::media_dir_from_config(&cfg));
    let lead_time_ms = args
        .lead_time_ms
        .or(cfg.lead_time_ms)
        .unwrap_or(config::DEFAULT_LEAD_TIME_MS);
    let base_url = config::public_base_url_from_config(&cfg, bind);
    let advertised = HubConfigResponse {
        ws_url: config::ws_url_for(&base_url),
        base_url,
        port: bind.port(),
    };

    tracing::info!(
        bind = %bind,
        media_dir = %media_dir.display(),
        lead_time_ms,
        base_url = %advertised.base_url,
        "starting clicktrack-hub"
    );
    if !media_dir.is_dir() {
        tracing::warn!(media_dir = %media_dir.display(), "media dir missing; catalog is empty");
    }

    let _ = ctrlc::set_handler(move || {
        if let Some(system) = actix_web::rt::System::try_current() {
            system.stop();
        } else {
            std::process::exit(0);
        }
    });

    let catalog: Arc<dyn TrackCatalog> = Arc::new(DirCatalog::new(&media_dir));
    let hub = Hub::new(
        Coordinator::new(catalog.clone(), lead_time_ms),
        Arc::new(SystemClock),
    )
    .start();
    let state = web::Data::new(AppState::new(catalog, advertised));
    let hub = web::Data::new(hub);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(hub.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(openapi::openapi_json)
            .service(api::list_tracks)
            .service(api::hub_config)
            .service(api::health)
            .service(api::device_ws)
            .service(actix_files::Files::new("/audio", media_dir.clone()))
    })
    .bind(bind)
    .with_context(|| format!("bind {bind}"))?
    .run()
    .await?;

    Ok(())
}
