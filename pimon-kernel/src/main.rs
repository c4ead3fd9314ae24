/**
 * PIMON KERNEL - Point d'entrée du moniteur Raspberry Pi
 *
 * RÔLE : Bootstrap config, logging, journal SQLite, proxy chat, captioning
 * et serveur HTTP.
 *
 * ARCHITECTURE : API REST (axum) + collecteurs télémétrie + proxy vers le
 * serveur d'inférence local + journal persistant des échanges.
 * UTILITÉ : Dashboard unique du Pi pour le club (état machine + assistant IA).
 */

mod caption;
mod chat;
mod config;
mod http;
mod models;
mod ports;

use crate::caption::CaptionRunner;
use crate::chat::ChatProxy;
use crate::config::load_config;
use crate::http::AppState;
use crate::ports::{SharedLog, SqliteExchangeLog};

use anyhow::Context;
use pimon_telemetry::TelemetryCollector;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("pimon_kernel=info,pimon_telemetry=info,tower_http=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = load_config().await;

    // journal des échanges, ouvert une fois et partagé
    let log: SharedLog = Arc::new(
        SqliteExchangeLog::open(&cfg.store.path)
            .with_context(|| format!("failed to open exchange log {}", cfg.store.path.display()))?,
    );

    let telemetry = TelemetryCollector::new(cfg.telemetry.clone());
    let chat = ChatProxy::new(cfg.chat.clone(), Arc::clone(&log))
        .context("failed to build HTTP client")?;
    info!(
        "chat proxy → {} (default model {}, timeout {:?})",
        cfg.chat.endpoint,
        cfg.chat.default_model,
        cfg.chat.timeout()
    );

    let captions = CaptionRunner::new(cfg.caption.clone());
    tokio::fs::create_dir_all(captions.upload_dir())
        .await
        .with_context(|| {
            format!("failed to create upload dir {}", captions.upload_dir().display())
        })?;

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        telemetry: Arc::new(telemetry),
        chat: Arc::new(chat),
        logs: log,
        captions: Arc::new(captions),
    };

    // HTTP
    let app = http::build_router(app_state, &cfg.server.static_dir);

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
