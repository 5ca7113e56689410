//! JoinGuard service binary

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use joinguard_bot::{
    status::{self, StatusState},
    BotConfig, Dispatcher, TelegramClient,
};
use joinguard_common::{SubjectId, VERSION};
use joinguard_gate::{AdminConsole, GateMetrics, GroupRegistry, JsonFileStore, VerificationGate};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting JoinGuard v{}", VERSION);

    let config = BotConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let client = Arc::new(TelegramClient::new(
        &config.api_base_url,
        &config.bot_token,
        Duration::from_secs(config.poll_timeout_secs),
    )?);
    let me = client.get_me().await.context("getMe failed, check the bot token")?;
    info!(id = me.id, username = ?me.username, "authenticated with Bot API");

    let registry = prometheus::Registry::new();
    let metrics = Arc::new(GateMetrics::new());
    metrics.register(&registry)?;

    let groups = Arc::new(GroupRegistry::open(config.groups_path()).await?);
    info!("Known groups: {}", groups.len());

    let store = Arc::new(JsonFileStore::new(config.pending_path()));
    let gate = VerificationGate::new(
        config.gate.clone(),
        client.clone(),
        store,
        config.messages.clone(),
        metrics,
    );

    let report = gate.recover(Utc::now()).await?;
    info!(
        "Recovered pending verifications: resumed={}, expired={}",
        report.resumed, report.expired
    );

    if config.owner_id.is_none() {
        warn!("owner_id not set, operator commands are disabled");
    }
    let admin = AdminConsole::new(
        config.owner_id.map(SubjectId),
        groups.clone(),
        gate.clone(),
        client.clone(),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        SubjectId(me.id),
        gate.clone(),
        groups.clone(),
        admin,
        client.clone(),
        client.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let status_server = if config.status.enabled {
        let addr: SocketAddr = format!("{}:{}", config.status.host, config.status.port).parse()?;
        let app = status::router(StatusState {
            gate: gate.clone(),
            groups: groups.clone(),
            registry,
        });
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Status endpoint listening on {}", addr);

        let mut rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                warn!(error = %e, "status server failed");
            }
        }))
    } else {
        None
    };

    let poller = tokio::spawn(dispatcher.run(
        client.clone(),
        config.poll_timeout_secs,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    let _ = poller.await;
    if let Some(server) = status_server {
        let _ = server.await;
    }

    groups.persist().await?;
    info!("Pending verifications at shutdown: {}", gate.pending().len());
    info!("Shutting down JoinGuard");
    Ok(())
}
