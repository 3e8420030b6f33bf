//! Attendance badges binary entrypoint wiring the badge store, the event feed,
//! the HTTP routes and the presentation host WebSocket.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attendance_badges::{
    config::AppConfig,
    dao::{
        badge_store::{BadgeStore, memory::MemoryBadgeStore},
        dal::Dal,
        event_feed::HttpEventFeed,
    },
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = connect_store().await?;
    let feed = HttpEventFeed::new(config.feed_config()).context("building event feed client")?;
    let dal = Arc::new(Dal::new(store, Arc::new(feed), config.dal_options()));

    // Initialization runs once in the background; failures leave the layer rejected until restart.
    let init_dal = Arc::clone(&dal);
    tokio::spawn(async move {
        if init_dal.initialize().await.is_err() {
            error!("badge store unavailable until restart");
        }
    });

    let app_state = AppState::new(dal);
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Connect to Postgres when `DATABASE_URL` is set, otherwise keep everything in memory.
#[cfg(feature = "postgres-store")]
async fn connect_store() -> anyhow::Result<Arc<dyn BadgeStore>> {
    use attendance_badges::dao::badge_store::postgres::{PostgresBadgeStore, PostgresConfig};

    match PostgresConfig::from_env() {
        Ok(config) => {
            let store = PostgresBadgeStore::connect(config)
                .await
                .context("connecting to postgres")?;
            info!("using postgres badge store");
            Ok(Arc::new(store))
        }
        Err(err) => {
            info!(reason = %err, "using in-memory badge store");
            Ok(Arc::new(MemoryBadgeStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres-store"))]
async fn connect_store() -> anyhow::Result<Arc<dyn BadgeStore>> {
    info!("postgres support disabled; using in-memory badge store");
    Ok(Arc::new(MemoryBadgeStore::new()))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
