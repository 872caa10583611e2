//! Storefront HTTP server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::api::{self, AppState};
use storefront::config::Config;
use storefront::events::EventPublisher;
use storefront::gateway::RazorpayGateway;
use storefront::notify::{mailer_from_config, Notifier};
use storefront::scheduler;
use storefront::services::AbandonedCartSweeper;
use storefront::store::{PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,storefront=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let pg = PgStore::connect(config.database_url.expose(), config.database_max_connections).await?;
    pg.run_migrations().await?;
    let store: Arc<dyn Store> = Arc::new(pg);

    let events = EventPublisher::connect(config.nats_url.as_deref()).await;
    let notifier = Notifier::new(mailer_from_config(&config.mail).context("Failed to build mailer")?);
    let gateway = Arc::new(RazorpayGateway::new(&config.gateway).context("Failed to build gateway client")?);

    let sweeper = Arc::new(AbandonedCartSweeper::new(store.clone(), notifier.clone(), &config.abandoned_cart));
    let _scheduler = scheduler::build_scheduler(sweeper, &config.abandoned_cart.sweep_cron)
        .await
        .context("Failed to start scheduler")?;

    let state = AppState::new(&config, store, gateway, notifier, events);
    let app = api::router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, store = %config.store_name, "Storefront listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
