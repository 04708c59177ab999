use std::sync::Arc;

use pairchat::{AppState, auth, config::Config, db, hub::Hub, media::MediaClient, profiles};
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env()?);

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    let db_pool = db::connect(&config.database_url).await?;
    db::migrate(&db_pool).await?;

    let clients = auth::Clients::load(&config.client_secret_path, &config.public_url)?;
    let app_state = AppState {
        db_pool: db_pool.clone(),
        clients,
        hub: Hub::default(),
        media: MediaClient::new(config.media.clone()),
        config: config.clone(),
    };
    if !app_state.media.is_configured() {
        warn!("media host not configured, uploads are disabled");
    }

    if let Some(period) = config.reconcile_interval {
        let hub = app_state.hub.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match profiles::reconcile_pairings(&db_pool, &hub).await {
                    Ok(repaired) if !repaired.is_empty() => info!(count = repaired.len(), "repaired pairings"),
                    Ok(_) => {}
                    Err(e) => warn!("pairing sweep failed: {e}"),
                }
            }
        });
    }

    let app = pairchat::router(app_state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
