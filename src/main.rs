use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    signal,
    sync::{mpsc, watch},
};
use tracing::{error, info, warn};

use storefront_core as api;
use api::services::payment_gateway::{PaymentGateway, StripeGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    let events_task = tokio::spawn(api::events::process_events(event_rx));

    // Payment gateway is optional; without it checkout reports unavailable
    let payment_gateway: Option<Arc<dyn PaymentGateway>> =
        match cfg.payment_gateway_secret_key.as_deref() {
            Some(key) if !key.is_empty() => Some(Arc::new(StripeGateway::new(
                cfg.payment_gateway_url.clone(),
                key,
                cfg.payment_gateway_timeout(),
            )?)),
            _ => {
                warn!("payment gateway key not configured; checkout will be unavailable");
                None
            }
        };

    if cfg.payment_webhook_secret.is_none() {
        warn!("payment webhook secret not configured; every webhook will be rejected");
    }

    let app_state = api::AppState::new(db_arc, cfg.clone(), payment_gateway, Some(event_sender));

    // Background purge of expired cache entries, stopped on shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let purge_task = app_state.cache.spawn_purge_task(
        Duration::from_secs(cfg.cache_cleanup_interval_secs),
        shutdown_rx,
    );

    let app = api::build_router(app_state);

    // Bind and serve
    let ip: std::net::IpAddr = cfg.host.parse()?;
    let addr = SocketAddr::from((ip, cfg.port));
    info!("storefront-core listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = purge_task.await {
        warn!(error = %e, "cache purge task ended abnormally");
    }
    // The router, and with it every event sender, is gone by now.
    match tokio::time::timeout(Duration::from_secs(5), events_task).await {
        Ok(Err(e)) => warn!(error = %e, "event processor ended abnormally"),
        Err(_) => warn!("event processor did not drain in time"),
        Ok(Ok(())) => {}
    }
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
