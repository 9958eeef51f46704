use std::{net::SocketAddr, sync::Arc};

use tokio::signal;
use tracing::{error, info, warn};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    let (event_sender, event_rx) = api::events::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(event_sender);
    let event_worker = tokio::spawn(api::events::process_events(event_rx));

    if cfg.payments.razorpay_key_secret.is_empty() {
        warn!("Razorpay key secret is not configured; payment verification will always fail");
    }
    if cfg.payments.razorpay_webhook_secret.is_none() {
        info!("Razorpay webhook secret not configured; webhook endpoint will answer 503");
    }
    let gateway = Arc::new(api::services::razorpay::RazorpayClient::new(&cfg.payments)?);

    let app_state = api::AppState::new(db_arc, cfg.clone(), event_sender, gateway);
    let app = api::build_router(app_state);

    let ip: std::net::IpAddr = cfg.host.parse()?;
    let addr = SocketAddr::new(ip, cfg.port);
    info!(environment = %cfg.environment, "storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        uptime_secs = api::handlers::health::uptime_secs(),
        "server stopped"
    );
    if tokio::time::timeout(std::time::Duration::from_secs(5), event_worker)
        .await
        .is_err()
    {
        warn!("event worker did not drain before shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
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
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
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
