use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use nostr_sdk::Keys;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use storefront::bus::EventBus;
use storefront::driver::create_driver;
use storefront::http;
use storefront::notify::NotificationDispatcher;
use storefront::settings::Settings;
use storefront::shop_settings::ShopDocument;
use storefront::state_machine::StateMachine;
use storefront::watcher::PaymentWatcher;
use storefront_db::StorefrontDb;
use storefront_nostr::RelayPool;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const PENDING_ORDER_TTL: ChronoDuration = ChronoDuration::hours(24);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::from(0),
        Err(e) if e.is::<ConfigError>() => {
            error!("configuration error: {e:#}");
            ExitCode::from(1)
        }
        Err(e) if e.is::<DbInitError>() => {
            error!("database init failed: {e:#}");
            ExitCode::from(2)
        }
        Err(e) if e.is::<ShutdownTimeout>() => {
            error!("{e:#}");
            ExitCode::from(3)
        }
        Err(e) => {
            error!("fatal error: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ConfigError(String);

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct DbInitError(String);

async fn run() -> Result<()> {
    let settings = Settings::load().map_err(|e| ConfigError(e.to_string()))?;

    let db = StorefrontDb::new(&settings.db_file)
        .await
        .map_err(|e| DbInitError(e.to_string()))?;
    db.migrate().await.map_err(|e| DbInitError(e.to_string()))?;

    let nostr_keys = Keys::parse(&settings.nostr.secret_key).context("invalid SHOP_NOSTR_SECRET_HEX")?;
    let relay = RelayPool::connect(nostr_keys.clone(), &settings.nostr.relays)
        .await
        .context("failed to connect to nostr relays")?;

    let shop_doc = ShopDocument::load_or_default(&db).await.context("failed to load shop settings")?;
    if let Err(e) = storefront::mirror::publish_catalog(&db, &relay, &shop_doc).await {
        warn!("initial stall/product mirror publish failed: {e:#}");
    }
    let shop = Arc::new(tokio::sync::RwLock::new(shop_doc));

    let driver = create_driver(&settings.payment, db.clone()).await?;

    let bus = EventBus::new();

    let notify = Arc::new(
        NotificationDispatcher::new(
            db.clone(),
            relay.clone(),
            &settings.smtp.host,
            &settings.smtp.user,
            &settings.smtp.pass,
            &settings.smtp.from,
            settings.smtp.reply_to.as_deref(),
            shop.clone(),
        )
        .context("failed to build notification dispatcher")?,
    );

    let state_machine = Arc::new(StateMachine::new(db.clone(), bus.clone(), notify.clone()));
    let watcher = Arc::new(PaymentWatcher::new(db.clone(), driver.clone(), state_machine.clone()));
    watcher.resume_all().await.context("failed to resume in-flight payment watchers")?;

    let shutdown = CancellationToken::new();
    let maintenance = tokio::spawn(maintenance_loop(db.clone(), shutdown.clone()));

    let state = http::AppState::new(
        db.clone(),
        driver,
        state_machine,
        watcher.clone(),
        bus,
        relay.clone(),
        shop,
        nostr_keys,
        notify,
        &settings,
    );
    let app = http::router(state);

    let listener = TcpListener::bind(&settings.listen_http)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_http))?;
    info!("listening on {}", settings.listen_http);

    let http_shutdown = CancellationToken::new();
    let http_shutdown_trigger = http_shutdown.clone();
    let serve_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown_trigger.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    // Phase one: stop accepting new HTTP connections and let watchers/relay
    // subscriptions unwind their current iteration.
    http_shutdown.cancel();
    shutdown.cancel();
    watcher.shutdown().await;
    maintenance.abort();

    // Phase two: wait up to the configured grace period for everything to
    // drain cleanly, then force.
    let timed_out = tokio::time::timeout(SHUTDOWN_GRACE, serve_task).await.is_err();
    relay.shutdown().await;

    if timed_out {
        warn!("graceful shutdown timed out after {SHUTDOWN_GRACE:?}, forcing exit");
        return Err(ShutdownTimeout.into());
    }

    info!("server closed");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("shutdown drain exceeded its grace period")]
struct ShutdownTimeout;

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Sweeps orders stuck in PENDING long past any reasonable invoice expiry —
/// a safety net for orders whose watcher died without a process restart to
/// pick them back up (e.g. a panic in a driver call before this task existed).
async fn maintenance_loop(db: StorefrontDb, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(MAINTENANCE_INTERVAL) => {
                match db.prune_pending_older_than(PENDING_ORDER_TTL).await {
                    Ok(pruned) if !pruned.is_empty() => info!(count = pruned.len(), "pruned stale pending orders"),
                    Ok(_) => {}
                    Err(e) => warn!("pending order sweep failed: {e:#}"),
                }
            }
        }
    }
}
