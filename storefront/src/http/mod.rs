mod admin;
mod checkout;
mod nostr_api;
mod orders;
mod stream;
mod webhooks;

use crate::bus::EventBus;
use crate::driver::PaymentDriver;
use crate::notify::NotificationDispatcher;
use crate::settings::{AdminSettings, Settings};
use crate::shop_settings::ShopDocument;
use crate::state_machine::StateMachine;
use crate::watcher::PaymentWatcher;
use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use nostr_sdk::Keys;
use std::sync::Arc;
use storefront_db::StorefrontDb;
use storefront_nostr::RelayPool;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handles every request extractor can reach via `State`/`FromRef`.
/// Mirrors the teacher's `AxumApi<T>` pattern, generalized from one handler
/// trait to a plain state struct since this surface has no per-deployment
/// swap of the whole API, only of the payment backend underneath it.
#[derive(Clone)]
pub struct AppState {
    pub db: StorefrontDb,
    pub driver: Arc<dyn PaymentDriver>,
    pub state_machine: Arc<StateMachine>,
    pub watcher: Arc<PaymentWatcher>,
    pub bus: EventBus,
    pub relay: RelayPool,
    pub shop: Arc<RwLock<ShopDocument>>,
    pub nostr_keys: Keys,
    pub admin: AdminSettings,
    pub onchain_min_sats: u64,
    pub provider: String,
    pub notify: Arc<NotificationDispatcher>,
    cookie_key: Key,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: StorefrontDb,
        driver: Arc<dyn PaymentDriver>,
        state_machine: Arc<StateMachine>,
        watcher: Arc<PaymentWatcher>,
        bus: EventBus,
        relay: RelayPool,
        shop: Arc<RwLock<ShopDocument>>,
        nostr_keys: Keys,
        notify: Arc<NotificationDispatcher>,
        settings: &Settings,
    ) -> Self {
        Self {
            db,
            driver,
            state_machine,
            watcher,
            bus,
            relay,
            shop,
            nostr_keys,
            admin: settings.admin.clone(),
            onchain_min_sats: settings.onchain_min_sats,
            provider: crate::driver::provider_name(&settings.payment).to_string(),
            notify,
            cookie_key: Key::derive_from(settings.admin.session_secret.as_bytes()),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/checkout/create-invoice", post(checkout::create_invoice))
        .route("/api/invoices/:payment_hash/status", get(stream::invoice_status))
        .route("/api/invoices/:payment_hash/stream", get(stream::invoice_stream))
        .route("/api/onchain/:swap_id/status", get(stream::onchain_status))
        .route("/api/onchain/:swap_id/stream", get(stream::onchain_stream))
        .route("/api/webhooks/:provider", post(webhooks::receive))
        .route("/api/orders/mine", get(orders::mine))
        .route("/api/nostr/comment-proof", get(nostr_api::comment_proof))
        .route("/api/admin/orders/:id/status", post(admin::set_status))
        .route("/api/admin/orders/:id/resend-notification", post(admin::resend_notification))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
