pub mod hosted;
pub mod lightning;
pub mod swap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::settings::PaymentBackend;
use storefront_db::StorefrontDb;

/// Status a driver can report for a payment reference. Monotonic within a
/// single order's happy path; a driver MUST NOT report `Paid` before
/// `Pending`, but MAY report `Mempool`/`Confirmed` out of wall-clock order —
/// the watcher treats the state graph, not report order, as authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Pending,
    Mempool,
    Confirmed,
    Paid,
    Expired,
    Failed,
}

#[derive(Debug, Clone)]
pub struct InvoiceArtifact {
    pub payment_request: String,
    pub payment_hash: String,
    pub satoshis: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SwapArtifact {
    pub swap_id: String,
    pub address: String,
    pub expected_amount_sats: u64,
    pub bip21: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum DriverUpdate {
    Status { reference: String, status: DriverStatus },
    Error(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub lightning_invoice: bool,
    pub onchain_swap: bool,
    pub push_stream: bool,
    pub status_poll: bool,
    pub webhook_hmac_verify: bool,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub order_ref: String,
    pub new_state: DriverStatus,
}

#[async_trait]
pub trait PaymentDriver: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    async fn create_lightning_invoice(
        &self,
        amount_sats: u64,
        memo: &str,
        expiry_secs: u64,
    ) -> Result<InvoiceArtifact>;

    async fn create_onchain_swap(
        &self,
        amount_sats: u64,
        refund_pubkey: Option<&str>,
    ) -> Result<SwapArtifact>;

    async fn invoice_status(&self, reference: &str) -> Result<DriverStatus>;

    /// Long-lived push subscription. Drivers that don't support push
    /// return an immediately-empty stream rather than an error — the
    /// watcher treats "unsupported" and "supported but idle" identically.
    async fn subscribe_push(&self) -> Result<Pin<Box<dyn Stream<Item = DriverUpdate> + Send>>>;

    fn verify_webhook(&self, headers: &http::HeaderMap, raw_body: &[u8]) -> Result<WebhookEvent>;
}

pub fn to_order_status(s: DriverStatus) -> storefront_db::OrderStatus {
    use storefront_db::OrderStatus as O;
    match s {
        DriverStatus::Pending => O::Pending,
        DriverStatus::Mempool => O::Mempool,
        DriverStatus::Confirmed => O::Confirmed,
        DriverStatus::Paid => O::Paid,
        DriverStatus::Expired => O::Expired,
        DriverStatus::Failed => O::Failed,
    }
}

pub fn provider_name(cfg: &PaymentBackend) -> &'static str {
    match cfg {
        PaymentBackend::Lightning { .. } => "lightning",
        PaymentBackend::Swap { .. } => "swap",
        PaymentBackend::Hosted { .. } => "hosted",
    }
}

pub async fn create_driver(cfg: &PaymentBackend, db: StorefrontDb) -> Result<Arc<dyn PaymentDriver>> {
    match cfg {
        PaymentBackend::Lightning { address, cert, macaroon } => {
            tracing::info!("using lightning payment backend: {address}");
            Ok(Arc::new(lightning::LightningDriver::new(address, cert, macaroon)?))
        }
        PaymentBackend::Swap { api_base, api_key } => {
            tracing::info!("using on-chain swap payment backend: {api_base}");
            Ok(Arc::new(swap::SwapDriver::new(api_base, api_key, db)))
        }
        PaymentBackend::Hosted { api_base, api_key, webhook_secret } => {
            tracing::info!("using hosted payment backend: {api_base}");
            Ok(Arc::new(hosted::HostedDriver::new(api_base, api_key, webhook_secret)))
        }
    }
}
