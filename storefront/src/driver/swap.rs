use super::{Capabilities, DriverStatus, DriverUpdate, InvoiceArtifact, PaymentDriver, SwapArtifact, WebhookEvent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures_util::{stream, Stream};
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration as StdDuration;
use storefront_db::StorefrontDb;

/// Submarine-swap provider driver: converts an on-chain deposit into a
/// claimed Lightning payment. Modeled on the teacher's poll-fallback
/// `LNURLNode`, which has no native push channel either.
#[derive(Clone)]
pub struct SwapDriver {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    #[allow(dead_code)]
    db: StorefrontDb,
}

#[derive(Deserialize)]
struct CreateSwapResponse {
    id: String,
    address: String,
    expected_amount: u64,
    bip21: String,
}

#[derive(Deserialize)]
struct SwapStatusResponse {
    status: String,
}

impl SwapDriver {
    pub fn new(api_base: &str, api_key: &str, db: StorefrontDb) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(StdDuration::from_secs(15))
                .build()
                .expect("swap http client"),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            db,
        }
    }

    fn map_status(raw: &str) -> DriverStatus {
        match raw {
            "transaction.mempool" => DriverStatus::Mempool,
            "transaction.confirmed" => DriverStatus::Confirmed,
            "transaction.claimed" | "invoice.settled" => DriverStatus::Paid,
            "swap.expired" => DriverStatus::Expired,
            "transaction.failed" | "invoice.failedToPay" => DriverStatus::Failed,
            _ => DriverStatus::Pending,
        }
    }
}

#[async_trait]
impl PaymentDriver for SwapDriver {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            lightning_invoice: false,
            onchain_swap: true,
            push_stream: false,
            status_poll: true,
            webhook_hmac_verify: false,
        }
    }

    async fn create_lightning_invoice(&self, _amount_sats: u64, _memo: &str, _expiry_secs: u64) -> Result<InvoiceArtifact> {
        bail!("swap driver does not support lightning invoices")
    }

    async fn create_onchain_swap(&self, amount_sats: u64, refund_pubkey: Option<&str>) -> Result<SwapArtifact> {
        let rsp = self
            .http
            .post(format!("{}/v2/swap/submarine", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "invoiceAmount": amount_sats,
                "refundPublicKey": refund_pubkey,
            }))
            .send()
            .await
            .context("swap provider unreachable")?;

        if !rsp.status().is_success() {
            bail!("swap provider refused swap creation: {}", rsp.status());
        }
        let body: CreateSwapResponse = rsp.json().await.context("malformed swap response")?;

        Ok(SwapArtifact {
            swap_id: body.id,
            address: body.address,
            expected_amount_sats: body.expected_amount,
            bip21: body.bip21,
            expires_at: Utc::now() + Duration::minutes(60),
        })
    }

    async fn invoice_status(&self, swap_id: &str) -> Result<DriverStatus> {
        let rsp = self
            .http
            .get(format!("{}/v2/swap/{swap_id}", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .context("swap provider unreachable")?;
        if rsp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DriverStatus::Expired);
        }
        let body: SwapStatusResponse = rsp.json().await.context("malformed swap status response")?;
        Ok(Self::map_status(&body.status))
    }

    /// Push is unsupported for this provider; the watcher's polling loop
    /// is the sole evidence source, per spec.md §4.4 step 1-2.
    async fn subscribe_push(&self) -> Result<Pin<Box<dyn Stream<Item = DriverUpdate> + Send>>> {
        Ok(Box::pin(stream::empty()))
    }

    fn verify_webhook(&self, _headers: &http::HeaderMap, _raw_body: &[u8]) -> Result<WebhookEvent> {
        bail!("swap driver does not deliver webhooks")
    }
}
