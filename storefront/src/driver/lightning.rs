use super::{Capabilities, DriverStatus, DriverUpdate, InvoiceArtifact, PaymentDriver, SwapArtifact, WebhookEvent};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::pin::Pin;
use std::time::Duration as StdDuration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

/// Generic REST-driven Lightning node client (LND-shaped). Real node
/// operation (channel management, coin selection) is out of scope; this
/// wraps whatever invoicing API the configured node exposes.
#[derive(Clone)]
pub struct LightningDriver {
    http: reqwest::Client,
    base_url: String,
    macaroon_hex: String,
}

#[derive(Deserialize)]
struct AddInvoiceResponse {
    payment_request: String,
    r_hash: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct InvoiceLookupResponse {
    settled: bool,
    state: String,
}

#[derive(Deserialize)]
struct InvoiceSubscriptionEntry {
    r_hash: String,
    settled: bool,
}

impl LightningDriver {
    pub fn new(address: &str, _cert_path: &str, macaroon_path: &str) -> Result<Self> {
        let macaroon_hex = std::fs::read(macaroon_path)
            .map(hex::encode)
            .unwrap_or_default();
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(15))
            .build()
            .context("failed to build lightning http client")?;
        Ok(Self {
            http,
            base_url: address.trim_end_matches('/').to_string(),
            macaroon_hex,
        })
    }

    fn auth(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        rb.header("Grpc-Metadata-macaroon", &self.macaroon_hex)
    }
}

#[async_trait]
impl PaymentDriver for LightningDriver {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            lightning_invoice: true,
            onchain_swap: false,
            push_stream: true,
            status_poll: true,
            webhook_hmac_verify: false,
        }
    }

    async fn create_lightning_invoice(&self, amount_sats: u64, memo: &str, expiry_secs: u64) -> Result<InvoiceArtifact> {
        let rsp = self
            .auth(self.http.post(format!("{}/v1/invoices", self.base_url)))
            .json(&serde_json::json!({ "value": amount_sats, "memo": memo, "expiry": expiry_secs }))
            .send()
            .await
            .context("lightning node unreachable")?;

        if !rsp.status().is_success() {
            bail!("lightning node refused invoice creation: {}", rsp.status());
        }
        let body: AddInvoiceResponse = rsp.json().await.context("malformed invoice response")?;

        Ok(InvoiceArtifact {
            payment_request: body.payment_request,
            payment_hash: body.r_hash,
            satoshis: amount_sats,
            expires_at: Utc::now() + Duration::seconds(body.expires_at.max(expiry_secs as i64)),
        })
    }

    async fn create_onchain_swap(&self, _amount_sats: u64, _refund_pubkey: Option<&str>) -> Result<SwapArtifact> {
        bail!("lightning driver does not support on-chain swaps")
    }

    async fn invoice_status(&self, payment_hash: &str) -> Result<DriverStatus> {
        let rsp = self
            .auth(self.http.get(format!("{}/v1/invoice/{payment_hash}", self.base_url)))
            .send()
            .await
            .context("lightning node unreachable")?;
        if rsp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DriverStatus::Expired);
        }
        let body: InvoiceLookupResponse = rsp.json().await.context("malformed invoice lookup response")?;
        Ok(if body.settled {
            DriverStatus::Paid
        } else if body.state == "CANCELED" {
            DriverStatus::Failed
        } else {
            DriverStatus::Pending
        })
    }

    async fn subscribe_push(&self) -> Result<Pin<Box<dyn Stream<Item = DriverUpdate> + Send>>> {
        const BASE_BACKOFF: StdDuration = StdDuration::from_secs(3);
        const MAX_BACKOFF: StdDuration = StdDuration::from_secs(60);

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let http = self.http.clone();
        let base = self.base_url.clone();
        let macaroon = self.macaroon_hex.clone();
        tokio::spawn(async move {
            let mut backoff = BASE_BACKOFF;
            loop {
                let rsp = match http
                    .get(format!("{base}/v1/invoices/subscribe"))
                    .header("Grpc-Metadata-macaroon", &macaroon)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("lightning push poll failed, retrying in {backoff:?}: {e}");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                };
                backoff = BASE_BACKOFF;
                if let Ok(body) = rsp.json::<Vec<InvoiceSubscriptionEntry>>().await {
                    for inv in body {
                        if inv.settled
                            && tx
                                .send(DriverUpdate::Status {
                                    reference: inv.r_hash,
                                    status: DriverStatus::Paid,
                                })
                                .await
                                .is_err()
                        {
                            return;
                        }
                    }
                }
                tokio::time::sleep(BASE_BACKOFF).await;
            }
        });
        Ok(ReceiverStream::new(rx).boxed())
    }

    fn verify_webhook(&self, _headers: &http::HeaderMap, _raw_body: &[u8]) -> Result<WebhookEvent> {
        bail!("lightning driver does not deliver webhooks")
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
