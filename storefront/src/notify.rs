use crate::shop_settings::{NotificationTemplate, ShopDocument};
use crate::state_machine::NotificationSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use nostr_sdk::{EventBuilder, PublicKey};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use storefront_db::{Order, OrderStatus, StorefrontDb};
use storefront_nostr::RelayPool;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Renders and delivers the DM + email pair for a customer-visible status
/// change, gated by the outbox so each `(order, state, channel)` fires once.
/// Modeled on the teacher's mustache-templated index page; here the
/// "template" is the admin-editable per-state notification instead of a
/// static HTML shell.
pub struct NotificationDispatcher {
    db: StorefrontDb,
    relay: RelayPool,
    smtp: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
    shop: Arc<RwLock<ShopDocument>>,
}

impl NotificationDispatcher {
    pub fn new(
        db: StorefrontDb,
        relay: RelayPool,
        smtp_host: &str,
        smtp_user: &str,
        smtp_pass: &str,
        smtp_from: &str,
        smtp_reply_to: Option<&str>,
        shop: Arc<RwLock<ShopDocument>>,
    ) -> Result<Self> {
        let smtp = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .context("failed to build smtp transport")?
            .credentials(Credentials::new(smtp_user.to_string(), smtp_pass.to_string()))
            .build();
        let from: Mailbox = smtp_from.parse().context("invalid smtp from address")?;
        let reply_to = smtp_reply_to.map(|r| r.parse()).transpose().context("invalid smtp reply-to")?;
        Ok(Self { db, relay, smtp, from, reply_to, shop })
    }

    async fn render(template: &str, placeholders: &BTreeMap<&str, String>) -> Result<String> {
        let mustache_data = Value::Object(
            placeholders
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
                .collect(),
        );
        let compiled = mustache::compile_str(template).context("malformed notification template")?;
        compiled.render_to_string(&mustache_data).context("failed to render notification template")
    }

    fn placeholders(order: &Order, store_name: &str, status: OrderStatus) -> BTreeMap<&'static str, String> {
        let mut p = BTreeMap::new();
        p.insert("storeName", store_name.to_string());
        p.insert("orderId", order.id.clone());
        p.insert("status", status.to_string());
        p.insert("statusLabel", status.label().to_string());
        p.insert("totalSats", order.total_sats.to_string());
        p.insert("subtotalSats", order.subtotal_sats.to_string());
        p.insert("shippingSats", order.shipping_sats.to_string());
        p.insert("courier", order.courier.clone().unwrap_or_default());
        p.insert("tracking", order.tracking.clone().unwrap_or_default());
        p.insert(
            "productTitle",
            order.items.first().map(|i| i.title.clone()).unwrap_or_default(),
        );
        p.insert("customerName", order.address.line1.clone().unwrap_or_else(|| "there".to_string()));
        p.insert(
            "address",
            [&order.address.line1, &order.address.line2, &order.address.city, &order.address.postal_code]
                .iter()
                .filter_map(|v| v.as_ref())
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        );
        p.insert("createdAt", order.created_at.to_rfc3339());
        p.insert("paymentHash", order.payment_hash.clone().unwrap_or_default());
        p
    }

    async fn send_dm(&self, order: &Order, body: String) -> Result<()> {
        let Some(pubkey_hex) = order.contact.nostr_pubkey.as_deref() else {
            return Ok(());
        };
        let recipient = PublicKey::from_str(pubkey_hex).context("invalid recipient nostr pubkey")?;
        let signer = self.relay.client().signer().await.context("relay pool has no signer configured")?;
        let sender = signer.get_public_key().await.context("signer has no public key")?;
        let rumor = EventBuilder::private_msg_rumor(recipient, body).build(sender);
        let gift_wrap = EventBuilder::gift_wrap(&signer, &recipient, rumor, []).await?;
        let acks = self.relay.publish(&gift_wrap).await?;
        if !acks.iter().any(|a| a.ok) {
            warn!(order_id = %order.id, "dm notification reached zero relays");
        }
        Ok(())
    }

    async fn send_email(&self, order: &Order, subject: String, body: String, signature: &str) -> Result<()> {
        let Some(to_addr) = order.contact.email.as_deref() else {
            return Ok(());
        };
        let to: Mailbox = to_addr.parse().context("invalid customer email address")?;
        let mut builder = Message::builder().from(self.from.clone()).to(to).subject(subject);
        if let Some(reply_to) = self.reply_to.clone() {
            builder = builder.reply_to(reply_to);
        }
        let message = builder
            .body(format!("{body}\n\n{signature}"))
            .context("failed to build email message")?;
        self.smtp.send(message).await.context("smtp send failed")?;
        Ok(())
    }

    /// Attempts delivery for one `(order, state)` pair across both channels.
    /// Each channel claims the outbox independently so a DM success and an
    /// email failure don't retry the DM on the next dispatch attempt.
    pub async fn dispatch(&self, order_id: &str, target_state: OrderStatus) -> Result<()> {
        let order = self.db.get_order(order_id).await?;
        if order.status != target_state {
            // overtaken by a later transition before this dispatch ran; drop it
            return Ok(());
        }
        let shop = self.shop.read().await.clone();
        let template = match shop.templates.get(&target_state.to_string()) {
            Some(t) => t.clone(),
            None => {
                warn!(order_id, ?target_state, "no notification template configured for state");
                return Ok(());
            }
        };
        let placeholders = Self::placeholders(&order, &shop.store_name, target_state);

        self.dispatch_channel(&order, "dm", target_state, &template, &placeholders, &shop.email_signature)
            .await;
        self.dispatch_channel(&order, "email", target_state, &template, &placeholders, &shop.email_signature)
            .await;
        Ok(())
    }

    async fn dispatch_channel(
        &self,
        order: &Order,
        channel: &str,
        target_state: OrderStatus,
        template: &NotificationTemplate,
        placeholders: &BTreeMap<&str, String>,
        signature: &str,
    ) {
        let claimed = match self.db.outbox_claim(&order.id, target_state, channel).await {
            Ok(c) => c,
            Err(e) => {
                error!(order_id = %order.id, channel, "outbox claim failed: {e:#}");
                return;
            }
        };
        if !claimed {
            return;
        }

        let result = match channel {
            "dm" => match Self::render(&template.dm_body, placeholders).await {
                Ok(body) => self.send_dm(order, body).await,
                Err(e) => Err(e),
            },
            "email" => match (
                Self::render(&template.email_subject, placeholders).await,
                Self::render(&template.email_body, placeholders).await,
            ) {
                (Ok(subject), Ok(body)) => self.send_email(order, subject, body, signature).await,
                (Err(e), _) | (_, Err(e)) => Err(e),
            },
            _ => unreachable!("only dm/email channels are dispatched"),
        };

        // A claimed outbox row is never un-claimed on failure: per spec.md
        // §4.8 a provider-permanent failure stays logged, not silently
        // retried forever. Admin "resend" clears the row explicitly.
        if let Err(e) = result {
            error!(order_id = %order.id, channel, "notification delivery failed: {e:#}");
        } else {
            info!(order_id = %order.id, channel, ?target_state, "notification delivered");
        }
    }

    /// Admin "resend": clears the outbox claim for both channels so the next
    /// `dispatch` call fires again.
    pub async fn resend(&self, order_id: &str, target_state: OrderStatus) -> Result<()> {
        self.db.outbox_clear(order_id, target_state, "dm").await?;
        self.db.outbox_clear(order_id, target_state, "email").await?;
        self.dispatch(order_id, target_state).await
    }
}

#[async_trait]
impl NotificationSink for NotificationDispatcher {
    async fn enqueue(&self, order_id: &str, new_state: OrderStatus) {
        if let Err(e) = self.dispatch(order_id, new_state).await {
            error!(order_id, ?new_state, "notification dispatch failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn render_leaves_unknown_placeholders_empty() {
        let mut placeholders = BTreeMap::new();
        placeholders.insert("orderId", "abc123".to_string());
        let rendered = NotificationDispatcher::render("Order {{orderId}} / {{tracking}}.", &placeholders)
            .await
            .unwrap();
        assert_eq!(rendered, "Order abc123 / .");
    }
}
