use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::fmt::{Display, Formatter};

/// Order lifecycle state. See the transition graph owned by the state
/// machine crate; this enum only carries the storage representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Mempool,
    Confirmed,
    Paid,
    Preparation,
    Shipped,
    Expired,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Expired | OrderStatus::Failed)
    }

    pub fn is_payment_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid
                | OrderStatus::Preparation
                | OrderStatus::Shipped
                | OrderStatus::Expired
                | OrderStatus::Failed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Mempool => "MEMPOOL",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Preparation => "IN PREPARATION",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Mempool => "MEMPOOL",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Preparation => "PREPARATION",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentMethod {
    Lightning,
    Onchain,
}

/// One snapshotted line item. Title/price are frozen at order time and never
/// re-read from the product table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub title: String,
    pub price_sats: u64,
    pub qty: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShippingAddress {
    pub country: String,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContactChannels {
    pub email: Option<String>,
    pub telegram: Option<String>,
    pub nostr_pubkey: Option<String>,
    pub phone: Option<String>,
}

impl ContactChannels {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.telegram.is_none()
            && self.nostr_pubkey.is_none()
            && self.phone.is_none()
    }
}

/// The aggregate root. `items`, `address` and `contact` are stored as JSON
/// text columns (shape-loose, boundary-validated on the way in) and
/// deserialized here the way the row is read back.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub provider: String,
    pub payment_hash: Option<String>,
    pub payment_request: Option<String>,
    pub swap_id: Option<String>,
    pub onchain_address: Option<String>,
    pub onchain_amount_sats: Option<i64>,
    pub bip21: Option<String>,
    pub subtotal_sats: i64,
    pub shipping_sats: i64,
    pub total_sats: i64,
    pub items_json: String,
    pub address_json: String,
    pub contact_json: String,
    pub notes: Option<String>,
    pub courier: Option<String>,
    pub tracking: Option<String>,
    pub session_id: Option<String>,
    pub invoice_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The decoded, application-facing view of an order row.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub provider: String,
    pub payment_hash: Option<String>,
    pub payment_request: Option<String>,
    pub swap_id: Option<String>,
    pub onchain_address: Option<String>,
    pub onchain_amount_sats: Option<u64>,
    pub bip21: Option<String>,
    pub subtotal_sats: u64,
    pub shipping_sats: u64,
    pub total_sats: u64,
    pub items: Vec<OrderItem>,
    pub address: ShippingAddress,
    pub contact: ContactChannels,
    pub notes: Option<String>,
    pub courier: Option<String>,
    pub tracking: Option<String>,
    pub session_id: Option<String>,
    pub invoice_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = anyhow::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            status: row.status,
            payment_method: row.payment_method,
            provider: row.provider,
            payment_hash: row.payment_hash,
            payment_request: row.payment_request,
            swap_id: row.swap_id,
            onchain_address: row.onchain_address,
            onchain_amount_sats: row.onchain_amount_sats.map(|v| v as u64),
            bip21: row.bip21,
            subtotal_sats: row.subtotal_sats as u64,
            shipping_sats: row.shipping_sats as u64,
            total_sats: row.total_sats as u64,
            items: serde_json::from_str(&row.items_json)?,
            address: serde_json::from_str(&row.address_json)?,
            contact: serde_json::from_str(&row.contact_json)?,
            notes: row.notes,
            courier: row.courier,
            tracking: row.tracking,
            session_id: row.session_id,
            invoice_expires_at: row.invoice_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Draft passed to `Orders::create`, before an id or timestamps are assigned.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub payment_method: PaymentMethod,
    pub provider: String,
    pub payment_hash: Option<String>,
    pub payment_request: Option<String>,
    pub swap_id: Option<String>,
    pub onchain_address: Option<String>,
    pub onchain_amount_sats: Option<u64>,
    pub bip21: Option<String>,
    pub subtotal_sats: u64,
    pub shipping_sats: u64,
    pub items: Vec<OrderItem>,
    pub address: ShippingAddress,
    pub contact: ContactChannels,
    pub notes: Option<String>,
    pub session_id: Option<String>,
    pub invoice_expires_at: DateTime<Utc>,
}

impl OrderDraft {
    pub fn total_sats(&self) -> u64 {
        self.subtotal_sats + self.shipping_sats
    }
}

/// Singleton settings document. Nested shipping/nostr/template structures are
/// kept on the application side as JSON; the store only persists the blob and
/// its update timestamp, the way a cyclic/loosely-shaped settings object is
/// meant to be handled per the design notes.
#[derive(Debug, Clone, FromRow)]
pub struct SettingsRow {
    pub id: i64,
    pub document_json: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CartSnapshotRow {
    pub nostr_pubkey: String,
    pub content_json: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NostrAck {
    pub relay: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
pub enum MirrorKind {
    Stall,
    Product,
}

#[derive(Debug, Clone, FromRow)]
pub struct NostrMirrorRow {
    pub kind: MirrorKind,
    /// `"main"` for the stall, the product id for a product.
    pub d_tag: String,
    pub last_event_id: String,
    pub last_content_hash: String,
    pub last_published_at: DateTime<Utc>,
    pub last_ack_json: String,
}

/// `(orderId, targetState, channel)` idempotency rows.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxRow {
    pub order_id: String,
    pub target_state: OrderStatus,
    pub channel: String,
    pub claimed_at: DateTime<Utc>,
}
