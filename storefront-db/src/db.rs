use crate::{
    CartSnapshotRow, MirrorKind, NostrMirrorRow, Order, OrderDraft, OrderRow, OrderStatus,
    OutboxRow, SettingsRow,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Thrown when a caller asks for a row that does not exist.
#[derive(Debug, thiserror::Error)]
#[error("not found")]
pub struct NotFoundError;

#[derive(Clone)]
pub struct StorefrontDb {
    db: SqlitePool,
}

impl StorefrontDb {
    pub async fn new(path: &str) -> Result<Self> {
        let url = if path.contains("://") {
            path.to_string()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.db).await?;
        Ok(())
    }

    fn new_order_id() -> String {
        // short, printable, case-insensitive-unique: lowercase hex of a uuid v4 prefix
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order> {
        let id = Self::new_order_id();
        let now = Utc::now();
        let items_json = serde_json::to_string(&draft.items)?;
        let address_json = serde_json::to_string(&draft.address)?;
        let contact_json = serde_json::to_string(&draft.contact)?;
        let total = draft.total_sats();

        sqlx::query(
            r#"insert into orders
            (id, status, payment_method, provider, payment_hash, payment_request, swap_id,
             onchain_address, onchain_amount_sats, bip21, subtotal_sats, shipping_sats,
             total_sats, items_json, address_json, contact_json, notes, courier, tracking,
             session_id, invoice_expires_at, created_at, updated_at)
            values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(OrderStatus::Pending)
        .bind(draft.payment_method)
        .bind(&draft.provider)
        .bind(&draft.payment_hash)
        .bind(&draft.payment_request)
        .bind(&draft.swap_id)
        .bind(&draft.onchain_address)
        .bind(draft.onchain_amount_sats.map(|v| v as i64))
        .bind(&draft.bip21)
        .bind(draft.subtotal_sats as i64)
        .bind(draft.shipping_sats as i64)
        .bind(total as i64)
        .bind(&items_json)
        .bind(&address_json)
        .bind(&contact_json)
        .bind(&draft.notes)
        .bind(&draft.session_id)
        .bind(draft.invoice_expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get_order(&id).await
    }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        let row: Option<OrderRow> = sqlx::query_as("select * from orders where id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.ok_or_else(not_found)?.try_into()
    }

    pub async fn get_order_opt(&self, id: &str) -> Result<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as("select * from orders where id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn by_payment_hash(&self, payment_hash: &str) -> Result<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as("select * from orders where payment_hash = ?")
            .bind(payment_hash)
            .fetch_optional(&self.db)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn by_swap_id(&self, swap_id: &str) -> Result<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as("select * from orders where swap_id = ?")
            .bind(swap_id)
            .fetch_optional(&self.db)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Conditional update: only applies if the current status is one of
    /// `from`. Returns `(applied, order-after-the-attempt, status-before-the-attempt)`
    /// so the caller (the state machine) never double-fires a transition and
    /// can still report the real predecessor state even though `order.status`
    /// already reflects `to` by the time this returns.
    pub async fn transition_status(
        &self,
        id: &str,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<(bool, Order, OrderStatus)> {
        let mut tx = self.db.begin().await?;
        let current: OrderRow = sqlx::query_as("select * from orders where id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let prior_status = current.status;

        if !from.iter().any(|s| *s == current.status) {
            tx.commit().await?;
            return Ok((false, current.try_into()?, prior_status));
        }

        let now = Utc::now();
        let result = sqlx::query("update orders set status = ?, updated_at = ? where id = ? and status = ?")
            .bind(to)
            .bind(now)
            .bind(id)
            .bind(current.status)
            .execute(&mut *tx)
            .await?;

        let applied = result.rows_affected() == 1;
        let after: OrderRow = sqlx::query_as("select * from orders where id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((applied, after.try_into()?, prior_status))
    }

    pub async fn set_fulfillment(&self, id: &str, courier: &str, tracking: &str) -> Result<()> {
        sqlx::query("update orders set courier = ?, tracking = ?, updated_at = ? where id = ?")
            .bind(courier)
            .bind(tracking)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn list_mine_by_contact(
        &self,
        session_id: Option<&str>,
        nostr_pubkey: Option<&str>,
    ) -> Result<Vec<Order>> {
        let mut out = Vec::new();
        if let Some(sid) = session_id {
            let rows: Vec<OrderRow> = sqlx::query_as(
                "select * from orders where session_id = ? order by created_at desc",
            )
            .bind(sid)
            .fetch_all(&self.db)
            .await?;
            out.extend(rows);
        }
        if let Some(pk) = nostr_pubkey {
            let rows: Vec<OrderRow> = sqlx::query_as(
                "select * from orders where contact_json like ? order by created_at desc",
            )
            .bind(format!("%{pk}%"))
            .fetch_all(&self.db)
            .await?;
            out.extend(rows);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out.dedup_by(|a, b| a.id == b.id);
        out.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn list_non_terminal(&self) -> Result<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "select * from orders where status not in ('PAID', 'PREPARATION', 'SHIPPED', 'EXPIRED', 'FAILED') \
             or status in ('PAID', 'PREPARATION')",
        )
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Sweeps stale PENDING orders (not MEMPOOL/CONFIRMED, those are
    /// evidence of funds in flight) older than `ttl`.
    pub async fn prune_pending_older_than(&self, ttl: Duration) -> Result<Vec<String>> {
        let cutoff: DateTime<Utc> = Utc::now() - ttl;
        let rows: Vec<(String,)> =
            sqlx::query_as("select id from orders where status = 'PENDING' and created_at < ?")
                .bind(cutoff)
                .fetch_all(&self.db)
                .await?;
        for (id,) in &rows {
            self.transition_status(id, &[OrderStatus::Pending], OrderStatus::Expired).await?;
        }
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Atomic insert-if-absent. Returns `true` only for the caller that wins
    /// the race and therefore owns the side-effect.
    pub async fn outbox_claim(&self, order_id: &str, target_state: OrderStatus, channel: &str) -> Result<bool> {
        let result = sqlx::query(
            "insert into outbox (order_id, target_state, channel, claimed_at) values (?, ?, ?, ?) \
             on conflict (order_id, target_state, channel) do nothing",
        )
        .bind(order_id)
        .bind(target_state)
        .bind(channel)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Admin "resend": deletes the claim so the next dispatch attempt fires again.
    pub async fn outbox_clear(&self, order_id: &str, target_state: OrderStatus, channel: &str) -> Result<()> {
        sqlx::query("delete from outbox where order_id = ? and target_state = ? and channel = ?")
            .bind(order_id)
            .bind(target_state)
            .bind(channel)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn outbox_get(&self, order_id: &str, target_state: OrderStatus, channel: &str) -> Result<Option<OutboxRow>> {
        let row: Option<OutboxRow> = sqlx::query_as(
            "select * from outbox where order_id = ? and target_state = ? and channel = ?",
        )
        .bind(order_id)
        .bind(target_state)
        .bind(channel)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn load_settings(&self) -> Result<Option<SettingsRow>> {
        let row: Option<SettingsRow> = sqlx::query_as("select * from settings where id = 1")
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    pub async fn save_settings(&self, document_json: &str) -> Result<()> {
        sqlx::query(
            "insert into settings (id, document_json, updated_at) values (1, ?, ?) \
             on conflict (id) do update set document_json = excluded.document_json, updated_at = excluded.updated_at",
        )
        .bind(document_json)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn get_cart(&self, nostr_pubkey: &str) -> Result<Option<CartSnapshotRow>> {
        let row: Option<CartSnapshotRow> =
            sqlx::query_as("select * from carts where nostr_pubkey = ?")
                .bind(nostr_pubkey)
                .fetch_optional(&self.db)
                .await?;
        Ok(row)
    }

    /// Last-write-wins: the caller decides what "last" means, this just stores.
    pub async fn upsert_cart(&self, nostr_pubkey: &str, content_json: &str) -> Result<()> {
        sqlx::query(
            "insert into carts (nostr_pubkey, content_json, updated_at) values (?, ?, ?) \
             on conflict (nostr_pubkey) do update set content_json = excluded.content_json, updated_at = excluded.updated_at",
        )
        .bind(nostr_pubkey)
        .bind(content_json)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn get_mirror(&self, kind: MirrorKind, d_tag: &str) -> Result<Option<NostrMirrorRow>> {
        let row: Option<NostrMirrorRow> =
            sqlx::query_as("select * from nostr_mirror where kind = ? and d_tag = ?")
                .bind(kind)
                .bind(d_tag)
                .fetch_optional(&self.db)
                .await?;
        Ok(row)
    }

    pub async fn record_mirror(
        &self,
        kind: MirrorKind,
        d_tag: &str,
        event_id: &str,
        content_hash: &str,
        ack_json: &str,
    ) -> Result<()> {
        sqlx::query(
            "insert into nostr_mirror (kind, d_tag, last_event_id, last_content_hash, last_published_at, last_ack_json) \
             values (?, ?, ?, ?, ?, ?) \
             on conflict (kind, d_tag) do update set \
                last_event_id = excluded.last_event_id, \
                last_content_hash = excluded.last_content_hash, \
                last_published_at = excluded.last_published_at, \
                last_ack_json = excluded.last_ack_json",
        )
        .bind(kind)
        .bind(d_tag)
        .bind(event_id)
        .bind(content_hash)
        .bind(Utc::now())
        .bind(ack_json)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// Maps a store-layer `anyhow::Error` coming from a missing row into the
/// app-wide `NotFound` case. Callers that need the distinction prefer the
/// `_opt` accessors above; this exists for call sites that want `?` directly
/// and a typed miss.
pub fn not_found() -> anyhow::Error {
    anyhow!(NotFoundError)
}
