use chrono::{Duration, Utc};
use storefront_db::{
    ContactChannels, MirrorKind, OrderDraft, OrderItem, OrderStatus, PaymentMethod,
    ShippingAddress, StorefrontDb,
};

async fn test_db() -> StorefrontDb {
    let db = StorefrontDb::new(":memory:").await.unwrap();
    db.migrate().await.unwrap();
    db
}

fn lightning_draft() -> OrderDraft {
    OrderDraft {
        payment_method: PaymentMethod::Lightning,
        provider: "test-ln".to_string(),
        payment_hash: Some("deadbeef".to_string()),
        payment_request: Some("lnbc1...".to_string()),
        swap_id: None,
        onchain_address: None,
        onchain_amount_sats: None,
        bip21: None,
        subtotal_sats: 1_000,
        shipping_sats: 100,
        items: vec![OrderItem {
            product_id: "p1".to_string(),
            title: "Widget".to_string(),
            price_sats: 1_000,
            qty: 1,
        }],
        address: ShippingAddress {
            country: "IT".to_string(),
            ..Default::default()
        },
        contact: ContactChannels {
            email: Some("buyer@example.com".to_string()),
            ..Default::default()
        },
        notes: None,
        session_id: Some("sess-1".to_string()),
        invoice_expires_at: Utc::now() + Duration::minutes(10),
    }
}

#[tokio::test]
async fn create_order_computes_total_and_starts_pending() {
    let db = test_db().await;
    let order = db.create_order(lightning_draft()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_sats, 1_100);
    assert_eq!(order.subtotal_sats + order.shipping_sats, order.total_sats);
    assert_eq!(order.payment_hash.as_deref(), Some("deadbeef"));
}

#[tokio::test]
async fn transition_status_is_conditional_and_idempotent() {
    let db = test_db().await;
    let order = db.create_order(lightning_draft()).await.unwrap();

    let (applied, after) = db
        .transition_status(&order.id, &[OrderStatus::Pending], OrderStatus::Paid)
        .await
        .unwrap();
    assert!(applied);
    assert_eq!(after.status, OrderStatus::Paid);

    // a second caller racing the same transition loses
    let (applied_again, after_again) = db
        .transition_status(&order.id, &[OrderStatus::Pending], OrderStatus::Paid)
        .await
        .unwrap();
    assert!(!applied_again);
    assert_eq!(after_again.status, OrderStatus::Paid);
}

#[tokio::test]
async fn paid_is_sticky_against_watcher_downgrades() {
    let db = test_db().await;
    let order = db.create_order(lightning_draft()).await.unwrap();
    db.transition_status(&order.id, &[OrderStatus::Pending], OrderStatus::Paid)
        .await
        .unwrap();

    // a stale EXPIRED report from a slow poller must not move a PAID order
    let (applied, after) = db
        .transition_status(
            &order.id,
            &[OrderStatus::Pending, OrderStatus::Mempool],
            OrderStatus::Expired,
        )
        .await
        .unwrap();
    assert!(!applied);
    assert_eq!(after.status, OrderStatus::Paid);
}

#[tokio::test]
async fn outbox_claim_fires_at_most_once() {
    let db = test_db().await;
    let order = db.create_order(lightning_draft()).await.unwrap();

    let first = db.outbox_claim(&order.id, OrderStatus::Paid, "dm").await.unwrap();
    let second = db.outbox_claim(&order.id, OrderStatus::Paid, "dm").await.unwrap();
    assert!(first);
    assert!(!second);

    // a different channel is an independent claim
    let email = db.outbox_claim(&order.id, OrderStatus::Paid, "email").await.unwrap();
    assert!(email);
}

#[tokio::test]
async fn by_payment_hash_and_swap_id_round_trip() {
    let db = test_db().await;
    let order = db.create_order(lightning_draft()).await.unwrap();
    let found = db.by_payment_hash("deadbeef").await.unwrap().unwrap();
    assert_eq!(found.id, order.id);
    assert!(db.by_swap_id("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn prune_pending_expires_stale_orders_only() {
    let db = test_db().await;
    let order = db.create_order(lightning_draft()).await.unwrap();
    // simulate an old order by transitioning a fresh TTL=0 sweep
    let pruned = db.prune_pending_older_than(Duration::seconds(-1)).await.unwrap();
    assert_eq!(pruned, vec![order.id.clone()]);
    let after = db.get_order(&order.id).await.unwrap();
    assert_eq!(after.status, OrderStatus::Expired);
}

#[tokio::test]
async fn list_non_terminal_excludes_terminal_states() {
    let db = test_db().await;
    let pending = db.create_order(lightning_draft()).await.unwrap();
    let mut shipped_draft = lightning_draft();
    shipped_draft.payment_hash = Some("other-hash".to_string());
    let shipped = db.create_order(shipped_draft).await.unwrap();
    db.transition_status(&shipped.id, &[OrderStatus::Pending], OrderStatus::Paid)
        .await
        .unwrap();
    db.set_fulfillment(&shipped.id, "dhl", "123").await.unwrap();
    db.transition_status(&shipped.id, &[OrderStatus::Paid], OrderStatus::Preparation)
        .await
        .unwrap();
    db.transition_status(&shipped.id, &[OrderStatus::Preparation], OrderStatus::Shipped)
        .await
        .unwrap();

    let live = db.list_non_terminal().await.unwrap();
    let ids: Vec<_> = live.iter().map(|o| o.id.clone()).collect();
    assert!(ids.contains(&pending.id));
    assert!(!ids.contains(&shipped.id));
}

#[tokio::test]
async fn settings_and_mirror_round_trip() {
    let db = test_db().await;
    assert!(db.load_settings().await.unwrap().is_none());
    db.save_settings(r#"{"storeName":"Test Shop"}"#).await.unwrap();
    let loaded = db.load_settings().await.unwrap().unwrap();
    assert_eq!(loaded.document_json, r#"{"storeName":"Test Shop"}"#);

    assert!(db.get_mirror(MirrorKind::Product, "p1").await.unwrap().is_none());
    db.record_mirror(MirrorKind::Product, "p1", "evt1", "hash1", "[]")
        .await
        .unwrap();
    let mirror = db.get_mirror(MirrorKind::Product, "p1").await.unwrap().unwrap();
    assert_eq!(mirror.last_content_hash, "hash1");
}
