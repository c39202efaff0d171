use crate::shop_settings::{ProductCatalogEntry, ShopDocument};
use anyhow::Result;
use nostr_sdk::EventBuilder;
use storefront_db::{MirrorKind, NostrAck, StorefrontDb};
use storefront_nostr::{content_hash, product_event, stall_event, ProductPayload, RelayPool, StallPayload};
use tracing::info;

const STALL_D_TAG: &str = "main";

fn shipping_summary(shop: &ShopDocument) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(country) = &shop.shipping.domestic_country {
        lines.push(format!("{country}: {} sats", shop.shipping.domestic_sats));
    }
    for (continent, sats) in &shop.shipping.continent_sats {
        lines.push(format!("{continent}: {sats} sats"));
    }
    for (country, sats) in &shop.shipping.country_overrides {
        lines.push(format!("{country} (override): {sats} sats"));
    }
    lines.sort();
    lines
}

/// Publishes the stall record, skipping the network round trip entirely when
/// its canonical content hasn't changed since the last publish (spec.md
/// §4.7 step 2, P4).
pub async fn publish_stall(db: &StorefrontDb, relay: &RelayPool, shop: &ShopDocument) -> Result<()> {
    let payload = StallPayload {
        name: shop.store_name.clone(),
        description: shop.email_signature.clone(),
        currency: "SATS".to_string(),
        shipping_summary: shipping_summary(shop),
    };
    let (builder, canonical) = stall_event(&payload, STALL_D_TAG)?;
    publish_if_changed(db, relay, MirrorKind::Stall, STALL_D_TAG, canonical, builder).await
}

/// Publishes one catalog product's record under the same idempotent-skip
/// rule as the stall.
pub async fn publish_product(
    db: &StorefrontDb,
    relay: &RelayPool,
    product_id: &str,
    product: &ProductCatalogEntry,
) -> Result<()> {
    let payload = ProductPayload {
        id: product_id.to_string(),
        title: product.title.clone(),
        summary: product.summary.clone(),
        price_sats: product.price_sats,
        currency: product.currency.clone(),
        images: product.images.clone(),
        hashtags: product.hashtags.clone(),
    };
    let (builder, canonical) = product_event(&payload)?;
    publish_if_changed(db, relay, MirrorKind::Product, product_id, canonical, builder).await
}

/// Republishes the stall and every catalog product. Called once at startup
/// so a fresh relay set (or a settings edit made while the process was
/// down) converges without requiring a dedicated catalog-CRUD trigger.
pub async fn publish_catalog(db: &StorefrontDb, relay: &RelayPool, shop: &ShopDocument) -> Result<()> {
    publish_stall(db, relay, shop).await?;
    for (id, product) in &shop.products {
        publish_product(db, relay, id, product).await?;
    }
    Ok(())
}

async fn publish_if_changed(
    db: &StorefrontDb,
    relay: &RelayPool,
    kind: MirrorKind,
    d_tag: &str,
    canonical: String,
    builder: EventBuilder,
) -> Result<()> {
    let hash = content_hash(&canonical);
    if let Some(existing) = db.get_mirror(kind, d_tag).await? {
        if existing.last_content_hash == hash {
            return Ok(());
        }
    }

    let (event, acks) = relay.publish_builder(builder).await?;
    let ack_json = serde_json::to_string(&acks)?;
    db.record_mirror(kind, d_tag, &event.id.to_hex(), &hash, &ack_json).await?;

    // storefront-db stores acks as an opaque blob so it doesn't need a
    // dependency on the relay crate's types; round-trip through its own
    // NostrAck shape here to report how many relays actually accepted it.
    let typed_acks: Vec<NostrAck> = serde_json::from_str(&ack_json)?;
    let failed = typed_acks.iter().filter(|a| !a.ok).count();
    info!(?kind, d_tag, event_id = %event.id, failed_relays = failed, total_relays = typed_acks.len(), "published mirror event");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipping_summary_sorts_and_includes_all_tiers() {
        let mut shop = ShopDocument::default();
        shop.shipping.domestic_country = Some("US".to_string());
        shop.shipping.domestic_sats = 1_000;
        shop.shipping.continent_sats.insert("EU".to_string(), 5_000);
        shop.shipping.country_overrides.insert("JP".to_string(), 3_000);

        let summary = shipping_summary(&shop);
        assert_eq!(summary.len(), 3);
        assert!(summary.iter().any(|l| l.contains("US") && l.contains("1000")));
        assert!(summary.iter().any(|l| l.contains("EU") && l.contains("5000")));
        assert!(summary.iter().any(|l| l.contains("JP") && l.contains("override")));
    }
}
