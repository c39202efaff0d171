use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use storefront_db::{OrderStatus, StorefrontDb};

/// The admin-editable singleton document (spec.md §3 "Settings"). Stored as
/// a single JSON blob because its shape is loosely typed and has
/// cross-referencing tiers/overrides the relational model would otherwise
/// force into back-references — see the shipping-quote flattening in
/// `crate::shipping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopDocument {
    pub store_name: String,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
    pub shipping: ShippingConfig,
    pub nostr: NostrShopParams,
    pub templates: HashMap<String, NotificationTemplate>,
    pub email_signature: String,
    pub theme: ThemeTokens,
    /// Catalog source of truth for checkout price lookups and the Nostr
    /// product mirror. Orders snapshot `title`/`price_sats` at creation time;
    /// later edits here never mutate historical orders.
    pub products: HashMap<String, ProductCatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCatalogEntry {
    pub title: String,
    pub summary: String,
    pub price_sats: u64,
    pub currency: String,
    pub images: Vec<String>,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShippingConfig {
    pub domestic_country: Option<String>,
    pub domestic_sats: u64,
    pub continent_sats: HashMap<String, u64>,
    /// Upper-cased ISO-3166-1 alpha-2 country code -> sats. "ALL" is the
    /// fallback zone when nothing more specific matches.
    pub country_overrides: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NostrShopParams {
    pub relays: Vec<String>,
    pub default_hashtags: Vec<String>,
    pub blocked_pubkeys: Vec<String>,
    pub comments_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub dm_body: String,
    pub email_subject: String,
    pub email_body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThemeTokens {
    pub primary_color: Option<String>,
    pub accent_color: Option<String>,
    pub font_family: Option<String>,
}

impl Default for ShopDocument {
    fn default() -> Self {
        let mut templates = HashMap::new();
        for state in [OrderStatus::Paid, OrderStatus::Preparation, OrderStatus::Shipped] {
            templates.insert(
                state.to_string(),
                NotificationTemplate {
                    dm_body: default_dm_body(state),
                    email_subject: format!("Order {{{{orderId}}}} is now {{{{statusLabel}}}}"),
                    email_body: default_email_body(state),
                },
            );
        }
        ShopDocument {
            store_name: "Storefront".to_string(),
            logo_url: None,
            favicon_url: None,
            shipping: ShippingConfig::default(),
            nostr: NostrShopParams::default(),
            templates,
            email_signature: "Thanks for your order!".to_string(),
            theme: ThemeTokens::default(),
            products: HashMap::new(),
        }
    }
}

fn default_dm_body(state: OrderStatus) -> String {
    match state {
        OrderStatus::Paid => "Payment received for order {{orderId}}. Total: {{totalSats}} sats.".to_string(),
        OrderStatus::Preparation => "Order {{orderId}} is now being prepared.".to_string(),
        OrderStatus::Shipped => "Order {{orderId}} has shipped via {{courier}}, tracking {{tracking}}.".to_string(),
        _ => "Order {{orderId}} status: {{statusLabel}}.".to_string(),
    }
}

fn default_email_body(state: OrderStatus) -> String {
    format!(
        "Hi {{{{customerName}}}},\n\n{}\n\n{{{{storeName}}}}",
        default_dm_body(state)
    )
}

impl ShopDocument {
    pub async fn load_or_default(db: &StorefrontDb) -> anyhow::Result<Self> {
        match db.load_settings().await? {
            Some(row) => Ok(serde_json::from_str(&row.document_json)?),
            None => {
                let doc = ShopDocument::default();
                db.save_settings(&serde_json::to_string(&doc)?).await?;
                Ok(doc)
            }
        }
    }

    pub async fn save(&self, db: &StorefrontDb) -> anyhow::Result<()> {
        db.save_settings(&serde_json::to_string(self)?).await?;
        Ok(())
    }
}
