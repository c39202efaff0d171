use super::AppState;
use crate::error::DomainError;
use crate::session::Session;
use crate::shipping;
use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::Key;
use axum_extra::extract::SignedCookieJar;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use storefront_db::{ContactChannels, OrderDraft, OrderItem, PaymentMethod, ShippingAddress};

const INVOICE_TTL: Duration = Duration::minutes(15);

#[derive(Deserialize)]
pub struct CheckoutItemInput {
    product_id: String,
    qty: u32,
}

#[derive(Deserialize)]
pub struct CustomerInput {
    address: ShippingAddress,
    contact: ContactChannels,
    notes: Option<String>,
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    items: Vec<CheckoutItemInput>,
    customer: CustomerInput,
    payment_method: PaymentMethod,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    order_id: String,
    status: String,
    payment_request: Option<String>,
    payment_hash: Option<String>,
    onchain_address: Option<String>,
    bip21: Option<String>,
    subtotal_sats: u64,
    shipping_sats: u64,
    total_sats: u64,
}

pub async fn create_invoice(
    State(state): State<AppState>,
    session: Session,
    jar: SignedCookieJar<Key>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(SignedCookieJar<Key>, Json<CheckoutResponse>), DomainError> {
    if req.items.is_empty() {
        return Err(DomainError::Validation("cart must contain at least one item".to_string()));
    }
    if req.customer.contact.is_empty() {
        return Err(DomainError::Validation(
            "at least one contact channel (email, telegram, nostr pubkey or phone) is required".to_string(),
        ));
    }

    let shop = state.shop.read().await.clone();
    let mut items = Vec::with_capacity(req.items.len());
    let mut subtotal_sats: u64 = 0;
    for item in &req.items {
        if item.qty == 0 {
            return Err(DomainError::Validation(format!("quantity for {} must be at least 1", item.product_id)));
        }
        let product = shop
            .products
            .get(&item.product_id)
            .ok_or_else(|| DomainError::Validation(format!("unknown product {}", item.product_id)))?;
        subtotal_sats += product.price_sats * item.qty as u64;
        items.push(OrderItem {
            product_id: item.product_id.clone(),
            title: product.title.clone(),
            price_sats: product.price_sats,
            qty: item.qty,
        });
    }

    let shipping_sats = shipping::quote(&req.customer.address.country, &shop.shipping).sats;
    let total_sats = subtotal_sats + shipping_sats;

    let caps = state.driver.capabilities();
    let draft = match req.payment_method {
        PaymentMethod::Lightning => {
            if !caps.lightning_invoice {
                return Err(DomainError::Validation(
                    "the configured payment provider does not support lightning invoices".to_string(),
                ));
            }
            let artifact = state
                .driver
                .create_lightning_invoice(total_sats, "storefront checkout", INVOICE_TTL.num_seconds() as u64)
                .await
                .map_err(|e| DomainError::ProviderTransient(e.to_string()))?;

            if state.db.by_payment_hash(&artifact.payment_hash).await.map_err(crate::error::internal)?.is_some() {
                return Err(DomainError::Conflict("payment hash collides with an existing order".to_string()));
            }

            OrderDraft {
                payment_method: PaymentMethod::Lightning,
                provider: state.provider.clone(),
                payment_hash: Some(artifact.payment_hash),
                payment_request: Some(artifact.payment_request),
                swap_id: None,
                onchain_address: None,
                onchain_amount_sats: None,
                bip21: None,
                subtotal_sats,
                shipping_sats,
                items,
                address: req.customer.address,
                contact: req.customer.contact,
                notes: req.customer.notes,
                session_id: Some(session.id.clone()),
                invoice_expires_at: artifact.expires_at,
            }
        }
        PaymentMethod::Onchain => {
            if !caps.onchain_swap {
                return Err(DomainError::Validation(
                    "the configured payment provider does not support on-chain swaps".to_string(),
                ));
            }
            if total_sats < state.onchain_min_sats {
                return Err(DomainError::Validation(format!(
                    "on-chain orders must total at least {} sats",
                    state.onchain_min_sats
                )));
            }
            let artifact = state
                .driver
                .create_onchain_swap(total_sats, None)
                .await
                .map_err(|e| DomainError::ProviderTransient(e.to_string()))?;

            if state.db.by_swap_id(&artifact.swap_id).await.map_err(crate::error::internal)?.is_some() {
                return Err(DomainError::Conflict("swap id collides with an existing order".to_string()));
            }

            OrderDraft {
                payment_method: PaymentMethod::Onchain,
                provider: state.provider.clone(),
                payment_hash: None,
                payment_request: None,
                swap_id: Some(artifact.swap_id),
                onchain_address: Some(artifact.address),
                onchain_amount_sats: Some(artifact.expected_amount_sats),
                bip21: Some(artifact.bip21),
                subtotal_sats,
                shipping_sats,
                items,
                address: req.customer.address,
                contact: req.customer.contact,
                notes: req.customer.notes,
                session_id: Some(session.id.clone()),
                invoice_expires_at: artifact.expires_at,
            }
        }
    };

    let order = state.db.create_order(draft).await.map_err(crate::error::internal)?;
    state.watcher.spawn(order.clone()).await;

    let response = CheckoutResponse {
        order_id: order.id,
        status: order.status.to_string(),
        payment_request: order.payment_request,
        payment_hash: order.payment_hash,
        onchain_address: order.onchain_address,
        bip21: order.bip21,
        subtotal_sats: order.subtotal_sats,
        shipping_sats: order.shipping_sats,
        total_sats: order.total_sats,
    };
    Ok((session.apply_to(jar), Json(response)))
}
