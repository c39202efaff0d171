use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use nostr_sdk::{EventBuilder, Keys, Kind, PublicKey, Tag};
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, SECP256K1};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// NIP-15 stall kind.
pub const STALL_KIND: u16 = 30_017;
/// NIP-15 product kind.
pub const PRODUCT_KIND: u16 = 30_018;
/// NIP-22 generic comment kind, used for buyer comments on a product.
pub const COMMENT_KIND: u16 = 1_111;

#[derive(Debug, Clone, Serialize)]
pub struct StallPayload {
    pub name: String,
    pub description: String,
    pub currency: String,
    pub shipping_summary: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPayload {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub price_sats: u64,
    pub currency: String,
    pub images: Vec<String>,
    pub hashtags: Vec<String>,
}

fn canonical_json<T: Serialize>(payload: &T) -> Result<String> {
    // serde_json's default map ordering is insertion order for structs
    // (field declaration order), which is stable across runs and is all
    // "canonical" needs to mean here: identical content hashes identically.
    Ok(serde_json::to_string(payload)?)
}

pub fn content_hash(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// Builds the replaceable-parameterized stall event. Caller is responsible
/// for checking `content_hash` against the last published hash before
/// calling this (idempotent skip happens one layer up, against the store).
pub fn stall_event(stall: &StallPayload, d_tag: &str) -> Result<(EventBuilder, String)> {
    let canonical = canonical_json(stall)?;
    let tags = vec![Tag::parse(["d", d_tag])?];
    let builder = EventBuilder::new(Kind::Custom(STALL_KIND), canonical.clone()).tags(tags);
    Ok((builder, canonical))
}

pub fn product_event(product: &ProductPayload) -> Result<(EventBuilder, String)> {
    let canonical = canonical_json(product)?;
    let mut tags = vec![Tag::parse(["d", &product.id])?];
    for t in &product.hashtags {
        tags.push(Tag::parse(["t", t])?);
    }
    for img in &product.images {
        tags.push(Tag::parse(["image", img])?);
    }
    tags.push(Tag::parse(["price", &product.price_sats.to_string(), "SATS"])?);
    let builder = EventBuilder::new(Kind::Custom(PRODUCT_KIND), canonical.clone()).tags(tags);
    Ok((builder, canonical))
}

/// A short-lived signed tuple binding a comment to this shop/product pair
/// without requiring relays to know about the shop.
#[derive(Debug, Clone, Serialize)]
pub struct CommentProof {
    pub sig: String,
    pub ts: i64,
    pub store_pubkey: String,
}

fn proof_message(store_pubkey_hex: &str, product_id: &str, ts: i64) -> [u8; 32] {
    let preimage = format!("comment-proof:{store_pubkey_hex}:{product_id}:{ts}");
    Sha256::digest(preimage.as_bytes()).into()
}

/// Issues a comment proof signed by the shop's Nostr key. `keys` must hold
/// the secret key loaded at startup; it never passes through settings
/// storage.
pub fn issue_comment_proof(keys: &Keys, product_id: &str, now: DateTime<Utc>) -> Result<CommentProof> {
    let store_pubkey = keys.public_key();
    let ts = now.timestamp();
    let digest = proof_message(&store_pubkey.to_hex(), product_id, ts);
    let message = Message::from_digest(digest);
    let keypair: Keypair = keys.secret_key().keypair(SECP256K1);
    let sig = SECP256K1.sign_schnorr(&message, &keypair);
    Ok(CommentProof {
        sig: sig.to_string(),
        ts,
        store_pubkey: store_pubkey.to_hex(),
    })
}

/// Verifies a comment proof against the shop's published pubkey. Any reader
/// (not just this server) can run this check independently.
pub fn verify_comment_proof(
    store_pubkey_hex: &str,
    product_id: &str,
    ts: i64,
    sig_hex: &str,
) -> Result<bool> {
    let pubkey = PublicKey::parse(store_pubkey_hex)?;
    let xonly = secp256k1::XOnlyPublicKey::from_slice(&pubkey.to_bytes())?;
    let sig = Signature::from_slice(&hex::decode(sig_hex)?)?;
    let digest = proof_message(store_pubkey_hex, product_id, ts);
    let message = Message::from_digest(digest);
    Ok(SECP256K1.verify_schnorr(&sig, &message, &xonly).is_ok())
}

/// Builds the comment event a buyer posts, embedding the proof tag.
pub fn comment_event(
    store_pubkey_hex: &str,
    product_id: &str,
    proof: &CommentProof,
    client_name: &str,
    content: &str,
) -> Result<EventBuilder> {
    ensure!(!content.trim().is_empty(), "comment content must not be empty");
    let tags = vec![
        Tag::parse(["x", &format!("shop:{store_pubkey_hex}:product:{product_id}")])?,
        Tag::parse(["k", "product-comment-v1"])?,
        Tag::parse(["client", client_name])?,
        Tag::parse(["proof", &proof.sig, &proof.ts.to_string()])?,
    ];
    Ok(EventBuilder::new(Kind::Custom(COMMENT_KIND), content).tags(tags))
}

/// Verifies a comment event's embedded proof tag against the shop pubkey.
/// Unknown or malformed tags are treated as "no proof" rather than an error,
/// matching the defensive parsing the inbound Nostr side requires elsewhere.
pub fn verify_comment_event(event: &nostr_sdk::Event, store_pubkey_hex: &str) -> Result<bool> {
    let as_slices: Vec<Vec<String>> = event.tags.iter().map(|t| t.as_slice().to_vec()).collect();

    let Some(proof) = as_slices.iter().find(|s| s.first().map(String::as_str) == Some("proof")) else {
        return Ok(false);
    };
    let (Some(sig), Some(ts)) = (
        proof.get(1),
        proof.get(2).and_then(|t| t.parse::<i64>().ok()),
    ) else {
        return Ok(false);
    };

    let product_id = as_slices
        .iter()
        .find(|s| s.first().map(String::as_str) == Some("x"))
        .and_then(|s| s.get(1))
        .and_then(|x| x.rsplit(':').next())
        .unwrap_or_default();

    verify_comment_proof(store_pubkey_hex, product_id, ts, sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_for_unchanged_payload() {
        let p = ProductPayload {
            id: "p1".into(),
            title: "Widget".into(),
            summary: "A widget".into(),
            price_sats: 1_000,
            currency: "SATS".into(),
            images: vec![],
            hashtags: vec![],
        };
        let (_, canon_a) = product_event(&p).unwrap();
        let (_, canon_b) = product_event(&p).unwrap();
        assert_eq!(content_hash(&canon_a), content_hash(&canon_b));
    }

    #[test]
    fn comment_proof_round_trips_and_tamper_fails() {
        let keys = Keys::generate();
        let now = Utc::now();
        let proof = issue_comment_proof(&keys, "abc", now).unwrap();
        assert!(verify_comment_proof(&proof.store_pubkey, "abc", proof.ts, &proof.sig).unwrap());
        // tampering the timestamp must flip verification to false
        assert!(!verify_comment_proof(&proof.store_pubkey, "abc", proof.ts + 1, &proof.sig).unwrap());
    }
}
