use anyhow::{bail, Result};
use base64::Engine;
use chrono::Utc;
use nostr_sdk::{Event, Kind};

/// NIP-98 HTTP auth kind.
const NIP98_KIND: u16 = 27_235;
const MAX_SKEW_SECS: i64 = 120;

/// Verifies a NIP-98 `Authorization: Nostr <base64 event>` header and
/// confirms the signer matches `claimed_pubkey` — proof of ownership before
/// widening a query result set to that pubkey's orders, per spec.md's
/// "cookie or signed Nostr" binding.
pub fn verify_nip98(auth_header: &str, claimed_pubkey: &str) -> Result<bool> {
    let Some(token) = auth_header.strip_prefix("Nostr ") else {
        bail!("invalid authorization scheme");
    };

    let decoded = base64::engine::general_purpose::STANDARD.decode(token.as_bytes())?;
    let json = String::from_utf8(decoded)?;
    let event: Event = serde_json::from_str(&json)?;

    if event.verify().is_err() {
        return Ok(false);
    }
    if event.kind != Kind::Custom(NIP98_KIND) {
        return Ok(false);
    }
    let skew = (Utc::now().timestamp() - event.created_at.as_u64() as i64).abs();
    if skew > MAX_SKEW_SECS {
        return Ok(false);
    }

    Ok(event.pubkey.to_hex().eq_ignore_ascii_case(claimed_pubkey))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Keys, Tag};

    #[test]
    fn rejects_mismatched_pubkey() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::Custom(NIP98_KIND), "")
            .tags(vec![Tag::parse(["method", "GET"]).unwrap()])
            .sign_with_keys(&keys)
            .unwrap();
        let token = base64::engine::general_purpose::STANDARD.encode(event.as_json());
        let header = format!("Nostr {token}");

        assert!(verify_nip98(&header, &event.pubkey.to_hex()).unwrap());
        assert!(!verify_nip98(&header, "0".repeat(64).as_str()).unwrap());
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(verify_nip98("Bearer abc", "anything").is_err());
    }
}
