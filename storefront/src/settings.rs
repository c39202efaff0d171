use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-level configuration, loaded once at startup from `config.yaml`
/// merged with `APP_*` environment overrides. This is distinct from the
/// `ShopDocument` (the mutable, admin-editable singleton stored in the
/// database) — this struct never changes after `main` reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the embedded SQLite database file (`DB_FILE`).
    pub db_file: String,
    /// Bind address for the HTTP surface.
    pub listen_http: String,
    /// Public base URL the storefront is served at (used in BIP-21/links).
    pub public_url: String,
    pub payment: PaymentBackend,
    pub nostr: NostrSettings,
    pub smtp: SmtpSettings,
    pub imap: Option<ImapSettings>,
    pub admin: AdminSettings,
    /// Minimum sats accepted for an on-chain swap invoice.
    pub onchain_min_sats: u64,
    #[serde(default = "default_timeouts")]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    pub http_request_secs: u64,
    pub driver_op_secs: u64,
    pub relay_connect_secs: u64,
    pub relay_publish_secs: u64,
}

fn default_timeouts() -> Timeouts {
    Timeouts {
        http_request_secs: 30,
        driver_op_secs: 15,
        relay_connect_secs: 10,
        relay_publish_secs: 10,
    }
}

impl Timeouts {
    pub fn driver_op(&self) -> Duration {
        Duration::from_secs(self.driver_op_secs)
    }
}

/// Payment provider selection and its credentials. Mirrors the shape of the
/// driver trait's three implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PaymentBackend {
    /// Lightning invoices via a generic node-style API (LND-shaped).
    Lightning {
        address: String,
        cert: String,
        macaroon: String,
    },
    /// Submarine swap provider for on-chain payments.
    Swap {
        api_base: String,
        api_key: String,
    },
    /// Hosted/custodial provider exposing both invoice creation and
    /// webhook delivery (BTCPay-style).
    Hosted {
        api_base: String,
        api_key: String,
        webhook_secret: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NostrSettings {
    /// `SHOP_NOSTR_SECRET_HEX` or a bech32 nsec; never stored in the
    /// ShopDocument, only ever held in process memory.
    pub secret_key: String,
    pub relays: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapSettings {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub sent_folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSettings {
    pub pin_hash: String,
    pub session_secret: String,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config.yaml").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));
        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}
