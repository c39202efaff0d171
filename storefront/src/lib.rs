pub mod bus;
pub mod driver;
pub mod error;
pub mod http;
pub mod mirror;
pub mod nostr_auth;
pub mod notify;
pub mod session;
pub mod settings;
pub mod shipping;
pub mod shop_settings;
pub mod state_machine;
pub mod watcher;
