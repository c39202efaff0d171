mod db;
mod model;

pub use db::{not_found, NotFoundError, StorefrontDb};
pub use model::{
    CartSnapshotRow, ContactChannels, MirrorKind, NostrAck, NostrMirrorRow, Order, OrderDraft,
    OrderItem, OrderRow, OrderStatus, OutboxRow, PaymentMethod, SettingsRow, ShippingAddress,
};
