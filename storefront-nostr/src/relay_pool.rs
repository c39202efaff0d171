use anyhow::Result;
use nostr_sdk::{Client, Event, EventBuilder, Filter, Keys, RelayMessage, RelayPoolNotification};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-relay outcome of a publish attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RelayAck {
    pub relay: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Thin wrapper over [`nostr_sdk::Client`], which already owns the
/// per-relay connections, reconnect backoff and frame parsing; this layer
/// adds the per-relay ack bookkeeping the notification dispatcher and the
/// stall/product mirror both need.
#[derive(Clone)]
pub struct RelayPool {
    client: Client,
}

impl RelayPool {
    pub async fn connect(keys: Keys, relays: &[String]) -> Result<Self> {
        let client = Client::builder().signer(keys).build();
        for r in relays {
            client.add_relay(r.as_str()).await?;
        }
        client.connect().await;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Disconnects every relay connection. Called once during the shutdown
    /// drain, after subscriptions have been cancelled.
    pub async fn shutdown(&self) {
        self.client.disconnect().await;
    }

    /// Fan out a signed event to every connected relay. Waits for the
    /// first OK or the overall deadline, whichever is later, then reports
    /// whatever has resolved so far per relay.
    pub async fn publish(&self, event: &Event) -> Result<Vec<RelayAck>> {
        let output = self.client.send_event(event).await?;
        let mut acks: Vec<RelayAck> = output
            .success
            .iter()
            .map(|r| RelayAck {
                relay: r.to_string(),
                ok: true,
                error: None,
            })
            .collect();
        acks.extend(output.failed.iter().map(|(r, e)| RelayAck {
            relay: r.to_string(),
            ok: false,
            error: Some(e.clone()),
        }));
        Ok(acks)
    }

    pub async fn publish_builder(&self, builder: EventBuilder) -> Result<(Event, Vec<RelayAck>)> {
        let event = self.client.sign_event_builder(builder).await?;
        let acks = self.publish(&event).await?;
        Ok((event, acks))
    }

    /// Subscribes with the given filters, invoking `on_event` for every
    /// deduplicated event and `on_eose` once per relay's EOSE. Returns a
    /// cancellation handle; cancelling releases the subscription.
    pub async fn subscribe<F, E>(&self, filters: Filter, on_event: F, on_eose: E) -> Result<CancellationToken>
    where
        F: Fn(Event) + Send + Sync + 'static,
        E: Fn() + Send + Sync + 'static,
    {
        self.client.subscribe(filters, None).await?;

        let token = CancellationToken::new();
        let child = token.clone();
        let client = self.client.clone();
        tokio::spawn(async move {
            let mut notifications = client.notifications();
            loop {
                tokio::select! {
                    _ = child.cancelled() => {
                        info!("relay subscription cancelled");
                        return;
                    }
                    msg = notifications.recv() => {
                        match msg {
                            Ok(RelayPoolNotification::Event { event, .. }) => on_event(*event),
                            Ok(RelayPoolNotification::Message { message: RelayMessage::Eose(_), .. }) => on_eose(),
                            Ok(RelayPoolNotification::Message { .. }) => {}
                            Ok(RelayPoolNotification::Shutdown) => return,
                            Err(e) => {
                                warn!("relay notification stream error: {e}");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(token)
    }

    /// Completes on global EOSE or `overall_timeout`, whichever comes first.
    pub async fn fetch_once(&self, filters: Filter, overall_timeout: Option<Duration>) -> Result<Vec<Event>> {
        let events = self
            .client
            .fetch_events(filters, overall_timeout.unwrap_or(DEFAULT_PUBLISH_TIMEOUT))
            .await?;
        Ok(events.into_iter().collect())
    }
}
