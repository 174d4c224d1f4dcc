//! Relay client.
//!
//! A thin wrapper over `nostr_sdk::Client` scoped to this deployment's
//! traffic: kind 1573 events tagged with the session (`s`) and the machine
//! public key (`p`). The client is `Clone` and internally pooled, so one
//! connection is shared between the subscription loop and the orchestrator's
//! debit publisher; publishing is safe under a concurrent subscribe.
//!
//! The client never retries on its own - reconnection policy belongs to the
//! pipeline supervisor.

use nostr::{Alphabet, EventBuilder, Filter, Keys, Kind, SingleLetterTag, SubscriptionId, Tag, TagKind, Timestamp};
use nostr_sdk::{Client, Options, RelayPoolNotification};
use tokio::sync::broadcast;

use tollgate_core::{NostrConfig, RelayPayload};

use crate::error::{IngestError, Result};

/// Event kind for all proxy traffic.
pub const PROXY_KIND: Kind = Kind::Custom(tollgate_core::EVENT_KIND);

/// Session scope tag (`s`).
pub const SESSION_TAG: SingleLetterTag = SingleLetterTag::lowercase(Alphabet::S);

/// Machine pubkey tag (`p`).
pub const MENTION_TAG: SingleLetterTag = SingleLetterTag::lowercase(Alphabet::P);

/// Notification channel buffer size; stored-event replay after a long
/// offline window can burst well past the handler's drain rate.
const NOTIFICATION_CHANNEL_SIZE: usize = 4096;

/// Relay client scoped to the proxy's session and machine tags.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    session: String,
    machine_pubkey: String,
}

impl RelayClient {
    /// Connect to the configured relay, signing published events with the
    /// configured secret key.
    pub async fn connect(config: &NostrConfig) -> Result<Self> {
        let keys: Keys = Keys::parse(&config.secret_key)?;

        let opts = Options::default().notification_channel_size(NOTIFICATION_CHANNEL_SIZE);
        let client = Client::builder().signer(keys).opts(opts).build();

        client.add_relay(&config.relay_url).await?;
        client.connect().await;

        tracing::info!(relay = %config.relay_url, session = %config.session, "relay client connected");

        Ok(Self {
            client,
            session: config.session.clone(),
            machine_pubkey: config.machine_pubkey.clone(),
        })
    }

    /// A fresh receiver on the client's notification stream.
    ///
    /// Subscribers should obtain the receiver before installing a filter so
    /// the stored-event replay is not missed.
    pub fn notifications(&self) -> broadcast::Receiver<RelayPoolNotification> {
        self.client.notifications()
    }

    /// Install the proxy filter with the given lower-bound timestamp
    /// (unix seconds, inclusive). Stored matches are replayed first, then an
    /// end-of-stored-events marker, then live events.
    pub async fn subscribe_since(&self, since: u64) -> Result<SubscriptionId> {
        let filter = Filter::new()
            .kind(PROXY_KIND)
            .since(Timestamp::from(since))
            .custom_tag(SESSION_TAG, [self.session.clone()])
            .custom_tag(MENTION_TAG, [self.machine_pubkey.clone()]);

        let output = self.client.subscribe(vec![filter], None).await?;
        Ok(output.val)
    }

    /// Tear down a subscription installed with [`Self::subscribe_since`].
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.client.unsubscribe(id).await;
    }

    /// Publish a signed proxy event carrying `payload`, tagged with the
    /// session and machine pubkey. An event rejected by every relay is an
    /// error; the caller decides whether that is fatal.
    pub async fn publish(&self, payload: &RelayPayload) -> Result<()> {
        let content = payload.encode()?;

        let builder = EventBuilder::new(PROXY_KIND, content).tags([
            Tag::custom(TagKind::SingleLetter(SESSION_TAG), [self.session.clone()]),
            Tag::custom(
                TagKind::SingleLetter(MENTION_TAG),
                [self.machine_pubkey.clone()],
            ),
        ]);

        let output = self.client.send_event_builder(builder).await?;

        if !output.failed.is_empty() {
            for (relay_url, err) in output.failed.iter() {
                tracing::error!(relay = %relay_url, error = ?err, "relay rejected event");
            }
            return Err(IngestError::Publish(format!(
                "event rejected by {} relay(s)",
                output.failed.len()
            )));
        }

        Ok(())
    }

    /// Disconnect from the relay.
    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}
