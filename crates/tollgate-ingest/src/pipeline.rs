//! Credit ingestion pipeline.
//!
//! A supervised subscription loop. Each cycle reads the persisted watermark,
//! subscribes from `watermark + 1`, and applies every `Transaction` payload
//! through the ledger's idempotent apply. When the subscription ends for any
//! reason - the relay closes it, the notification stream dies, or the
//! rotation timer fires - the loop re-reads the watermark and resubscribes,
//! so an event that failed to apply is redelivered on the next cycle.

use std::time::Duration;

use nostr::message::RelayMessage;
use nostr::Event;
use nostr_sdk::RelayPoolNotification;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use tollgate_core::RelayPayload;
use tollgate_store::{Applied, CreditEvent, TokenLedger};

use crate::error::{IngestError, Result};
use crate::relay::RelayClient;

/// Subscriptions are rotated after this long even if healthy, bounding the
/// lifetime of any single relay-side subscription.
const SUBSCRIPTION_ROTATE: Duration = Duration::from_secs(24 * 60 * 60);

/// Pause before reconnecting after a failed cycle.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// How a subscription cycle ended.
enum CycleEnd {
    /// Cooperative shutdown was requested.
    Shutdown,
    /// The subscription ended; start a new cycle from the watermark.
    Resubscribe,
}

/// The supervised credit ingestion loop.
pub struct CreditPipeline {
    relay: RelayClient,
    ledger: TokenLedger,
}

impl CreditPipeline {
    pub fn new(relay: RelayClient, ledger: TokenLedger) -> Self {
        Self { relay, ledger }
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// Never returns an error: cycle failures are logged and retried after a
    /// short backoff, because a dead pipeline silently stops crediting users.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.subscription_cycle(&mut shutdown).await {
                Ok(CycleEnd::Shutdown) => break,
                Ok(CycleEnd::Resubscribe) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "subscription cycle failed, reconnecting");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("credit pipeline stopped");
    }

    /// One subscription cycle: subscribe from the watermark, drain
    /// notifications until the subscription ends.
    async fn subscription_cycle(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleEnd> {
        let since = self.ledger.watermark().await? + 1;
        tracing::info!(since, "subscribing to credit events");

        // Receiver first: events replayed between subscribe and the first
        // recv would otherwise be lost.
        let mut notifications = self.relay.notifications();
        let sub_id = self.relay.subscribe_since(since as u64).await?;

        let rotate = tokio::time::sleep(SUBSCRIPTION_ROTATE);
        tokio::pin!(rotate);

        let end = loop {
            tokio::select! {
                _ = shutdown.changed() => break CycleEnd::Shutdown,

                _ = &mut rotate => {
                    tracing::info!("rotating relay subscription");
                    break CycleEnd::Resubscribe;
                }

                notification = notifications.recv() => match notification {
                    Ok(RelayPoolNotification::Message {
                        message: RelayMessage::Event { subscription_id, event },
                        ..
                    }) if subscription_id == sub_id => {
                        self.apply_event(&event).await;
                    }

                    Ok(RelayPoolNotification::Message {
                        message: RelayMessage::EndOfStoredEvents(subscription_id),
                        ..
                    }) if subscription_id == sub_id => {
                        tracing::info!("stored events replayed, subscription is live");
                    }

                    Ok(RelayPoolNotification::Message {
                        message: RelayMessage::Closed { subscription_id, message },
                        ..
                    }) if subscription_id == sub_id => {
                        tracing::warn!(%message, "relay closed the subscription");
                        break CycleEnd::Resubscribe;
                    }

                    Ok(RelayPoolNotification::Shutdown) => {
                        tracing::warn!("relay client shut down");
                        break CycleEnd::Shutdown;
                    }

                    Ok(_) => {}

                    Err(RecvError::Lagged(skipped)) => {
                        // Skipped events are not lost: they are redelivered
                        // from the watermark on the next cycle.
                        tracing::warn!(skipped, "notification stream lagged, resubscribing");
                        break CycleEnd::Resubscribe;
                    }

                    Err(RecvError::Closed) => {
                        self.relay.unsubscribe(sub_id).await;
                        return Err(IngestError::ChannelClosed);
                    }
                }
            }
        };

        self.relay.unsubscribe(sub_id).await;
        Ok(end)
    }

    /// Decode and apply one relay event. Failures are logged and skipped;
    /// the watermark does not advance past an unapplied event, so it is
    /// retried on the next cycle.
    async fn apply_event(&self, event: &Event) {
        let payload = match RelayPayload::decode(&event.content) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(id = %event.id, error = %e, "ignoring undecodable event content");
                return;
            }
        };

        let RelayPayload::Transaction { user, tokens } = payload else {
            tracing::debug!(id = %event.id, "ignoring non-transaction payload");
            return;
        };

        let credit = CreditEvent {
            id: event.id.to_hex(),
            user_pubkey: user,
            delta: tokens,
            created_at: event.created_at.as_u64() as i64,
        };

        match self.ledger.apply_credit(&credit).await {
            Ok(Applied::Credited) => {
                tracing::info!(
                    id = %credit.id,
                    user = %credit.user_pubkey,
                    delta = credit.delta,
                    "applied credit event"
                );
            }
            Ok(Applied::Duplicate) => {
                tracing::debug!(id = %credit.id, "credit event already applied");
            }
            Err(e) => {
                tracing::error!(id = %credit.id, error = %e, "failed to apply credit event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_since_is_watermark_plus_one() {
        // Restart property: the first subscription's lower bound is
        // max(created_at) + 1 of persisted credit events.
        let watermark = 1_700_000_000i64;
        assert_eq!(watermark + 1, 1_700_000_001);

        // A fresh database has watermark 0, so the first cycle asks for
        // everything from timestamp 1.
        let fresh = 0i64;
        assert_eq!(fresh + 1, 1);
    }

    #[test]
    fn test_transaction_payload_maps_to_credit_event_fields() {
        let payload = RelayPayload::decode(
            r#"{"Transaction":{"user":"Ae3pubkey","tokens":1000}}"#,
        )
        .unwrap();

        let RelayPayload::Transaction { user, tokens } = payload else {
            panic!("expected a transaction");
        };

        let credit = CreditEvent {
            id: "e1".to_string(),
            user_pubkey: user,
            delta: tokens,
            created_at: 1_700_000_000,
        };
        assert_eq!(credit.user_pubkey, "Ae3pubkey");
        assert_eq!(credit.delta, 1000);
    }

    #[test]
    fn test_non_transaction_payloads_are_ignored() {
        // The pipeline only reacts to Transaction; Request and Status decode
        // fine but fall through the let-else.
        let payload = RelayPayload::decode(
            r#"{"Request":{"to_status":2,"reason":1,"initial_request":"r1","payload":""}}"#,
        )
        .unwrap();
        assert!(!matches!(payload, RelayPayload::Transaction { .. }));
    }
}
