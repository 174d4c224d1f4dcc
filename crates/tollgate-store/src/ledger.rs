//! Token ledger policy.
//!
//! All balance mutations flow through relay events; the ledger applies each
//! event exactly once by pairing the credit-event insert with the counter
//! adjustment in a single transaction. The credit-event primary key is the
//! deduplication gate, so redelivery and watermark-overlap replay are no-ops.

use crate::error::Result;
use crate::store::LedgerStore;

/// A decoded `Transaction` payload together with its relay envelope identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditEvent {
    /// Relay event id (globally unique, content-derived).
    pub id: String,
    /// Base58 public key of the affected user.
    pub user_pubkey: String,
    /// Signed token delta. Positive credits; negative debits.
    pub delta: i64,
    /// Relay event timestamp, unix seconds.
    pub created_at: i64,
}

/// Outcome of a credit application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The event was new; the ledger has been adjusted.
    Credited,
    /// The event id was already present; nothing changed.
    Duplicate,
}

/// Split a signed event delta into (balance delta, consumed delta).
///
/// A credit only grows the balance. A debit shrinks the balance and grows the
/// lifetime consumption by the same magnitude, preserving
/// `balance + consumed = Σ deltas applied as credits`.
pub fn credit_deltas(delta: i64) -> (i64, i64) {
    if delta >= 0 {
        (delta, 0)
    } else {
        (delta, -delta)
    }
}

/// Policy layer over the store: idempotent credit application and the
/// ingestion watermark.
#[derive(Clone)]
pub struct TokenLedger {
    store: LedgerStore,
}

impl TokenLedger {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Apply a credit event to the ledger, exactly once.
    ///
    /// In one transaction: create the user on first observed credit, insert
    /// the credit-event row (the dedup gate), adjust the counters. A
    /// conflicting event id rolls the whole apply back and reports
    /// [`Applied::Duplicate`].
    pub async fn apply_credit(&self, event: &CreditEvent) -> Result<Applied> {
        let mut tx = self.store.pool().begin().await?;

        LedgerStore::ensure_user_on(&mut tx, &event.user_pubkey).await?;

        let inserted = LedgerStore::save_credit_event_on(
            &mut tx,
            &event.id,
            &event.user_pubkey,
            event.delta,
            event.created_at,
        )
        .await?;

        if !inserted {
            tx.rollback().await?;
            return Ok(Applied::Duplicate);
        }

        let (balance_delta, consumed_delta) = credit_deltas(event.delta);
        LedgerStore::adjust_balance_on(&mut tx, &event.user_pubkey, balance_delta, consumed_delta)
            .await?;

        tx.commit().await?;

        Ok(Applied::Credited)
    }

    /// The ingestion watermark: maximum applied relay timestamp, 0 if none.
    pub async fn watermark(&self) -> Result<i64> {
        self.store.latest_credit_timestamp().await
    }
}
