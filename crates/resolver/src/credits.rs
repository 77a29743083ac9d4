//! Offline compensation credits, persisted through the durable store chain.
//!
//! Credits owed to a disconnected owner are written under `credits/<owner>`
//! (CBOR payload) and applied on the owner's next connect. Writes walk the
//! chain in priority order, first success wins; reads probe the same order,
//! so a healthy primary store shadows stale copies further down the chain.

use homestead_backup::{from_cbor, to_cbor, StoreChain, StoreError};
use homestead_common::OwnerId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compensation::{PayoutError, PayoutGateway};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwnerCredits {
    owner: OwnerId,
    total: u64,
    updated_at: u64,
}

fn credit_key(owner: OwnerId) -> String {
    format!("credits/{}", owner.0)
}

/// Credits currently queued for an owner. Read-only probe of the chain.
pub fn pending_credits(stores: &StoreChain, owner: OwnerId) -> u64 {
    read_credits(stores, owner).map_or(0, |c| c.total)
}

fn read_credits(stores: &StoreChain, owner: OwnerId) -> Option<OwnerCredits> {
    let key = credit_key(owner);
    for store in stores.iter() {
        match store.get(&key) {
            Ok(Some(bytes)) => match from_cbor::<OwnerCredits>(&bytes) {
                Ok(credits) => return Some(credits),
                Err(err) => {
                    warn!(store = store.label(), owner = owner.0, %err, "credit record undecodable")
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(store = store.label(), owner = owner.0, %err, "credit read failed")
            }
        }
    }
    None
}

/// Add `amount` to the owner's queued credits.
pub fn queue_credit(
    stores: &mut StoreChain,
    owner: OwnerId,
    amount: u64,
    now: u64,
) -> Result<(), StoreError> {
    let total = pending_credits(stores, owner) + amount;
    let record = OwnerCredits {
        owner,
        total,
        updated_at: now,
    };
    let bytes = to_cbor(&record)?;
    let key = credit_key(owner);

    let mut last_err: Option<StoreError> = None;
    for store in stores.iter_mut() {
        match store.set(&key, &bytes) {
            Ok(()) => {
                debug!(owner = owner.0, amount, total, "offline credit queued");
                return Ok(());
            }
            Err(err) => {
                warn!(store = store.label(), owner = owner.0, %err, "credit write failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or(StoreError::Unavailable {
        store: "chain".into(),
        reason: "no stores configured".into(),
    }))
}

/// Deliver an owner's queued credits through the payout gateway, then clear
/// them from every store. Returns the delivered amount (0 when none were
/// queued).
pub fn apply_pending_credits(
    stores: &mut StoreChain,
    gateway: &mut dyn PayoutGateway,
    owner: OwnerId,
) -> Result<u64, PayoutError> {
    let Some(record) = read_credits(stores, owner) else {
        return Ok(0);
    };
    gateway.deposit(owner, record.total)?;

    let key = credit_key(owner);
    for store in stores.iter_mut() {
        if let Err(err) = store.remove(&key) {
            warn!(store = store.label(), owner = owner.0, %err, "credit cleanup failed");
        }
    }
    debug!(owner = owner.0, amount = record.total, "offline credits delivered");
    Ok(record.total)
}
