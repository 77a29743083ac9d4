use homestead_common::{ItemTier, OwnerId};

/// Seconds per ownership day in the compensation formula.
const SECONDS_PER_DAY: u64 = 86_400;
/// Cap on the ownership-duration bonus.
const MAX_DAYS_BONUS: u64 = 50;

/// Compensation owed when a placement is removed instead of relocated:
/// `floor(base_value * tier_multiplier) + min(days_owned * 2, 50)`.
pub fn compensation_amount(base_value: u64, tier: ItemTier, created_at: u64, now: u64) -> u64 {
    let days_owned = now.saturating_sub(created_at) / SECONDS_PER_DAY;
    let base = (base_value as f64 * tier.multiplier()).floor() as u64;
    base + (days_owned * 2).min(MAX_DAYS_BONUS)
}

/// A payout could not be delivered.
#[derive(Debug, thiserror::Error)]
#[error("payout of {amount} to owner {owner:?} rejected: {reason}")]
pub struct PayoutError {
    pub owner: OwnerId,
    pub amount: u64,
    pub reason: String,
}

/// External currency service. Connected owners are paid immediately;
/// disconnected owners get an offline credit instead (see
/// [`credits`](crate::credits)).
pub trait PayoutGateway {
    fn is_connected(&self, owner: OwnerId) -> bool;
    fn deposit(&mut self, owner: OwnerId, amount: u64) -> Result<(), PayoutError>;
}
