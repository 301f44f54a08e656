use crate::models::{CommissionEntity, CommissionTier};
use crate::store::{bounded, SettlementStore};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

/// The tier chosen for an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierMatch {
    pub tier_id: Uuid,
    pub rate: Decimal,
}

impl From<&CommissionTier> for TierMatch {
    fn from(tier: &CommissionTier) -> Self {
        Self {
            tier_id: tier.tier_id,
            rate: tier.rate,
        }
    }
}

/// Open-ended upper bounds sort after every finite bound.
fn cmp_upper_bound(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Pick the tier whose bracket contains `amount`.
///
/// Overlapping brackets resolve to the smallest `min_amount`, then the
/// smallest `max_amount`, then the lowest `tier_id`.
pub fn select_tier(tiers: &[CommissionTier], amount: Decimal) -> Option<&CommissionTier> {
    tiers.iter().filter(|t| t.contains(amount)).min_by(|a, b| {
        a.min_amount
            .cmp(&b.min_amount)
            .then_with(|| cmp_upper_bound(a.max_amount, b.max_amount))
            .then_with(|| a.tier_id.cmp(&b.tier_id))
    })
}

/// Looks up the tiered rate for one entity.
#[derive(Clone)]
pub struct CommissionTierResolver {
    store: Arc<dyn SettlementStore>,
    lookup_timeout: Duration,
}

impl CommissionTierResolver {
    pub fn new(store: Arc<dyn SettlementStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    /// `Ok(None)` when no tier of the entity covers the amount.
    #[instrument(skip(self, entity), fields(entity = %entity, amount = %amount))]
    pub async fn resolve(
        &self,
        entity: CommissionEntity,
        amount: Decimal,
    ) -> Result<Option<TierMatch>, AppError> {
        let tiers = bounded(self.lookup_timeout, "tiers_for", self.store.tiers_for(entity)).await?;
        Ok(select_tier(&tiers, amount).map(TierMatch::from))
    }
}
