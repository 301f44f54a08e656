//! Amount-bracketed commission tiers.

use crate::models::entity::CommissionEntity;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rate that applies to one party for amounts in `[min_amount, max_amount)`.
/// `max_amount = None` is the open-ended top tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub tier_id: Uuid,
    pub entity: CommissionEntity,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    /// Percentage, 0-100.
    pub rate: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl CommissionTier {
    pub fn new(
        entity: CommissionEntity,
        min_amount: Decimal,
        max_amount: Option<Decimal>,
        rate: Decimal,
    ) -> Self {
        Self {
            tier_id: Uuid::new_v4(),
            entity,
            min_amount,
            max_amount,
            rate,
            created_utc: Utc::now(),
        }
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && self.max_amount.map_or(true, |max| amount < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_bracket_is_half_open() {
        let tier = CommissionTier::new(
            CommissionEntity::Client(Uuid::new_v4()),
            dec("100"),
            Some(dec("500")),
            dec("2.5"),
        );
        assert!(!tier.contains(dec("99.99")));
        assert!(tier.contains(dec("100")));
        assert!(tier.contains(dec("499.99")));
        assert!(!tier.contains(dec("500")));
    }

    #[test]
    fn test_open_ended_tier() {
        let tier = CommissionTier::new(
            CommissionEntity::Company(Uuid::new_v4()),
            dec("1000"),
            None,
            dec("1"),
        );
        assert!(tier.contains(dec("1000000")));
        assert!(!tier.contains(dec("999")));
    }
}
