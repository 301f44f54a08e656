//! Rate for one party: matching tier, else the party's default, else zero.

use crate::commission::tier::CommissionTierResolver;
use crate::models::CommissionEntity;
use crate::services::metrics::{COMMISSION_LOOKUPS_TOTAL, ERRORS_TOTAL};
use crate::store::{bounded, SettlementStore};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Where a quoted rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateSource {
    Tier { tier_id: Uuid },
    EntityDefault,
    /// Entity missing or unreachable; the rate is zero.
    Fallback,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Tier { .. } => "tier",
            RateSource::EntityDefault => "entity_default",
            RateSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateQuote {
    pub entity: CommissionEntity,
    pub rate: Decimal,
    pub source: RateSource,
}

impl RateQuote {
    fn fallback(entity: CommissionEntity) -> Self {
        Self {
            entity,
            rate: Decimal::ZERO,
            source: RateSource::Fallback,
        }
    }
}

#[derive(Clone)]
pub struct CommissionRateService {
    resolver: CommissionTierResolver,
    store: Arc<dyn SettlementStore>,
    lookup_timeout: Duration,
}

impl CommissionRateService {
    pub fn new(store: Arc<dyn SettlementStore>, lookup_timeout: Duration) -> Self {
        Self {
            resolver: CommissionTierResolver::new(store.clone(), lookup_timeout),
            store,
            lookup_timeout,
        }
    }

    /// Quote the rate for `entity` at `amount`. Never fails: lookup errors
    /// are logged and quoted as a zero fallback.
    #[instrument(skip(self, entity), fields(entity = %entity, amount = %amount))]
    pub async fn rate_for(&self, entity: CommissionEntity, amount: Decimal) -> RateQuote {
        let quote = self.lookup(entity, amount).await;

        COMMISSION_LOOKUPS_TOTAL
            .with_label_values(&[entity.kind().as_str(), quote.source.as_str()])
            .inc();
        debug!(rate = %quote.rate, source = quote.source.as_str(), "Commission rate resolved");

        quote
    }

    async fn lookup(&self, entity: CommissionEntity, amount: Decimal) -> RateQuote {
        match self.resolver.resolve(entity, amount).await {
            Ok(Some(tier)) => {
                return RateQuote {
                    entity,
                    rate: tier.rate,
                    source: RateSource::Tier {
                        tier_id: tier.tier_id,
                    },
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Tier lookup failed, using zero rate");
                ERRORS_TOTAL.with_label_values(&["tier_lookup"]).inc();
                return RateQuote::fallback(entity);
            }
        }

        match bounded(
            self.lookup_timeout,
            "default_rate",
            self.store.default_rate(entity),
        )
        .await
        {
            Ok(Some(rate)) => RateQuote {
                entity,
                rate,
                source: RateSource::EntityDefault,
            },
            Ok(None) => {
                debug!("Entity not found, using zero rate");
                RateQuote::fallback(entity)
            }
            Err(e) => {
                warn!(error = %e, "Default rate lookup failed, using zero rate");
                ERRORS_TOTAL.with_label_values(&["default_rate_lookup"]).inc();
                RateQuote::fallback(entity)
            }
        }
    }
}
