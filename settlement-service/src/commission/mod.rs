//! Commission rate resolution: tiers, entity defaults and invoice snapshots.

pub mod calculator;
pub mod rate;
pub mod tier;

pub use calculator::{CommissionPreview, InvoiceCommissionCalculator, SnapshotRequest};
pub use rate::{CommissionRateService, RateQuote, RateSource};
pub use tier::{select_tier, CommissionTierResolver, TierMatch};
