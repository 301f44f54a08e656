//! Domain errors for settlement operations.

use crate::settlement::ledger::SettlementStep;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Payment step '{step}' is already marked as paid")]
    AlreadyPaid { step: SettlementStep },

    #[error("Payment step '{step}' is not marked as paid")]
    NotPaid { step: SettlementStep },

    #[error("Payment step '{step}' is out of order: blocked by '{blocking}'")]
    OutOfOrder {
        step: SettlementStep,
        blocking: SettlementStep,
    },

    #[error("Invoice amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Invoice amount {0} is too large to compute commissions")]
    AmountTooLarge(Decimal),

    #[error("Totals over the selected invoices overflow")]
    TotalsOverflow,

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Invoice {0} has an inconsistent payment ledger")]
    InconsistentLedger(Uuid),

    #[error("Invoice {0} was modified concurrently")]
    ConcurrentModification(Uuid),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl SettlementError {
    pub fn invoice_not_found(invoice_id: Uuid) -> Self {
        SettlementError::NotFound(format!("Invoice {}", invoice_id))
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::NotFound(_) => "not_found",
            SettlementError::AlreadyPaid { .. } => "already_paid",
            SettlementError::NotPaid { .. } => "not_paid",
            SettlementError::OutOfOrder { .. } => "out_of_order",
            SettlementError::InvalidAmount(_) => "invalid_amount",
            SettlementError::AmountTooLarge(_) => "amount_too_large",
            SettlementError::TotalsOverflow => "totals_overflow",
            SettlementError::Permission(_) => "permission",
            SettlementError::InconsistentLedger(_) => "inconsistent_ledger",
            SettlementError::ConcurrentModification(_) => "concurrent_modification",
            SettlementError::Store(_) => "store",
        }
    }
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            SettlementError::AlreadyPaid { .. }
            | SettlementError::NotPaid { .. }
            | SettlementError::OutOfOrder { .. }
            | SettlementError::ConcurrentModification(_) => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            SettlementError::InvalidAmount(_) | SettlementError::AmountTooLarge(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            SettlementError::Permission(_) => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            SettlementError::InconsistentLedger(_) | SettlementError::TotalsOverflow => {
                AppError::InternalError(anyhow::anyhow!(err.to_string()))
            }
            SettlementError::Store(e) => e,
        }
    }
}
