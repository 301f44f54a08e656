//! Three-step payment settlement: pure ledger, state machine and bulk processor.

pub mod bulk;
pub mod ledger;
pub mod machine;

pub use bulk::{BulkFilter, BulkOutcome, BulkSettlementProcessor};
pub use ledger::{PaymentStatus, SettlementState, SettlementStep, StepRecord, Transition};
pub use machine::PaymentStepStateMachine;
