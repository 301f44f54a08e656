//! Payment ledger and its transition table.
//!
//! Money moves client → distributor → admin → company. Each hop is a
//! [`SettlementStep`]; the stored flags of an invoice map onto exactly one
//! [`SettlementState`], and every mark or unmark goes through
//! [`SettlementState::apply`].

use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One hop of the settlement chain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStep {
    ClientToDistributor,
    DistributorToAdmin,
    AdminToCompany,
}

impl SettlementStep {
    pub const ALL: [SettlementStep; 3] = [
        SettlementStep::ClientToDistributor,
        SettlementStep::DistributorToAdmin,
        SettlementStep::AdminToCompany,
    ];

    pub fn index(self) -> usize {
        match self {
            SettlementStep::ClientToDistributor => 0,
            SettlementStep::DistributorToAdmin => 1,
            SettlementStep::AdminToCompany => 2,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            SettlementStep::ClientToDistributor => None,
            SettlementStep::DistributorToAdmin => Some(SettlementStep::ClientToDistributor),
            SettlementStep::AdminToCompany => Some(SettlementStep::DistributorToAdmin),
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            SettlementStep::ClientToDistributor => Some(SettlementStep::DistributorToAdmin),
            SettlementStep::DistributorToAdmin => Some(SettlementStep::AdminToCompany),
            SettlementStep::AdminToCompany => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SettlementStep::ClientToDistributor => "client_to_distributor",
            SettlementStep::DistributorToAdmin => "distributor_to_admin",
            SettlementStep::AdminToCompany => "admin_to_company",
        }
    }

    /// Accepts snake_case and the camelCase names used by older clients.
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "client_to_distributor" | "clientToDistributor" => {
                Some(SettlementStep::ClientToDistributor)
            }
            "distributor_to_admin" | "distributorToAdmin" => {
                Some(SettlementStep::DistributorToAdmin)
            }
            "admin_to_company" | "adminToCompany" => Some(SettlementStep::AdminToCompany),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SettlementStep::ClientToDistributor => "Client to distributor",
            SettlementStep::DistributorToAdmin => "Distributor to admin",
            SettlementStep::AdminToCompany => "Admin to company",
        }
    }

    /// Document path of this step inside an invoice.
    pub fn field_path(self) -> String {
        format!("payment_status.{}", self.as_str())
    }
}

impl fmt::Display for SettlementStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who marked a step and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub is_paid: bool,
    #[serde(default)]
    pub marked_by: Option<Uuid>,
    #[serde(default)]
    pub marked_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn paid(marked_by: Uuid, marked_at: DateTime<Utc>) -> Self {
        Self {
            is_paid: true,
            marked_by: Some(marked_by),
            marked_at: Some(marked_at),
        }
    }
}

/// Stored payment ledger of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub client_to_distributor: StepRecord,
    pub distributor_to_admin: StepRecord,
    pub admin_to_company: StepRecord,
}

impl PaymentStatus {
    pub fn step(&self, step: SettlementStep) -> &StepRecord {
        match step {
            SettlementStep::ClientToDistributor => &self.client_to_distributor,
            SettlementStep::DistributorToAdmin => &self.distributor_to_admin,
            SettlementStep::AdminToCompany => &self.admin_to_company,
        }
    }

    pub fn step_mut(&mut self, step: SettlementStep) -> &mut StepRecord {
        match step {
            SettlementStep::ClientToDistributor => &mut self.client_to_distributor,
            SettlementStep::DistributorToAdmin => &mut self.distributor_to_admin,
            SettlementStep::AdminToCompany => &mut self.admin_to_company,
        }
    }

    pub fn flags(&self) -> [bool; 3] {
        SettlementStep::ALL.map(|step| self.step(step).is_paid)
    }

    /// `None` when the stored flags skip a step.
    pub fn state(&self) -> Option<SettlementState> {
        SettlementState::from_flags(self.flags())
    }

    /// True when `step` is the next one to mark: unpaid, with its predecessor paid.
    pub fn is_next(&self, step: SettlementStep) -> bool {
        !self.step(step).is_paid
            && step
                .previous()
                .map_or(true, |previous| self.step(previous).is_paid)
    }
}

/// Reachable ledger states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    /// 000
    Unsettled,
    /// 100
    ClientCollected,
    /// 110
    AdminRemitted,
    /// 111
    Settled,
}

/// A requested change to one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Mark(SettlementStep),
    Unmark(SettlementStep),
}

impl SettlementState {
    pub fn from_flags(flags: [bool; 3]) -> Option<Self> {
        match flags {
            [false, false, false] => Some(SettlementState::Unsettled),
            [true, false, false] => Some(SettlementState::ClientCollected),
            [true, true, false] => Some(SettlementState::AdminRemitted),
            [true, true, true] => Some(SettlementState::Settled),
            _ => None,
        }
    }

    pub fn flags(self) -> [bool; 3] {
        match self {
            SettlementState::Unsettled => [false, false, false],
            SettlementState::ClientCollected => [true, false, false],
            SettlementState::AdminRemitted => [true, true, false],
            SettlementState::Settled => [true, true, true],
        }
    }

    pub fn is_paid(self, step: SettlementStep) -> bool {
        self.flags()[step.index()]
    }

    pub fn apply(self, transition: Transition) -> Result<Self, SettlementError> {
        use SettlementState::*;
        use SettlementStep::*;
        use Transition::*;

        match (self, transition) {
            (Unsettled, Mark(ClientToDistributor)) => Ok(ClientCollected),
            (ClientCollected, Mark(DistributorToAdmin)) => Ok(AdminRemitted),
            (AdminRemitted, Mark(AdminToCompany)) => Ok(Settled),
            (ClientCollected, Unmark(ClientToDistributor)) => Ok(Unsettled),
            (AdminRemitted, Unmark(DistributorToAdmin)) => Ok(ClientCollected),
            (Settled, Unmark(AdminToCompany)) => Ok(AdminRemitted),
            (state, Mark(step)) => Err(state.reject_mark(step)),
            (state, Unmark(step)) => Err(state.reject_unmark(step)),
        }
    }

    fn reject_mark(self, step: SettlementStep) -> SettlementError {
        if self.is_paid(step) {
            return SettlementError::AlreadyPaid { step };
        }
        let blocking = SettlementStep::ALL
            .into_iter()
            .find(|s| !self.is_paid(*s))
            .unwrap_or(step);
        SettlementError::OutOfOrder { step, blocking }
    }

    fn reject_unmark(self, step: SettlementStep) -> SettlementError {
        if !self.is_paid(step) {
            return SettlementError::NotPaid { step };
        }
        let blocking = SettlementStep::ALL
            .into_iter()
            .rev()
            .find(|s| self.is_paid(*s))
            .unwrap_or(step);
        SettlementError::OutOfOrder { step, blocking }
    }

    pub fn label(self) -> &'static str {
        match self {
            SettlementState::Unsettled => "Not started",
            SettlementState::ClientCollected => "Client paid",
            SettlementState::AdminRemitted => "Remitted to admin",
            SettlementState::Settled => "Settled",
        }
    }

    pub fn progress_percent(self) -> u8 {
        match self {
            SettlementState::Unsettled => 0,
            SettlementState::ClientCollected => 33,
            SettlementState::AdminRemitted => 67,
            SettlementState::Settled => 100,
        }
    }
}
