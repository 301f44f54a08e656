//! Caller identity and invoice visibility.

use crate::models::invoice::Invoice;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Distributor,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Distributor => "distributor",
            Role::Staff => "staff",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            "distributor" => Role::Distributor,
            _ => Role::Staff,
        }
    }
}

/// Which invoices a scope may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    AssignedTo(Uuid),
    Nothing,
}

/// Explicit caller identity passed into every core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessScope {
    pub actor_id: Uuid,
    pub role: Role,
    pub can_view_all: bool,
    pub can_view_own: bool,
}

impl AccessScope {
    pub fn new(actor_id: Uuid, role: Role, can_view_all: bool, can_view_own: bool) -> Self {
        Self {
            actor_id,
            role,
            can_view_all,
            can_view_own,
        }
    }

    /// Administrator with full visibility.
    pub fn admin(actor_id: Uuid) -> Self {
        Self::new(actor_id, Role::Admin, true, true)
    }

    /// Distributor restricted to the invoices assigned to them.
    pub fn distributor(actor_id: Uuid) -> Self {
        Self::new(actor_id, Role::Distributor, false, true)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn visibility(&self) -> Visibility {
        if self.can_view_all {
            Visibility::All
        } else if self.can_view_own {
            Visibility::AssignedTo(self.actor_id)
        } else {
            Visibility::Nothing
        }
    }

    pub fn can_see(&self, invoice: &Invoice) -> bool {
        match self.visibility() {
            Visibility::All => true,
            Visibility::AssignedTo(actor) => invoice.assigned_distributor_id == actor,
            Visibility::Nothing => false,
        }
    }
}
