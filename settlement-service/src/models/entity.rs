//! Commission-bearing parties and the file → company link.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of party a commission tier is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Distributor,
    Company,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Distributor => "distributor",
            EntityKind::Company => "company",
        }
    }
}

/// A commission party, identified by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommissionEntity {
    Client(Uuid),
    Distributor(Uuid),
    Company(Uuid),
}

impl CommissionEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            CommissionEntity::Client(_) => EntityKind::Client,
            CommissionEntity::Distributor(_) => EntityKind::Distributor,
            CommissionEntity::Company(_) => EntityKind::Company,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            CommissionEntity::Client(id)
            | CommissionEntity::Distributor(id)
            | CommissionEntity::Company(id) => *id,
        }
    }
}

impl fmt::Display for CommissionEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// Anything that carries a default commission rate.
pub trait CommissionParty {
    fn entity(&self) -> CommissionEntity;

    /// Rate used when no tier matches the amount.
    fn default_rate(&self) -> Decimal;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub commission_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distributor {
    pub distributor_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub commission_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub commission_rate: Decimal,
}

/// An uploaded file; invoices reach their company through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub file_id: Uuid,
    pub file_name: String,
    #[serde(default)]
    pub company_id: Option<Uuid>,
}

impl CommissionParty for Client {
    fn entity(&self) -> CommissionEntity {
        CommissionEntity::Client(self.client_id)
    }

    fn default_rate(&self) -> Decimal {
        self.commission_rate
    }
}

impl CommissionParty for Distributor {
    fn entity(&self) -> CommissionEntity {
        CommissionEntity::Distributor(self.distributor_id)
    }

    fn default_rate(&self) -> Decimal {
        self.commission_rate
    }
}

impl CommissionParty for Company {
    fn entity(&self) -> CommissionEntity {
        CommissionEntity::Company(self.company_id)
    }

    fn default_rate(&self) -> Decimal {
        self.commission_rate
    }
}
