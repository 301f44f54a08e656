//! Domain models for settlement-service.

pub mod access;
pub mod entity;
pub mod invoice;
pub mod tier;

pub use access::{AccessScope, Role, Visibility};
pub use entity::{Client, CommissionEntity, CommissionParty, Company, Distributor, EntityKind, File};
pub use invoice::{
    CommissionSnapshot, CreateInvoice, Invoice, InvoiceQuery, InvoiceStatus, UpdateInvoice,
};
pub use tier::CommissionTier;
