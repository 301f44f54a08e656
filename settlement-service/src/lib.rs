//! Settlement Service - commission resolution and staged invoice settlement.

pub mod commission;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod reporting;
pub mod services;
pub mod settlement;
pub mod startup;
pub mod store;
