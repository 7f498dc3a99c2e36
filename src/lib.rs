//! Core of the patronage payments backend: admission of externally-settled
//! payments, per-resource aggregate caching with scheduled reconciliation,
//! and capacity-limited subscription billing.

pub mod bootstrap;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod payments;
pub mod principals;
pub mod reconciliation;
pub mod scheduler;
pub mod subscriptions;
