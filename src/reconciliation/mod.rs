pub mod service;

pub use service::{DiscrepancyReport, ReconciliationService, RECONCILIATION_TOLERANCE};
