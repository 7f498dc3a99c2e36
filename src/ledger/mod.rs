pub mod client;
pub mod horizon;
pub mod models;

pub use client::LedgerClient;
pub use horizon::HorizonLedgerClient;
pub use models::{OperationKind, Settlement, SettlementOperation};
