use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger::models::Settlement;

/// Network boundary to the external ledger.
///
/// Implementations must distinguish "the call could not be completed"
/// (`LedgerError::Unavailable`, retryable) from "the ledger answered and the
/// settlement does not exist" (`LedgerError::NotFound`, permanent for the
/// reference). A settlement that exists but failed on the ledger is returned
/// with `successful = false`, not as an error.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_settlement(&self, settlement_ref: &str) -> Result<Settlement, LedgerError>;
}
