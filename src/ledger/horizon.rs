use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::client::LedgerClient;
use crate::ledger::models::{OperationKind, Settlement, SettlementOperation};

/// Ledger client backed by a Stellar Horizon instance.
pub struct HorizonLedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HorizonLedgerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("client construction: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        settlement_ref: &str,
    ) -> Result<T, LedgerError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(settlement_ref.to_string()));
        }
        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "horizon returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl LedgerClient for HorizonLedgerClient {
    async fn get_settlement(&self, settlement_ref: &str) -> Result<Settlement, LedgerError> {
        let tx: TransactionRecord = self
            .fetch_json(&format!("/transactions/{}", settlement_ref), settlement_ref)
            .await?;

        let payments: PaymentsPage = self
            .fetch_json(
                &format!("/transactions/{}/payments", settlement_ref),
                settlement_ref,
            )
            .await?;

        debug!(
            settlement_ref,
            successful = tx.successful,
            operations = payments.embedded.records.len(),
            "fetched settlement from horizon"
        );

        let operations = payments
            .embedded
            .records
            .into_iter()
            .map(OperationRecord::into_operation)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Settlement {
            settlement_ref: settlement_ref.to_string(),
            successful: tx.successful,
            settled_at: tx.created_at,
            operations,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TransactionRecord {
    successful: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PaymentsPage {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedRecords,
}

#[derive(Debug, Deserialize)]
struct EmbeddedRecords {
    records: Vec<OperationRecord>,
}

/// One record from Horizon's `/payments` endpoint.
#[derive(Debug, Deserialize)]
struct OperationRecord {
    #[serde(rename = "type")]
    kind: String,
    to: Option<String>,
    amount: Option<String>,
    asset_type: Option<String>,
    asset_code: Option<String>,
    asset_issuer: Option<String>,
}

impl OperationRecord {
    fn into_operation(self) -> Result<SettlementOperation, LedgerError> {
        let kind = match self.kind.as_str() {
            "payment" | "path_payment_strict_send" | "path_payment_strict_receive" => {
                OperationKind::Transfer
            }
            _ => OperationKind::Other,
        };

        let amount = match &self.amount {
            Some(raw) => Decimal::from_str(raw)
                .map_err(|_| LedgerError::Malformed(format!("bad amount: {}", raw)))?,
            None => Decimal::ZERO,
        };

        let asset_code = match self.asset_type.as_deref() {
            Some("native") | None => "XLM".to_string(),
            _ => self.asset_code.unwrap_or_default(),
        };

        Ok(SettlementOperation {
            kind,
            destination: self.to.unwrap_or_default(),
            amount,
            asset_code,
            asset_issuer: self.asset_issuer,
        })
    }
}
