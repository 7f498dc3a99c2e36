use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub horizon_url: String,
    /// Bounded timeout for ledger lookups; on expiry the admission fails
    /// with a retryable `VerificationUnavailable`.
    pub ledger_timeout_secs: u64,
    /// UTC hour at which the nightly reconciliation and billing jobs run.
    pub jobs_execution_hour: u32,
    pub reconciliation_enabled: bool,
    pub billing_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/patronage".to_string()),
            horizon_url: std::env::var("STELLAR_HORIZON_URL")
                .unwrap_or_else(|_| "https://horizon.stellar.org".to_string()),
            ledger_timeout_secs: parse_env("LEDGER_TIMEOUT_SECS", 10)?,
            jobs_execution_hour: parse_env("JOBS_EXECUTION_HOUR", 0)?,
            reconciliation_enabled: parse_env("RECONCILIATION_ENABLED", true)?,
            billing_enabled: parse_env("BILLING_ENABLED", true)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, config::ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| config::ConfigError::Message(format!("invalid value for {}", name))),
        Err(_) => Ok(default),
    }
}
