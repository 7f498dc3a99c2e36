use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;

/// A principal as seen by this core: just enough identity to route and
/// describe a payment. Identity management itself lives elsewhere.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub wallet_address: Option<String>,
}

/// Read-only view onto the identity collaborator.
///
/// `find` returns `None` for unknown or soft-deleted principals; callers
/// decide whether that is fatal (a recipient) or tolerable (a payer whose
/// payment is recorded as anonymous).
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find(&self, principal_id: Uuid) -> AppResult<Option<Principal>>;
}

impl Principal {
    pub fn display_name_or_anonymous(&self) -> &str {
        self.display_name.as_deref().unwrap_or("a supporter")
    }
}

/// Directory backed by the platform's principals table. Soft-deleted rows
/// are reported as absent so removed accounts degrade to anonymous payers.
pub struct PgPrincipalDirectory {
    pool: sqlx::PgPool,
}

impl PgPrincipalDirectory {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalDirectory for PgPrincipalDirectory {
    async fn find(&self, principal_id: Uuid) -> AppResult<Option<Principal>> {
        let row = sqlx::query_as::<_, (Uuid, Option<String>, Option<String>)>(
            r#"
            SELECT id, display_name, wallet_address
            FROM principals
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, display_name, wallet_address)| Principal {
            id,
            display_name,
            wallet_address,
        }))
    }
}
