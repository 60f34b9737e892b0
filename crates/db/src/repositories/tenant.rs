use chrono::{DateTime, Utc};
use sqlx::Row;

use atelier_core::domain::tenant::{Tenant, TenantId};

use super::{RepositoryError, TenantRepository};
use crate::DbPool;

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_tenant(row: &sqlx::sqlite::SqliteRow) -> Result<Tenant, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `created_at`: `{created_at}` ({error})"))
        })?;

    Ok(Tenant { id: TenantId(id), name, created_at })
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn insert(&self, tenant: Tenant) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO tenants (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&tenant.id.0)
        .bind(&tenant.name)
        .bind(super::ledger::encode_timestamp(tenant.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, created_at FROM tenants WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_tenant).transpose()
    }

    async fn list(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM tenants ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_tenant).collect()
    }
}
