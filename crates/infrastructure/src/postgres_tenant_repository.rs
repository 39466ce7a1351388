use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tenantry_application::{SecretEncryptor, TenantRepository};
use tenantry_core::{AppError, AppResult};
use tenantry_domain::{ClientKey, Tenant};
use tracing::debug;

mod rows;

use rows::{SealedCredentials, TenantRow};

const SELECT_TENANT_COLUMNS: &str = r#"
    SELECT
        id,
        client_key,
        addon_key,
        public_key,
        shared_secret,
        base_url,
        product_type,
        server_version,
        plugin_version,
        description,
        oauth_client_token,
        event_type,
        enabled,
        created_at,
        updated_at,
        uninstalled_at,
        revision
    FROM connect_tenants
"#;

const INSERT_TENANT: &str = r#"
    INSERT INTO connect_tenants (
        id,
        client_key,
        addon_key,
        public_key,
        shared_secret,
        base_url,
        product_type,
        server_version,
        plugin_version,
        description,
        oauth_client_token,
        event_type,
        enabled,
        created_at,
        updated_at,
        uninstalled_at,
        revision
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    ON CONFLICT (client_key) DO NOTHING
"#;

const UPDATE_TENANT: &str = r#"
    UPDATE connect_tenants
    SET
        addon_key = $3,
        public_key = $4,
        shared_secret = $5,
        base_url = $6,
        product_type = $7,
        server_version = $8,
        plugin_version = $9,
        description = $10,
        oauth_client_token = $11,
        event_type = $12,
        enabled = $13,
        created_at = $14,
        updated_at = $15,
        uninstalled_at = $16,
        revision = $17
    WHERE id = $1
      AND client_key = $2
      AND revision = $17 - 1
"#;

/// PostgreSQL-backed tenant repository with credentials encrypted at rest.
#[derive(Clone)]
pub struct PostgresTenantRepository {
    pool: PgPool,
    encryptor: Arc<dyn SecretEncryptor>,
}

impl PostgresTenantRepository {
    /// Creates a repository with the provided connection pool and encryptor.
    #[must_use]
    pub fn new(pool: PgPool, encryptor: Arc<dyn SecretEncryptor>) -> Self {
        Self { pool, encryptor }
    }
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn find_by_client_key(&self, client_key: &ClientKey) -> AppResult<Option<Tenant>> {
        let query = format!("{SELECT_TENANT_COLUMNS} WHERE client_key = $1");
        let row = sqlx::query_as::<_, TenantRow>(query.as_str())
            .bind(client_key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to load tenant '{client_key}': {error}"
                ))
            })?;

        row.map(|row| row.into_tenant(self.encryptor.as_ref()))
            .transpose()
    }

    async fn save(&self, tenant: &Tenant) -> AppResult<bool> {
        let record = tenant.to_record();
        let sealed = SealedCredentials::seal(&record, self.encryptor.as_ref())?;
        let revision = i64::try_from(record.revision).map_err(|_| {
            AppError::Internal(format!(
                "revision of tenant '{}' exceeds storage range",
                record.client_key
            ))
        })?;
        let statement = if record.revision == 1 {
            INSERT_TENANT
        } else {
            UPDATE_TENANT
        };

        // Either statement is a single row write guarded by the stored revision.
        let result = sqlx::query(statement)
            .bind(record.id.as_uuid())
            .bind(record.client_key.as_str())
            .bind(record.addon_key.as_str())
            .bind(record.public_key.as_deref())
            .bind(sealed.shared_secret)
            .bind(record.base_url.as_str())
            .bind(record.product_type.as_str())
            .bind(record.server_version.as_deref())
            .bind(record.plugin_version.as_deref())
            .bind(record.description.as_deref())
            .bind(sealed.oauth_client_token)
            .bind(record.event_type.as_str())
            .bind(record.enabled)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.uninstalled_at)
            .bind(revision)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to persist tenant '{}': {error}",
                    record.client_key
                ))
            })?;

        let written = result.rows_affected() == 1;
        debug!(
            client_key = record.client_key.as_str(),
            event_type = record.event_type.as_str(),
            revision = record.revision,
            written,
            "tenant row write attempted"
        );

        Ok(written)
    }

    async fn list(&self, include_uninstalled: bool) -> AppResult<Vec<Tenant>> {
        let query = format!(
            "{SELECT_TENANT_COLUMNS} WHERE ($1 OR uninstalled_at IS NULL) ORDER BY client_key"
        );
        let rows = sqlx::query_as::<_, TenantRow>(query.as_str())
            .bind(include_uninstalled)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list tenants: {error}")))?;

        rows.into_iter()
            .map(|row| row.into_tenant(self.encryptor.as_ref()))
            .collect()
    }
}
