use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tenantry_application::SecretEncryptor;
use tenantry_core::{AppError, AppResult, TenantId};
use tenantry_domain::{Tenant, TenantRecord};
use uuid::Uuid;

#[derive(FromRow)]
pub(super) struct TenantRow {
    pub(super) id: Uuid,
    pub(super) client_key: String,
    pub(super) addon_key: String,
    pub(super) public_key: Option<String>,
    pub(super) shared_secret: Option<Vec<u8>>,
    pub(super) base_url: String,
    pub(super) product_type: String,
    pub(super) server_version: Option<String>,
    pub(super) plugin_version: Option<String>,
    pub(super) description: Option<String>,
    pub(super) oauth_client_token: Option<Vec<u8>>,
    pub(super) event_type: String,
    pub(super) enabled: bool,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
    pub(super) uninstalled_at: Option<DateTime<Utc>>,
    pub(super) revision: i64,
}

impl TenantRow {
    pub(super) fn into_tenant(self, encryptor: &dyn SecretEncryptor) -> AppResult<Tenant> {
        let shared_secret = decrypt_column(encryptor, self.shared_secret, &self.client_key)?;
        let oauth_client_token =
            decrypt_column(encryptor, self.oauth_client_token, &self.client_key)?;
        let revision = u64::try_from(self.revision).map_err(|_| {
            AppError::Internal(format!(
                "stored tenant '{}' has negative revision",
                self.client_key
            ))
        })?;

        Tenant::from_record(TenantRecord {
            id: TenantId::from_uuid(self.id),
            addon_key: self.addon_key,
            client_key: self.client_key,
            public_key: self.public_key,
            shared_secret,
            base_url: self.base_url,
            product_type: self.product_type,
            server_version: self.server_version,
            plugin_version: self.plugin_version,
            description: self.description,
            oauth_client_token,
            event_type: self.event_type,
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
            uninstalled_at: self.uninstalled_at,
            revision,
        })
    }
}

/// Credential columns as written to storage.
pub(super) struct SealedCredentials {
    pub(super) shared_secret: Option<Vec<u8>>,
    pub(super) oauth_client_token: Option<Vec<u8>>,
}

impl SealedCredentials {
    pub(super) fn seal(
        record: &TenantRecord,
        encryptor: &dyn SecretEncryptor,
    ) -> AppResult<Self> {
        let seal = |value: Option<&str>| {
            value
                .map(|value| encryptor.encrypt(value.as_bytes()))
                .transpose()
        };

        Ok(Self {
            shared_secret: seal(record.shared_secret.as_deref())?,
            oauth_client_token: seal(record.oauth_client_token.as_deref())?,
        })
    }
}

fn decrypt_column(
    encryptor: &dyn SecretEncryptor,
    value: Option<Vec<u8>>,
    client_key: &str,
) -> AppResult<Option<String>> {
    value
        .map(|ciphertext| {
            let plaintext = encryptor.decrypt(&ciphertext)?;
            String::from_utf8(plaintext).map_err(|_| {
                AppError::Internal(format!(
                    "stored credential of tenant '{client_key}' is not valid UTF-8"
                ))
            })
        })
        .transpose()
}
