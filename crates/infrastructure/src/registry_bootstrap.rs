//! Wires storage, signature verification and the registry service from config.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tenantry_application::{TenantRegistryService, TenantRepository};
use tenantry_core::{AppError, AppResult};
use tracing::info;

use crate::registry_config::{PostgresStorageConfig, RegistryConfig, StorageBackend};
use crate::{
    AesSecretEncryptor, InMemoryTenantRepository, JwtSignatureVerifier, PostgresTenantRepository,
};

/// Builds a tenant registry service for the configured storage backend.
pub async fn build_tenant_registry(config: &RegistryConfig) -> AppResult<TenantRegistryService> {
    let repository: Arc<dyn TenantRepository> = match &config.storage {
        StorageBackend::Memory => Arc::new(InMemoryTenantRepository::new()),
        StorageBackend::Postgres(postgres) => {
            let encryptor = AesSecretEncryptor::from_hex(&postgres.secret_encryption_key)?;
            let pool = connect_and_migrate(postgres, config.registry.storage_timeout).await?;
            Arc::new(PostgresTenantRepository::new(pool, Arc::new(encryptor)))
        }
    };

    info!(
        storage = config.storage.name(),
        rotation_policy = config.registry.rotation_policy.as_str(),
        credential_precedence = config.registry.credential_precedence.as_str(),
        storage_timeout_ms = saturating_millis(config.registry.storage_timeout),
        "tenant registry ready"
    );

    Ok(
        TenantRegistryService::new(repository, Arc::new(JwtSignatureVerifier::new()))
            .with_config(config.registry.clone()),
    )
}

/// Connects the tenant store pool and applies the embedded migrations.
pub async fn connect_and_migrate(
    config: &PostgresStorageConfig,
    acquire_timeout: Duration,
) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
