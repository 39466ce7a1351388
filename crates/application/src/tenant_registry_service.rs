//! Tenant registry: lifecycle events, credential lookups and signature checks.
//!
//! Mutations are serialized per client key and every storage call carries the
//! configured timeout.

use std::future::Future;
use std::sync::Arc;

use tenantry_core::{AppError, AppResult};
use tenantry_domain::ClientKey;
use tokio::sync::OwnedMutexGuard;

use crate::tenant_ports::{SignatureVerifier, TenantRepository};

mod config;
mod key_locks;
mod lifecycle;
mod lookup;

pub use config::{RotationPolicy, TenantRegistryConfig};

use key_locks::KeyLocks;

/// Application service owning the tenant lifecycle.
#[derive(Clone)]
pub struct TenantRegistryService {
    repository: Arc<dyn TenantRepository>,
    signature_verifier: Arc<dyn SignatureVerifier>,
    config: TenantRegistryConfig,
    key_locks: Arc<KeyLocks>,
}

impl TenantRegistryService {
    /// Creates a registry service with default configuration.
    #[must_use]
    pub fn new(
        repository: Arc<dyn TenantRepository>,
        signature_verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            repository,
            signature_verifier,
            config: TenantRegistryConfig::default(),
            key_locks: Arc::new(KeyLocks::default()),
        }
    }

    /// Replaces the registry configuration.
    #[must_use]
    pub fn with_config(mut self, config: TenantRegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the active registry configuration.
    #[must_use]
    pub fn config(&self) -> &TenantRegistryConfig {
        &self.config
    }

    async fn with_storage_timeout<T>(
        &self,
        operation: &str,
        future: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::time::timeout(self.config.storage_timeout, future)
            .await
            .map_err(|_| {
                AppError::StorageTimeout(format!(
                    "{operation} did not complete within {} ms",
                    self.config.storage_timeout.as_millis()
                ))
            })?
    }

    async fn lock_client(&self, client_key: &ClientKey) -> AppResult<OwnedMutexGuard<()>> {
        let lock = self.key_locks.handle(client_key)?;
        tokio::time::timeout(self.config.storage_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                AppError::StorageTimeout(format!(
                    "waiting for pending writes on tenant '{client_key}' timed out"
                ))
            })
    }
}

#[cfg(test)]
mod tests;
