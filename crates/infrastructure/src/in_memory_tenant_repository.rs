use std::collections::BTreeMap;

use async_trait::async_trait;
use tenantry_application::TenantRepository;
use tenantry_core::AppResult;
use tenantry_domain::{ClientKey, Tenant};
use tokio::sync::RwLock;

/// In-memory tenant repository implementation.
///
/// Records are replaced whole under the write lock, so readers never see a
/// partially applied install. The revision check runs under the same lock.
#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<BTreeMap<String, Tenant>>,
}

impl InMemoryTenantRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_client_key(&self, client_key: &ClientKey) -> AppResult<Option<Tenant>> {
        Ok(self.tenants.read().await.get(client_key.as_str()).cloned())
    }

    async fn save(&self, tenant: &Tenant) -> AppResult<bool> {
        let mut tenants = self.tenants.write().await;
        let client_key = tenant.client_key().as_str();
        if !tenant.follows(tenants.get(client_key)) {
            return Ok(false);
        }

        tenants.insert(client_key.to_owned(), tenant.clone());
        Ok(true)
    }

    async fn list(&self, include_uninstalled: bool) -> AppResult<Vec<Tenant>> {
        Ok(self
            .tenants
            .read()
            .await
            .values()
            .filter(|tenant| include_uninstalled || !tenant.is_uninstalled())
            .cloned()
            .collect())
    }
}
