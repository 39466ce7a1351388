use tenantry_core::{AppError, AppResult};
use tenantry_domain::{ClientKey, Tenant, VerificationKey};
use tracing::debug;

use super::TenantRegistryService;

impl TenantRegistryService {
    /// Returns the tenant snapshot for a client key.
    ///
    /// Uninstalled tenants are reported as missing unless `include_uninstalled`
    /// is set.
    pub async fn lookup(&self, client_key: &str, include_uninstalled: bool) -> AppResult<Tenant> {
        let client_key = ClientKey::new(client_key)?;
        let tenant = self.find(&client_key).await?;

        if tenant.is_uninstalled() && !include_uninstalled {
            return Err(AppError::NotFound(format!(
                "tenant '{client_key}' not found"
            )));
        }

        Ok(tenant)
    }

    /// Lists tenant snapshots ordered by client key.
    pub async fn list_tenants(&self, include_uninstalled: bool) -> AppResult<Vec<Tenant>> {
        self.with_storage_timeout("tenant listing", self.repository.list(include_uninstalled))
            .await
    }

    /// Verifies a signed host request against the tenant's stored key material.
    pub async fn verify_signature(
        &self,
        client_key: &str,
        request_digest: &str,
        signature: &str,
    ) -> AppResult<bool> {
        let client_key = ClientKey::new(client_key)?;
        let tenant = self.find(&client_key).await?;
        tenant.ensure_can_verify()?;

        let key = tenant.verification_key(self.config.credential_precedence)?;
        let mode = match key {
            VerificationKey::SharedSecret(_) => "symmetric",
            VerificationKey::PublicKey(_) => "asymmetric",
        };
        let verified = self
            .signature_verifier
            .verify(&client_key, key, request_digest, signature)?;

        debug!(client_key = %client_key, mode, verified, "tenant signature checked");

        Ok(verified)
    }

    async fn find(&self, client_key: &ClientKey) -> AppResult<Tenant> {
        self.with_storage_timeout(
            "tenant lookup",
            self.repository.find_by_client_key(client_key),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tenant '{client_key}' not found")))
    }
}
