use async_trait::async_trait;
use tenantry_core::AppResult;
use tenantry_domain::{ClientKey, Tenant, VerificationKey};

/// Port for tenant record persistence.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Finds the tenant for a client key, including soft-deleted tenants.
    async fn find_by_client_key(&self, client_key: &ClientKey) -> AppResult<Option<Tenant>>;

    /// Writes the whole tenant record if storage still holds the snapshot it
    /// was derived from.
    ///
    /// Revision 1 inserts a client key that must not exist yet. Any later
    /// revision replaces the record stored at `revision - 1`. Returns
    /// `false` without writing when another writer got there first.
    ///
    /// Readers must observe either the previous record or this one, never a
    /// mix of both.
    async fn save(&self, tenant: &Tenant) -> AppResult<bool>;

    /// Lists tenants ordered by client key.
    async fn list(&self, include_uninstalled: bool) -> AppResult<Vec<Tenant>>;
}

/// Port for the cryptographic check behind signed host requests.
pub trait SignatureVerifier: Send + Sync {
    /// Checks `signature` over `request_digest` with the given key material.
    ///
    /// Returns `Ok(false)` for any signature that does not verify.
    fn verify(
        &self,
        client_key: &ClientKey,
        key: VerificationKey<'_>,
        request_digest: &str,
        signature: &str,
    ) -> AppResult<bool>;
}

/// Port for encrypting tenant credentials at rest.
pub trait SecretEncryptor: Send + Sync {
    /// Encrypts plaintext bytes.
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>>;

    /// Decrypts bytes produced by [`SecretEncryptor::encrypt`].
    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>>;
}
