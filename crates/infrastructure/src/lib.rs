//! Infrastructure adapters for tenant registry ports.

#![forbid(unsafe_code)]

mod aes_secret_encryptor;
mod in_memory_tenant_repository;
mod jwt_signature_verifier;
mod postgres_tenant_repository;
mod registry_bootstrap;
mod registry_config;

pub use aes_secret_encryptor::AesSecretEncryptor;
pub use in_memory_tenant_repository::InMemoryTenantRepository;
pub use jwt_signature_verifier::{JwtSignatureVerifier, canonical_request, query_string_hash};
pub use postgres_tenant_repository::PostgresTenantRepository;
pub use registry_bootstrap::{build_tenant_registry, connect_and_migrate};
pub use registry_config::{PostgresStorageConfig, RegistryConfig, StorageBackend, init_tracing};
