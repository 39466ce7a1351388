//! Application services and ports.

#![forbid(unsafe_code)]

mod tenant_ports;
mod tenant_registry_service;

pub use tenant_ports::{SecretEncryptor, SignatureVerifier, TenantRepository};
pub use tenant_registry_service::{RotationPolicy, TenantRegistryConfig, TenantRegistryService};
