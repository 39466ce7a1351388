use std::str::FromStr;
use std::time::Duration;

use tenantry_core::AppError;
use tenantry_domain::CredentialPrecedence;

/// Default bound on a single storage call or per-tenant lock wait.
const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// What an install event may do to an active tenant's key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// Reinstalls silently replace the shared secret and public key.
    #[default]
    Allow,
    /// Reinstalls that change key material fail with a conflict.
    Forbid,
}

impl RotationPolicy {
    /// Returns the configuration string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Forbid => "forbid",
        }
    }
}

impl FromStr for RotationPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "allow" => Ok(Self::Allow),
            "forbid" => Ok(Self::Forbid),
            _ => Err(AppError::Validation(format!(
                "unknown rotation policy '{value}'"
            ))),
        }
    }
}

/// Tunables of the tenant registry service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRegistryConfig {
    /// Policy applied to credential rotation on reinstall.
    pub rotation_policy: RotationPolicy,
    /// Key material preferred for signature checks.
    pub credential_precedence: CredentialPrecedence,
    /// Bound on each storage call and per-tenant lock wait.
    pub storage_timeout: Duration,
}

impl Default for TenantRegistryConfig {
    fn default() -> Self {
        Self {
            rotation_policy: RotationPolicy::default(),
            credential_precedence: CredentialPrecedence::default(),
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }
}
