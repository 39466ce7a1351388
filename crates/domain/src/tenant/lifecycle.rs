//! Per-tenant lifecycle state machine.
//!
//! `installed` carries an `enabled`/`disabled` sub-state and `uninstalled` is
//! terminal until a fresh install reuses the identity slot.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use tenantry_core::{AppError, AppResult, TenantId};

use super::{InstallRequest, Tenant};

/// Lifecycle event applied to a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Add-on installed or reinstalled.
    Installed,
    /// Add-on uninstalled. Soft-deletes the tenant.
    Uninstalled,
    /// Add-on enabled on the host.
    Enabled,
    /// Add-on disabled on the host.
    Disabled,
}

impl LifecycleEvent {
    /// Returns the wire and storage string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Uninstalled => "uninstalled",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for LifecycleEvent {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "installed" => Ok(Self::Installed),
            "uninstalled" => Ok(Self::Uninstalled),
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            _ => Err(AppError::Validation(format!(
                "unknown lifecycle event '{value}'"
            ))),
        }
    }
}

impl Tenant {
    /// Creates a tenant for a previously unknown client key.
    #[must_use]
    pub fn install(request: InstallRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: TenantId::new(),
            addon_key: request.addon_key,
            client_key: request.client_key,
            public_key: request.public_key,
            shared_secret: request.shared_secret,
            base_url: request.base_url,
            product_type: request.product_type,
            server_version: request.server_version,
            plugin_version: request.plugin_version,
            description: request.description,
            oauth_client_token: request.oauth_client_token,
            event_type: LifecycleEvent::Installed,
            enabled: true,
            created_at: now,
            updated_at: now,
            uninstalled_at: None,
            revision: 1,
        }
    }

    /// Returns whether applying `request` would change the signing key material.
    #[must_use]
    pub fn rotates_credentials(&self, request: &InstallRequest) -> bool {
        self.shared_secret != request.shared_secret || self.public_key != request.public_key
    }

    /// Applies an install event for the same client key.
    ///
    /// An active tenant gets its key material, base URL and versions
    /// overwritten. An uninstalled tenant is reactivated with every field taken
    /// from the request.
    pub fn reinstall(&self, request: InstallRequest, now: DateTime<Utc>) -> AppResult<Self> {
        if request.client_key != self.client_key {
            return Err(AppError::Internal(format!(
                "install for client '{}' routed to tenant '{}'",
                request.client_key, self.client_key
            )));
        }

        if request.addon_key != self.addon_key {
            return Err(AppError::Validation(format!(
                "add-on key of tenant '{}' cannot change from '{}' to '{}'",
                self.client_key,
                self.addon_key.as_str(),
                request.addon_key.as_str()
            )));
        }

        if self.is_uninstalled() {
            return Ok(Self {
                id: self.id,
                created_at: self.created_at,
                revision: self.next_revision(),
                ..Self::install(request, now)
            });
        }

        Ok(Self {
            public_key: request.public_key,
            shared_secret: request.shared_secret,
            base_url: request.base_url,
            server_version: request.server_version,
            plugin_version: request.plugin_version,
            event_type: LifecycleEvent::Installed,
            updated_at: now,
            revision: self.next_revision(),
            ..self.clone()
        })
    }

    /// Soft-deletes the tenant. Already uninstalled tenants are returned as-is.
    #[must_use]
    pub fn uninstall(&self, now: DateTime<Utc>) -> Self {
        if self.is_uninstalled() {
            return self.clone();
        }

        Self {
            event_type: LifecycleEvent::Uninstalled,
            updated_at: now,
            uninstalled_at: Some(now),
            revision: self.next_revision(),
            ..self.clone()
        }
    }

    /// Marks the tenant enabled.
    pub fn enable(&self, now: DateTime<Utc>) -> AppResult<Self> {
        self.toggle(true, now)
    }

    /// Marks the tenant disabled.
    pub fn disable(&self, now: DateTime<Utc>) -> AppResult<Self> {
        self.toggle(false, now)
    }

    /// Fails unless the tenant may authenticate signed requests.
    pub fn ensure_can_verify(&self) -> AppResult<()> {
        if self.is_uninstalled() {
            return Err(AppError::InvalidState(format!(
                "tenant '{}' is uninstalled",
                self.client_key
            )));
        }

        if !self.enabled {
            return Err(AppError::InvalidState(format!(
                "tenant '{}' is disabled",
                self.client_key
            )));
        }

        Ok(())
    }

    fn toggle(&self, enabled: bool, now: DateTime<Utc>) -> AppResult<Self> {
        if self.is_uninstalled() {
            return Err(AppError::InvalidState(format!(
                "tenant '{}' is uninstalled and cannot be {}",
                self.client_key,
                if enabled { "enabled" } else { "disabled" }
            )));
        }

        Ok(Self {
            enabled,
            event_type: if enabled {
                LifecycleEvent::Enabled
            } else {
                LifecycleEvent::Disabled
            },
            updated_at: now,
            revision: self.next_revision(),
            ..self.clone()
        })
    }

    fn next_revision(&self) -> u64 {
        self.revision.saturating_add(1)
    }
}
