use chrono::{DateTime, Utc};
use tenantry_core::{AppError, AppResult};
use tenantry_domain::{ClientKey, InstallRequest, LifecycleEvent, LifecyclePayload, Tenant};
use tracing::{debug, info};

use super::{RotationPolicy, TenantRegistryService};

/// Read-modify-write rounds before giving up on a tenant that keeps changing.
const MAX_WRITE_ATTEMPTS: usize = 8;

impl TenantRegistryService {
    /// Dispatches a lifecycle webhook payload by its event type.
    pub async fn handle_lifecycle_event(&self, payload: LifecyclePayload) -> AppResult<Tenant> {
        let event = payload.event()?.ok_or_else(|| {
            AppError::Validation("lifecycle payload must carry an event type".to_owned())
        })?;

        match event {
            LifecycleEvent::Installed => self.handle_install(payload).await,
            LifecycleEvent::Uninstalled => {
                self.handle_uninstall(payload.client_key()?.as_str()).await
            }
            LifecycleEvent::Enabled => self.handle_enable(payload.client_key()?.as_str()).await,
            LifecycleEvent::Disabled => self.handle_disable(payload.client_key()?.as_str()).await,
        }
    }

    /// Creates, rotates or reactivates the tenant named by an install event.
    pub async fn handle_install(&self, payload: LifecyclePayload) -> AppResult<Tenant> {
        let request = InstallRequest::try_from(payload)?;
        let client_key = request.client_key().clone();
        let _guard = self.lock_client(&client_key).await?;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let existing = self.load(&client_key).await?;
            let (tenant, outcome) = self.plan_install(existing, request.clone(), Utc::now())?;

            if !self.save_if_current(&tenant).await? {
                debug!(
                    client_key = %client_key,
                    "tenant changed by another writer, retrying install"
                );
                continue;
            }

            info!(
                client_key = %client_key,
                addon_key = tenant.addon_key().as_str(),
                product_type = tenant.product_type().as_str(),
                outcome,
                "tenant installed"
            );
            return Ok(tenant);
        }

        Err(contended(&client_key))
    }

    /// Soft-deletes a tenant. Repeating the call is a no-op.
    pub async fn handle_uninstall(&self, client_key: &str) -> AppResult<Tenant> {
        self.transition(client_key, LifecycleEvent::Uninstalled, |tenant, now| {
            Ok((!tenant.is_uninstalled()).then(|| tenant.uninstall(now)))
        })
        .await
    }

    /// Marks an installed tenant enabled.
    pub async fn handle_enable(&self, client_key: &str) -> AppResult<Tenant> {
        self.transition(client_key, LifecycleEvent::Enabled, |tenant, now| {
            let next = tenant.enable(now)?;
            Ok((!tenant.is_enabled()).then_some(next))
        })
        .await
    }

    /// Marks an installed tenant disabled.
    pub async fn handle_disable(&self, client_key: &str) -> AppResult<Tenant> {
        self.transition(client_key, LifecycleEvent::Disabled, |tenant, now| {
            let next = tenant.disable(now)?;
            Ok(tenant.is_enabled().then_some(next))
        })
        .await
    }

    fn plan_install(
        &self,
        existing: Option<Tenant>,
        request: InstallRequest,
        now: DateTime<Utc>,
    ) -> AppResult<(Tenant, &'static str)> {
        match existing {
            None => Ok((Tenant::install(request, now), "created")),
            Some(existing) if existing.is_uninstalled() => {
                Ok((existing.reinstall(request, now)?, "reactivated"))
            }
            Some(existing) => {
                let rotates = existing.rotates_credentials(&request);
                if rotates && self.config.rotation_policy == RotationPolicy::Forbid {
                    return Err(AppError::Conflict(format!(
                        "tenant '{}' is installed and credential rotation is forbidden",
                        existing.client_key()
                    )));
                }

                let outcome = if rotates { "rotated" } else { "refreshed" };
                Ok((existing.reinstall(request, now)?, outcome))
            }
        }
    }

    /// Applies a state change under the tenant lock. `None` from `apply`
    /// means the tenant is already in the target state.
    async fn transition(
        &self,
        client_key: &str,
        event: LifecycleEvent,
        apply: impl Fn(&Tenant, DateTime<Utc>) -> AppResult<Option<Tenant>>,
    ) -> AppResult<Tenant> {
        let client_key = ClientKey::new(client_key)?;
        let _guard = self.lock_client(&client_key).await?;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let current = self
                .load(&client_key)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("tenant '{client_key}' not found")))?;

            let Some(next) = apply(&current, Utc::now())? else {
                debug!(
                    client_key = %client_key,
                    event = event.as_str(),
                    "tenant already in requested state"
                );
                return Ok(current);
            };

            if !self.save_if_current(&next).await? {
                debug!(
                    client_key = %client_key,
                    event = event.as_str(),
                    "tenant changed by another writer, retrying"
                );
                continue;
            }

            info!(
                client_key = %client_key,
                event = event.as_str(),
                "tenant lifecycle event applied"
            );
            return Ok(next);
        }

        Err(contended(&client_key))
    }

    async fn load(&self, client_key: &ClientKey) -> AppResult<Option<Tenant>> {
        self.with_storage_timeout(
            "tenant lookup",
            self.repository.find_by_client_key(client_key),
        )
        .await
    }

    async fn save_if_current(&self, tenant: &Tenant) -> AppResult<bool> {
        self.with_storage_timeout("tenant save", self.repository.save(tenant))
            .await
    }
}

fn contended(client_key: &ClientKey) -> AppError {
    AppError::Conflict(format!(
        "tenant '{client_key}' kept changing under concurrent writers"
    ))
}
