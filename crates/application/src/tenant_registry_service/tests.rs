use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tenantry_core::{AppError, AppResult};
use tenantry_domain::{
    ClientKey, CredentialPrecedence, LifecycleEvent, LifecyclePayload, SharedSecret, Tenant,
    VerificationKey,
};

use super::{RotationPolicy, TenantRegistryConfig, TenantRegistryService};
use crate::tenant_ports::{SignatureVerifier, TenantRepository};

#[derive(Default)]
struct TestTenantRepo {
    tenants: Mutex<HashMap<String, Tenant>>,
    saves: AtomicUsize,
    delay: Option<Duration>,
}

impl TestTenantRepo {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, Tenant>>> {
        self.tenants
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock repo state: {error}")))
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TenantRepository for TestTenantRepo {
    async fn find_by_client_key(&self, client_key: &ClientKey) -> AppResult<Option<Tenant>> {
        self.pause().await;
        Ok(self.lock()?.get(client_key.as_str()).cloned())
    }

    async fn save(&self, tenant: &Tenant) -> AppResult<bool> {
        self.pause().await;
        // Yield between read-modify-write steps so unsynchronized callers would interleave.
        tokio::task::yield_now().await;
        let mut tenants = self.lock()?;
        let client_key = tenant.client_key().as_str();
        if !tenant.follows(tenants.get(client_key)) {
            return Ok(false);
        }

        tenants.insert(client_key.to_owned(), tenant.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn list(&self, include_uninstalled: bool) -> AppResult<Vec<Tenant>> {
        let mut tenants: Vec<Tenant> = self
            .lock()?
            .values()
            .filter(|tenant| include_uninstalled || !tenant.is_uninstalled())
            .cloned()
            .collect();
        tenants.sort_by(|left, right| left.client_key().as_str().cmp(right.client_key().as_str()));
        Ok(tenants)
    }
}

/// Accepts signatures of the form `<key material>:<digest>`.
struct EchoVerifier;

impl SignatureVerifier for EchoVerifier {
    fn verify(
        &self,
        _client_key: &ClientKey,
        key: VerificationKey<'_>,
        request_digest: &str,
        signature: &str,
    ) -> AppResult<bool> {
        let material = match key {
            VerificationKey::SharedSecret(secret) => secret.expose(),
            VerificationKey::PublicKey(public_key) => public_key,
        };
        Ok(signature == format!("{material}:{request_digest}"))
    }
}

fn install_payload(client_key: &str, shared_secret: &str) -> LifecyclePayload {
    LifecyclePayload {
        addon_key: Some("test".to_owned()),
        client_key: Some(client_key.to_owned()),
        public_key: None,
        shared_secret: Some(shared_secret.to_owned()),
        server_version: Some("100058".to_owned()),
        plugin_version: Some("1.3.175".to_owned()),
        base_url: Some("https://a.example".to_owned()),
        product_type: Some("jira".to_owned()),
        description: Some("Testing tenant".to_owned()),
        event_type: Some("installed".to_owned()),
        oauth_client_token: None,
    }
}

fn event_payload(client_key: &str, event: &str) -> LifecyclePayload {
    LifecyclePayload {
        client_key: Some(client_key.to_owned()),
        event_type: Some(event.to_owned()),
        ..LifecyclePayload::default()
    }
}

fn service_with(repo: Arc<TestTenantRepo>) -> TenantRegistryService {
    TenantRegistryService::new(repo, Arc::new(EchoVerifier))
}

#[tokio::test]
async fn install_rotate_uninstall_walkthrough() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    service.handle_install(install_payload("c1", "s1")).await?;
    let tenant = service.lookup("c1", false).await?;
    assert_eq!(tenant.event_type(), LifecycleEvent::Installed);
    assert!(tenant.is_enabled());
    assert_eq!(tenant.base_url().as_str(), "https://a.example");

    service.handle_install(install_payload("c1", "s2")).await?;
    let rotated = service.lookup("c1", false).await?;
    assert_eq!(rotated.shared_secret().map(SharedSecret::expose), Some("s2"));
    assert_eq!(rotated.id(), tenant.id());

    service.handle_uninstall("c1").await?;
    assert!(matches!(
        service.lookup("c1", false).await,
        Err(AppError::NotFound(_))
    ));

    let deleted = service.lookup("c1", true).await?;
    assert_eq!(deleted.event_type(), LifecycleEvent::Uninstalled);
    Ok(())
}

#[tokio::test]
async fn distinct_client_keys_do_not_share_credentials() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    service.handle_install(install_payload("c1", "s1")).await?;
    service.handle_install(install_payload("c2", "s2")).await?;

    assert!(service.verify_signature("c1", "qsh", "s1:qsh").await?);
    assert!(!service.verify_signature("c1", "qsh", "s2:qsh").await?);
    assert!(service.verify_signature("c2", "qsh", "s2:qsh").await?);
    Ok(())
}

#[tokio::test]
async fn uninstall_is_idempotent() -> AppResult<()> {
    let repo = Arc::new(TestTenantRepo::default());
    let service = service_with(repo.clone());

    service.handle_install(install_payload("c1", "s1")).await?;
    let first = service.handle_uninstall("c1").await?;
    let second = service.handle_uninstall("c1").await?;

    assert_eq!(first, second);
    assert_eq!(repo.saves.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn unknown_client_keys_are_not_found() {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    assert!(matches!(
        service.handle_uninstall("missing").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.handle_enable("missing").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.handle_disable("missing").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.verify_signature("missing", "qsh", "sig").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.lookup("  ", true).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn toggles_on_uninstalled_tenant_are_invalid() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    service.handle_install(install_payload("c1", "s1")).await?;
    service.handle_uninstall("c1").await?;

    assert!(matches!(
        service.handle_enable("c1").await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        service.handle_disable("c1").await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        service.verify_signature("c1", "qsh", "s1:qsh").await,
        Err(AppError::InvalidState(_))
    ));
    Ok(())
}

#[tokio::test]
async fn disabled_tenant_rejects_signature_checks() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    service.handle_install(install_payload("c1", "s1")).await?;
    let disabled = service.handle_disable("c1").await?;
    assert!(!disabled.is_enabled());
    assert_eq!(
        disabled.shared_secret().map(SharedSecret::expose),
        Some("s1")
    );

    assert!(matches!(
        service.verify_signature("c1", "qsh", "s1:qsh").await,
        Err(AppError::InvalidState(_))
    ));

    service.handle_enable("c1").await?;
    assert!(service.verify_signature("c1", "qsh", "s1:qsh").await?);
    Ok(())
}

#[tokio::test]
async fn repeated_toggles_do_not_write() -> AppResult<()> {
    let repo = Arc::new(TestTenantRepo::default());
    let service = service_with(repo.clone());

    service.handle_install(install_payload("c1", "s1")).await?;
    service.handle_enable("c1").await?;
    service.handle_disable("c1").await?;
    service.handle_disable("c1").await?;

    assert_eq!(repo.saves.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn rotated_secret_invalidates_old_signatures() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    service.handle_install(install_payload("c1", "s1")).await?;
    assert!(service.verify_signature("c1", "qsh", "s1:qsh").await?);

    service.handle_install(install_payload("c1", "s2")).await?;
    assert!(!service.verify_signature("c1", "qsh", "s1:qsh").await?);
    assert!(service.verify_signature("c1", "qsh", "s2:qsh").await?);
    Ok(())
}

#[tokio::test]
async fn precedence_selects_public_key_when_configured() -> AppResult<()> {
    let service =
        service_with(Arc::new(TestTenantRepo::default())).with_config(TenantRegistryConfig {
            credential_precedence: CredentialPrecedence::PublicKeyFirst,
            ..TenantRegistryConfig::default()
        });

    service
        .handle_install(LifecyclePayload {
            public_key: Some("pk".to_owned()),
            ..install_payload("c1", "s1")
        })
        .await?;

    assert!(service.verify_signature("c1", "qsh", "pk:qsh").await?);
    assert!(!service.verify_signature("c1", "qsh", "s1:qsh").await?);
    Ok(())
}

#[tokio::test]
async fn forbidden_rotation_conflicts_only_on_changed_keys() -> AppResult<()> {
    let service =
        service_with(Arc::new(TestTenantRepo::default())).with_config(TenantRegistryConfig {
            rotation_policy: RotationPolicy::Forbid,
            ..TenantRegistryConfig::default()
        });

    service.handle_install(install_payload("c1", "s1")).await?;
    service
        .handle_install(LifecyclePayload {
            server_version: Some("200000".to_owned()),
            ..install_payload("c1", "s1")
        })
        .await?;

    assert!(matches!(
        service.handle_install(install_payload("c1", "s2")).await,
        Err(AppError::Conflict(_))
    ));
    assert_eq!(
        service
            .lookup("c1", false)
            .await?
            .shared_secret()
            .map(SharedSecret::expose),
        Some("s1")
    );

    service.handle_uninstall("c1").await?;
    let reinstalled = service.handle_install(install_payload("c1", "s3")).await?;
    assert_eq!(
        reinstalled.shared_secret().map(SharedSecret::expose),
        Some("s3")
    );
    Ok(())
}

#[tokio::test]
async fn invalid_install_is_rejected_before_storage() {
    let repo = Arc::new(TestTenantRepo::default());
    let service = service_with(repo.clone());

    let result = service
        .handle_install(LifecyclePayload {
            base_url: Some("not a url".to_owned()),
            ..install_payload("c1", "s1")
        })
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(repo.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn lifecycle_events_dispatch_by_event_type() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    service
        .handle_lifecycle_event(install_payload("c1", "s1"))
        .await?;
    let disabled = service
        .handle_lifecycle_event(event_payload("c1", "disabled"))
        .await?;
    assert_eq!(disabled.event_type(), LifecycleEvent::Disabled);

    let enabled = service
        .handle_lifecycle_event(event_payload("c1", "enabled"))
        .await?;
    assert_eq!(enabled.event_type(), LifecycleEvent::Enabled);

    let uninstalled = service
        .handle_lifecycle_event(event_payload("c1", "uninstalled"))
        .await?;
    assert!(uninstalled.is_uninstalled());

    assert!(matches!(
        service
            .handle_lifecycle_event(LifecyclePayload {
                event_type: None,
                ..install_payload("c1", "s1")
            })
            .await,
        Err(AppError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn listing_hides_uninstalled_tenants_by_default() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    service.handle_install(install_payload("c2", "s2")).await?;
    service.handle_install(install_payload("c1", "s1")).await?;
    service.handle_uninstall("c2").await?;

    let active = service.list_tenants(false).await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].client_key().as_str(), "c1");

    let all = service.list_tenants(true).await?;
    let keys: Vec<&str> = all.iter().map(|tenant| tenant.client_key().as_str()).collect();
    assert_eq!(keys, vec!["c1", "c2"]);
    Ok(())
}

#[tokio::test]
async fn slow_storage_surfaces_timeout() {
    let service = service_with(Arc::new(TestTenantRepo::slow(Duration::from_millis(250))))
        .with_config(TenantRegistryConfig {
            storage_timeout: Duration::from_millis(20),
            ..TenantRegistryConfig::default()
        });

    let result = service.handle_install(install_payload("c1", "s1")).await;
    assert!(matches!(result, Err(AppError::StorageTimeout(_))));
    assert!(
        result
            .err()
            .is_some_and(|error| error.is_transient())
    );

    assert!(matches!(
        service.lookup("c1", false).await,
        Err(AppError::StorageTimeout(_))
    ));
}

#[tokio::test]
async fn waiting_on_a_held_tenant_lock_times_out() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default())).with_config(
        TenantRegistryConfig {
            storage_timeout: Duration::from_millis(20),
            ..TenantRegistryConfig::default()
        },
    );
    service.handle_install(install_payload("c1", "s1")).await?;

    let lock = service.key_locks.handle(&ClientKey::new("c1")?)?;
    let held = lock.lock_owned().await;

    let result = service.handle_enable("c1").await;
    assert!(matches!(result, Err(AppError::StorageTimeout(_))));
    assert!(matches!(
        service.handle_install(install_payload("c1", "s2")).await,
        Err(AppError::StorageTimeout(_))
    ));

    drop(held);
    let tenant = service.handle_disable("c1").await?;
    assert!(!tenant.is_enabled());
    Ok(())
}

#[tokio::test]
async fn separate_registries_cannot_bypass_forbidden_rotation() -> AppResult<()> {
    let repo = Arc::new(TestTenantRepo::slow(Duration::from_millis(30)));
    let config = TenantRegistryConfig {
        rotation_policy: RotationPolicy::Forbid,
        ..TenantRegistryConfig::default()
    };
    let first = service_with(repo.clone()).with_config(config.clone());
    let second = service_with(repo.clone()).with_config(config);

    let (first_result, second_result) = tokio::join!(
        first.handle_install(install_payload("c1", "s1")),
        second.handle_install(install_payload("c1", "s2")),
    );

    let (winner, loser) = match (first_result, second_result) {
        (Ok(winner), loser @ Err(_)) | (loser @ Err(_), Ok(winner)) => (winner, loser),
        (first, second) => panic!("expected one install to conflict, got {first:?} and {second:?}"),
    };
    assert!(matches!(loser, Err(AppError::Conflict(_))));

    let stored = first.lookup("c1", false).await?;
    assert_eq!(stored, winner);
    assert_eq!(repo.saves.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn separate_registries_apply_racing_installs_in_order() -> AppResult<()> {
    let repo = Arc::new(TestTenantRepo::slow(Duration::from_millis(30)));
    let first = service_with(repo.clone());
    let second = service_with(repo.clone());

    let (first_tenant, second_tenant) = tokio::join!(
        first.handle_install(install_payload("c1", "s1")),
        second.handle_install(install_payload("c1", "s2")),
    );
    let (first_tenant, second_tenant) = (first_tenant?, second_tenant?);

    assert_eq!(first_tenant.id(), second_tenant.id());
    let last = if first_tenant.revision() > second_tenant.revision() {
        first_tenant
    } else {
        second_tenant
    };
    assert_eq!(last.revision(), 2);
    assert_eq!(second.lookup("c1", false).await?, last);
    assert_eq!(repo.saves.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rotations_never_mix_fields() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));
    service.handle_install(install_payload("c1", "secret-0")).await?;

    let mut writers = Vec::new();
    for index in 1..=48 {
        let service = service.clone();
        writers.push(tokio::spawn(async move {
            service
                .handle_install(LifecyclePayload {
                    base_url: Some(format!("https://host-{index}.example")),
                    server_version: Some(index.to_string()),
                    ..install_payload("c1", &format!("secret-{index}"))
                })
                .await
                .map(|_| ())
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..64 {
                let tenant = service.lookup("c1", false).await?;
                assert_consistent(&tenant);
                tokio::task::yield_now().await;
            }
            Ok::<(), AppError>(())
        }));
    }

    for handle in writers.into_iter().chain(readers) {
        handle
            .await
            .map_err(|error| AppError::Internal(format!("task failed: {error}")))??;
    }

    assert_consistent(&service.lookup("c1", false).await?);
    Ok(())
}

#[tokio::test]
async fn idle_key_locks_are_pruned() -> AppResult<()> {
    let service = service_with(Arc::new(TestTenantRepo::default()));

    for index in 0..10 {
        service
            .handle_install(install_payload(&format!("c{index}"), "s1"))
            .await?;
    }

    assert!(service.key_locks.len() <= 1);
    Ok(())
}

fn assert_consistent(tenant: &Tenant) {
    let Some(version) = tenant.server_version() else {
        panic!("server version missing");
    };
    let secret = tenant.shared_secret().map(SharedSecret::expose);

    if version == "100058" {
        assert_eq!(secret, Some("secret-0"));
        assert_eq!(tenant.base_url().as_str(), "https://a.example");
    } else {
        assert_eq!(secret, Some(format!("secret-{version}").as_str()));
        assert_eq!(
            tenant.base_url().as_str(),
            format!("https://host-{version}.example")
        );
    }
}
