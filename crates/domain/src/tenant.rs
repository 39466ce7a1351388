//! Tenant installation records and their credential material.

use std::fmt::{Debug, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tenantry_core::{AppError, AppResult, NonEmptyString, TenantId};
use url::Url;

mod install;
mod lifecycle;

pub use install::{InstallRequest, LifecyclePayload};
pub use lifecycle::LifecycleEvent;

const MAX_KEY_LENGTH: usize = 255;

/// Unique identifier of an installing host. Primary key of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(NonEmptyString);

impl ClientKey {
    /// Creates a validated client key.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        if value.len() > MAX_KEY_LENGTH {
            return Err(AppError::Validation(format!(
                "client key must not exceed {MAX_KEY_LENGTH} characters"
            )));
        }

        NonEmptyString::new(value)
            .map(Self)
            .map_err(|_| AppError::Validation("client key must not be empty".to_owned()))
    }

    /// Returns the client key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Key of the add-on descriptor the tenant installed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddonKey(NonEmptyString);

impl AddonKey {
    /// Creates a validated add-on key.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        if value.len() > MAX_KEY_LENGTH {
            return Err(AppError::Validation(format!(
                "add-on key must not exceed {MAX_KEY_LENGTH} characters"
            )));
        }

        NonEmptyString::new(value)
            .map(Self)
            .map_err(|_| AppError::Validation("add-on key must not be empty".to_owned()))
    }

    /// Returns the add-on key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Absolute `http`/`https` address of the installing host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Creates a validated base URL. The original spelling is preserved.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(AppError::Validation(
                "base url must not be empty".to_owned(),
            ));
        }

        let parsed = Url::parse(value.as_str())
            .map_err(|error| AppError::Validation(format!("base url is malformed: {error}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "base url scheme must be http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(AppError::Validation(
                "base url must include a host".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the base URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Host product family that installed the add-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProductType {
    /// Jira family products.
    #[default]
    Jira,
    /// Confluence.
    Confluence,
}

impl ProductType {
    /// Returns the storage string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::Confluence => "confluence",
        }
    }
}

impl FromStr for ProductType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jira" => Ok(Self::Jira),
            "confluence" => Ok(Self::Confluence),
            _ => Err(AppError::Validation(format!(
                "unknown product type '{value}'"
            ))),
        }
    }
}

/// Symmetric secret shared with the host at install time.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wraps a non-blank shared secret.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "shared secret must not be empty".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the raw secret for signing or encryption.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl Debug for SharedSecret {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("SharedSecret(<redacted>)")
    }
}

/// Opaque token for the secondary OAuth client auth mode.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientToken(String);

impl OAuthClientToken {
    /// Wraps a non-blank OAuth client token.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "oauth client token must not be empty".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl Debug for OAuthClientToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("OAuthClientToken(<redacted>)")
    }
}

/// Which key material wins when a tenant stores both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPrecedence {
    /// Verify with the shared secret, fall back to the public key.
    #[default]
    SharedSecretFirst,
    /// Verify with the public key, fall back to the shared secret.
    PublicKeyFirst,
}

impl CredentialPrecedence {
    /// Returns the configuration string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SharedSecretFirst => "shared_secret",
            Self::PublicKeyFirst => "public_key",
        }
    }
}

impl FromStr for CredentialPrecedence {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "shared_secret" => Ok(Self::SharedSecretFirst),
            "public_key" => Ok(Self::PublicKeyFirst),
            _ => Err(AppError::Validation(format!(
                "unknown credential precedence '{value}'"
            ))),
        }
    }
}

/// Key material selected for a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKey<'a> {
    /// Symmetric verification with the shared secret.
    SharedSecret(&'a SharedSecret),
    /// Asymmetric verification with the host public key.
    PublicKey(&'a str),
}

/// One installed instance of the host product tied to the add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    id: TenantId,
    addon_key: AddonKey,
    client_key: ClientKey,
    public_key: Option<String>,
    shared_secret: Option<SharedSecret>,
    base_url: BaseUrl,
    product_type: ProductType,
    server_version: Option<String>,
    plugin_version: Option<String>,
    description: Option<String>,
    oauth_client_token: Option<OAuthClientToken>,
    event_type: LifecycleEvent,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    uninstalled_at: Option<DateTime<Utc>>,
    revision: u64,
}

/// Flat persistence shape of a tenant, used by storage adapters.
///
/// Holds raw credential strings; keep it out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantRecord {
    /// Surrogate record identifier.
    pub id: TenantId,
    /// Add-on descriptor key.
    pub addon_key: String,
    /// Installing host identifier.
    pub client_key: String,
    /// Host public key, if any.
    pub public_key: Option<String>,
    /// Shared secret, if any.
    pub shared_secret: Option<String>,
    /// Host base URL.
    pub base_url: String,
    /// Product type storage string.
    pub product_type: String,
    /// Host server version.
    pub server_version: Option<String>,
    /// Host plugin system version.
    pub plugin_version: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// OAuth client token, if any.
    pub oauth_client_token: Option<String>,
    /// Last applied lifecycle event storage string.
    pub event_type: String,
    /// Enabled sub-state flag.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp.
    pub uninstalled_at: Option<DateTime<Utc>>,
    /// Write counter, starting at 1 for a freshly created record.
    pub revision: u64,
}

impl Tenant {
    /// Rebuilds a tenant from its persisted shape, re-checking invariants.
    pub fn from_record(record: TenantRecord) -> AppResult<Self> {
        let shared_secret = non_blank(record.shared_secret)
            .map(SharedSecret::new)
            .transpose()?;
        let public_key = non_blank(record.public_key);
        if shared_secret.is_none() && public_key.is_none() {
            return Err(AppError::Internal(format!(
                "stored tenant '{}' has no credential material",
                record.client_key
            )));
        }

        if record.revision == 0 {
            return Err(AppError::Internal(format!(
                "stored tenant '{}' has no revision",
                record.client_key
            )));
        }

        let event_type = LifecycleEvent::from_str(record.event_type.as_str())?;
        if (event_type == LifecycleEvent::Uninstalled) != record.uninstalled_at.is_some() {
            return Err(AppError::Internal(format!(
                "stored tenant '{}' has inconsistent soft-delete state",
                record.client_key
            )));
        }

        Ok(Self {
            id: record.id,
            addon_key: AddonKey::new(record.addon_key)?,
            client_key: ClientKey::new(record.client_key)?,
            public_key,
            shared_secret,
            base_url: BaseUrl::new(record.base_url)?,
            product_type: ProductType::from_str(record.product_type.as_str())?,
            server_version: non_blank(record.server_version),
            plugin_version: non_blank(record.plugin_version),
            description: non_blank(record.description),
            oauth_client_token: non_blank(record.oauth_client_token)
                .map(OAuthClientToken::new)
                .transpose()?,
            event_type,
            enabled: record.enabled,
            created_at: record.created_at,
            updated_at: record.updated_at,
            uninstalled_at: record.uninstalled_at,
            revision: record.revision,
        })
    }

    /// Flattens the tenant into its persisted shape.
    #[must_use]
    pub fn to_record(&self) -> TenantRecord {
        TenantRecord {
            id: self.id,
            addon_key: self.addon_key.as_str().to_owned(),
            client_key: self.client_key.as_str().to_owned(),
            public_key: self.public_key.clone(),
            shared_secret: self
                .shared_secret
                .as_ref()
                .map(|secret| secret.expose().to_owned()),
            base_url: self.base_url.as_str().to_owned(),
            product_type: self.product_type.as_str().to_owned(),
            server_version: self.server_version.clone(),
            plugin_version: self.plugin_version.clone(),
            description: self.description.clone(),
            oauth_client_token: self
                .oauth_client_token
                .as_ref()
                .map(|token| token.expose().to_owned()),
            event_type: self.event_type.as_str().to_owned(),
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
            uninstalled_at: self.uninstalled_at,
            revision: self.revision,
        }
    }

    /// Returns the surrogate record identifier.
    #[must_use]
    pub fn id(&self) -> TenantId {
        self.id
    }

    /// Returns the add-on descriptor key.
    #[must_use]
    pub fn addon_key(&self) -> &AddonKey {
        &self.addon_key
    }

    /// Returns the installing host identifier.
    #[must_use]
    pub fn client_key(&self) -> &ClientKey {
        &self.client_key
    }

    /// Returns the host public key.
    #[must_use]
    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    /// Returns the shared secret.
    #[must_use]
    pub fn shared_secret(&self) -> Option<&SharedSecret> {
        self.shared_secret.as_ref()
    }

    /// Returns the host base URL.
    #[must_use]
    pub fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// Returns the host product family.
    #[must_use]
    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    /// Returns the host server version.
    #[must_use]
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Returns the host plugin system version.
    #[must_use]
    pub fn plugin_version(&self) -> Option<&str> {
        self.plugin_version.as_deref()
    }

    /// Returns the free-text description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the OAuth client token.
    #[must_use]
    pub fn oauth_client_token(&self) -> Option<&OAuthClientToken> {
        self.oauth_client_token.as_ref()
    }

    /// Returns the last applied lifecycle event.
    #[must_use]
    pub fn event_type(&self) -> LifecycleEvent {
        self.event_type
    }

    /// Returns whether the installed tenant is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether the tenant is soft-deleted.
    #[must_use]
    pub fn is_uninstalled(&self) -> bool {
        self.uninstalled_at.is_some()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last mutation timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when the tenant was uninstalled, if it was.
    #[must_use]
    pub fn uninstalled_at(&self) -> Option<DateTime<Utc>> {
        self.uninstalled_at
    }

    /// Returns the write counter of this snapshot.
    ///
    /// Every applied transition bumps it by one, so storage can reject a
    /// write computed from a stale snapshot.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns whether this snapshot may replace `stored`, the record currently
    /// held for the same client key.
    #[must_use]
    pub fn follows(&self, stored: Option<&Tenant>) -> bool {
        match stored {
            None => self.revision == 1,
            Some(stored) => stored.revision.checked_add(1) == Some(self.revision),
        }
    }

    /// Selects the key material for a signature check.
    pub fn verification_key(
        &self,
        precedence: CredentialPrecedence,
    ) -> AppResult<VerificationKey<'_>> {
        let shared = self.shared_secret.as_ref().map(VerificationKey::SharedSecret);
        let public = self.public_key.as_deref().map(VerificationKey::PublicKey);

        let selected = match precedence {
            CredentialPrecedence::SharedSecretFirst => shared.or(public),
            CredentialPrecedence::PublicKeyFirst => public.or(shared),
        };

        selected.ok_or_else(|| {
            AppError::CredentialMissing(format!(
                "tenant '{}' has no stored key material",
                self.client_key
            ))
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
