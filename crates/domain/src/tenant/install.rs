use std::fmt::{Debug, Formatter};
use std::str::FromStr;

use serde::Deserialize;
use tenantry_core::{AppError, AppResult};

use super::{
    AddonKey, BaseUrl, ClientKey, LifecycleEvent, OAuthClientToken, ProductType, SharedSecret,
    non_blank,
};

/// Lifecycle webhook body as sent by the installing host.
///
/// Every field is optional on the wire; [`InstallRequest::try_from`] decides
/// what is required for an install.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePayload {
    /// Add-on descriptor key.
    #[serde(default, rename = "key")]
    pub addon_key: Option<String>,
    /// Installing host identifier.
    #[serde(default)]
    pub client_key: Option<String>,
    /// Host public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Shared secret issued for this installation.
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Host server version.
    #[serde(default)]
    pub server_version: Option<String>,
    /// Host plugin system version.
    #[serde(default, rename = "pluginsVersion")]
    pub plugin_version: Option<String>,
    /// Host base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Host product family.
    #[serde(default)]
    pub product_type: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Lifecycle event name.
    #[serde(default)]
    pub event_type: Option<String>,
    /// OAuth client token.
    #[serde(default, rename = "oauthClientId")]
    pub oauth_client_token: Option<String>,
}

impl LifecyclePayload {
    /// Parses the lifecycle event named by the payload, if any.
    pub fn event(&self) -> AppResult<Option<LifecycleEvent>> {
        non_blank(self.event_type.clone())
            .map(|value| LifecycleEvent::from_str(value.as_str()))
            .transpose()
    }

    /// Returns the validated client key carried by the payload.
    pub fn client_key(&self) -> AppResult<ClientKey> {
        ClientKey::new(self.client_key.clone().unwrap_or_default())
    }
}

impl Debug for LifecyclePayload {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LifecyclePayload")
            .field("addon_key", &self.addon_key)
            .field("client_key", &self.client_key)
            .field("public_key", &self.public_key.as_ref().map(|_| "<present>"))
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("base_url", &self.base_url)
            .field("product_type", &self.product_type)
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

/// Validated install event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub(super) addon_key: AddonKey,
    pub(super) client_key: ClientKey,
    pub(super) public_key: Option<String>,
    pub(super) shared_secret: Option<SharedSecret>,
    pub(super) base_url: BaseUrl,
    pub(super) product_type: ProductType,
    pub(super) server_version: Option<String>,
    pub(super) plugin_version: Option<String>,
    pub(super) description: Option<String>,
    pub(super) oauth_client_token: Option<OAuthClientToken>,
}

impl InstallRequest {
    /// Returns the installing host identifier.
    #[must_use]
    pub fn client_key(&self) -> &ClientKey {
        &self.client_key
    }

    /// Returns the add-on descriptor key.
    #[must_use]
    pub fn addon_key(&self) -> &AddonKey {
        &self.addon_key
    }

    /// Returns the host product family.
    #[must_use]
    pub fn product_type(&self) -> ProductType {
        self.product_type
    }
}

impl TryFrom<LifecyclePayload> for InstallRequest {
    type Error = AppError;

    fn try_from(payload: LifecyclePayload) -> Result<Self, Self::Error> {
        if let Some(event) = payload.event()?
            && event != LifecycleEvent::Installed
        {
            return Err(AppError::Validation(format!(
                "install payload must carry event type 'installed', got '{}'",
                event.as_str()
            )));
        }

        let client_key = ClientKey::new(payload.client_key.unwrap_or_default())?;
        let addon_key = AddonKey::new(payload.addon_key.unwrap_or_default())?;
        let base_url = BaseUrl::new(payload.base_url.unwrap_or_default())?;

        let shared_secret = non_blank(payload.shared_secret)
            .map(SharedSecret::new)
            .transpose()?;
        let public_key = non_blank(payload.public_key).map(|value| value.trim().to_owned());
        if shared_secret.is_none() && public_key.is_none() {
            return Err(AppError::Validation(format!(
                "install for client '{client_key}' must carry a shared secret or a public key"
            )));
        }

        let product_type = non_blank(payload.product_type)
            .map(|value| ProductType::from_str(value.as_str()))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            addon_key,
            client_key,
            public_key,
            shared_secret,
            base_url,
            product_type,
            server_version: non_blank(payload.server_version),
            plugin_version: non_blank(payload.plugin_version),
            description: non_blank(payload.description),
            oauth_client_token: non_blank(payload.oauth_client_token)
                .map(OAuthClientToken::new)
                .transpose()?,
        })
    }
}
