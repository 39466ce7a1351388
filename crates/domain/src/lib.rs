//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod tenant;

pub use tenant::{
    AddonKey, BaseUrl, ClientKey, CredentialPrecedence, InstallRequest, LifecycleEvent,
    LifecyclePayload, OAuthClientToken, ProductType, SharedSecret, Tenant, TenantRecord,
    VerificationKey,
};
