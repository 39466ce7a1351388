//! Verifies host-signed request tokens against tenant key material.
//!
//! Hosts sign each request with a compact JWT whose `qsh` claim is the
//! query string hash of the request. Shared secrets verify HS256 tokens and
//! public keys verify RS256 tokens.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tenantry_application::SignatureVerifier;
use tenantry_core::{AppError, AppResult};
use tenantry_domain::{ClientKey, VerificationKey};
use tracing::{debug, warn};

mod canonical_request;

pub use canonical_request::{canonical_request, query_string_hash};

const DEFAULT_LEEWAY_SECONDS: u64 = 60;
const PEM_LINE_LENGTH: usize = 64;

#[derive(Debug, Clone, Deserialize)]
struct HostRequestClaims {
    #[serde(default)]
    qsh: Option<String>,
}

/// JWT-based implementation of the signature verification port.
#[derive(Debug, Clone)]
pub struct JwtSignatureVerifier {
    leeway_seconds: u64,
}

impl JwtSignatureVerifier {
    /// Creates a verifier with the default clock-skew leeway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
        }
    }

    /// Overrides the accepted clock skew for `exp` checks.
    #[must_use]
    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    fn validation(&self, algorithm: Algorithm, client_key: &ClientKey) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_seconds;
        validation.validate_aud = false;
        validation.set_issuer(&[client_key.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation
    }
}

impl Default for JwtSignatureVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for JwtSignatureVerifier {
    fn verify(
        &self,
        client_key: &ClientKey,
        key: VerificationKey<'_>,
        request_digest: &str,
        signature: &str,
    ) -> AppResult<bool> {
        let (decoding_key, algorithm) = match key {
            VerificationKey::SharedSecret(secret) => (
                DecodingKey::from_secret(secret.expose().as_bytes()),
                Algorithm::HS256,
            ),
            VerificationKey::PublicKey(public_key) => match rsa_decoding_key(public_key) {
                Ok(decoding_key) => (decoding_key, Algorithm::RS256),
                Err(error) => {
                    warn!(client_key = %client_key, %error, "stored public key is unusable");
                    return Ok(false);
                }
            },
        };

        let validation = self.validation(algorithm, client_key);
        match decode::<HostRequestClaims>(signature, &decoding_key, &validation) {
            Ok(token) => Ok(token.claims.qsh.as_deref() == Some(request_digest)),
            Err(error) => {
                debug!(client_key = %client_key, %error, "host request token rejected");
                Ok(false)
            }
        }
    }
}

/// Accepts PEM or the bare base64 DER body hosts send in install payloads.
fn rsa_decoding_key(public_key: &str) -> AppResult<DecodingKey> {
    let trimmed = public_key.trim();
    let pem = if trimmed.starts_with("-----BEGIN") {
        trimmed.to_owned()
    } else {
        let body: String = trimmed.split_whitespace().collect();
        let lines: Vec<&str> = body
            .as_bytes()
            .chunks(PEM_LINE_LENGTH)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            lines.join("\n")
        )
    };

    DecodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|error| AppError::Validation(format!("invalid RSA public key: {error}")))
}
