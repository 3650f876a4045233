use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

use super::error::BridgeError;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters kept from the digest.
pub const DERIVED_SECRET_LEN: usize = 32;

/// Derives the secondary auth password for a host user.
///
/// The output is a pure function of the host user id and the deployment
/// secret. Rotating the deployment secret invalidates every derived value.
#[derive(Clone)]
pub struct CredentialDeriver {
    key: Secret<String>,
}

impl CredentialDeriver {
    pub fn new(key: Secret<String>) -> Self {
        Self { key }
    }

    pub fn derive(&self, host_user_id: &str) -> Result<Secret<String>, BridgeError> {
        if host_user_id.trim().is_empty() {
            return Err(BridgeError::InvalidInput(
                "host user id is required for credential derivation".to_string(),
            ));
        }

        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|e| BridgeError::Unexpected(format!("Invalid derivation key: {}", e)))?;
        mac.update(host_user_id.as_bytes());

        let mut digest = hex::encode(mac.finalize().into_bytes());
        digest.truncate(DERIVED_SECRET_LEN);
        Ok(Secret::new(digest))
    }
}
