//! Scope-keyed wrappers that seal audit payloads.
//!
//! The repository only needs `KeyProvider::get_wrapper`. `HmacKeyProvider`
//! is the in-process implementation: it derives one HMAC-SHA256 key per
//! scope from a root secret and appends an authentication tag to each
//! payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const TAG_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyProviderError {
    /// No key material is available for the scope.
    UnknownScope(String),
    /// Key material was rejected by the MAC implementation.
    InvalidKey,
    /// Sealed bytes are truncated or fail authentication.
    Tampered,
}

impl Display for KeyProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownScope(scope_id) => write!(f, "no audit key for scope {scope_id}"),
            Self::InvalidKey => write!(f, "audit key material is invalid"),
            Self::Tampered => write!(f, "sealed audit payload failed verification"),
        }
    }
}

impl Error for KeyProviderError {}

/// Seals audit payloads for one scope.
pub trait Wrapper: Send + Sync {
    /// Stable identifier of the key, stored next to every sealed payload.
    fn key_id(&self) -> &str;
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyProviderError>;
    /// Verifies `sealed` and returns the original plaintext.
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, KeyProviderError>;
}

/// Supplies the audit wrapper for a scope.
pub trait KeyProvider: Send + Sync {
    fn get_wrapper(&self, scope_id: &str) -> Result<Arc<dyn Wrapper>, KeyProviderError>;
}

/// Derives per-scope HMAC keys from a root secret.
pub struct HmacKeyProvider {
    root_key: Vec<u8>,
    revoked_scopes: BTreeSet<String>,
}

impl HmacKeyProvider {
    pub fn new(root_key: impl Into<Vec<u8>>) -> Result<Self, KeyProviderError> {
        let root_key = root_key.into();
        if root_key.is_empty() {
            return Err(KeyProviderError::InvalidKey);
        }
        Ok(Self {
            root_key,
            revoked_scopes: BTreeSet::new(),
        })
    }

    /// Stops issuing wrappers for `scope_id`.
    pub fn revoke_scope(&mut self, scope_id: impl Into<String>) {
        self.revoked_scopes.insert(scope_id.into());
    }
}

impl KeyProvider for HmacKeyProvider {
    fn get_wrapper(&self, scope_id: &str) -> Result<Arc<dyn Wrapper>, KeyProviderError> {
        if scope_id.is_empty() || self.revoked_scopes.contains(scope_id) {
            return Err(KeyProviderError::UnknownScope(scope_id.to_string()));
        }

        let mut mac = HmacSha256::new_from_slice(&self.root_key)
            .map_err(|_| KeyProviderError::InvalidKey)?;
        mac.update(b"audit-scope:");
        mac.update(scope_id.as_bytes());
        let scope_key = mac.finalize().into_bytes().to_vec();
        let fingerprint: String = scope_key[..4]
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();

        Ok(Arc::new(HmacWrapper {
            key_id: format!("hmac-sha256:{scope_id}:{fingerprint}"),
            key: scope_key,
        }))
    }
}

struct HmacWrapper {
    key_id: String,
    key: Vec<u8>,
}

impl HmacWrapper {
    fn mac(&self) -> Result<HmacSha256, KeyProviderError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| KeyProviderError::InvalidKey)
    }
}

impl Wrapper for HmacWrapper {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        let mut mac = self.mac()?;
        mac.update(plaintext);
        let tag = mac.finalize().into_bytes();

        let mut sealed = Vec::with_capacity(plaintext.len() + TAG_LEN);
        sealed.extend_from_slice(plaintext);
        sealed.extend_from_slice(&tag);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, KeyProviderError> {
        if sealed.len() < TAG_LEN {
            return Err(KeyProviderError::Tampered);
        }
        let (plaintext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let mut mac = self.mac()?;
        mac.update(plaintext);
        mac.verify_slice(tag)
            .map_err(|_| KeyProviderError::Tampered)?;
        Ok(plaintext.to_vec())
    }
}
