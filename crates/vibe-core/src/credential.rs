//! API credential for the description backend.
//!
//! An explicitly configured value wins; otherwise the key saved in the
//! store is used. The secret never appears in `Debug` output or logs.

use std::fmt;

use crate::store::{KeyValueStore, StoreError};

pub const API_KEY_STORE_KEY: &str = "apiKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Store,
}

#[derive(Clone)]
pub struct ApiCredential {
    secret: String,
    source: CredentialSource,
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("secret", &self.masked())
            .field("source", &self.source)
            .finish()
    }
}

impl ApiCredential {
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Last four characters only, for status output.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("****{tail}")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve the credential from a configured value, then the store.
pub fn resolve_credential<S: KeyValueStore + ?Sized>(
    configured: Option<String>,
    store: &S,
) -> Option<ApiCredential> {
    if let Some(secret) = non_blank(configured) {
        return Some(ApiCredential {
            secret,
            source: CredentialSource::Config,
        });
    }

    let stored = match store.get(API_KEY_STORE_KEY) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "could not read stored API key");
            None
        }
    };
    non_blank(stored).map(|secret| ApiCredential {
        secret,
        source: CredentialSource::Store,
    })
}

pub fn save_credential<S: KeyValueStore + ?Sized>(store: &mut S, secret: &str) -> Result<(), StoreError> {
    store.set(API_KEY_STORE_KEY, secret.trim())
}

pub fn clear_credential<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<(), StoreError> {
    store.remove(API_KEY_STORE_KEY)
}
