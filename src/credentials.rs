//! Durable initialization credentials.
//!
//! The initialize call is answered exactly once per cluster lifetime, so the
//! key shares and root token it returns must outlive this process. They are
//! written to a single platform secret object right after initialization and
//! read back from it on any later start of an already-initialized cluster.
//!
//! [`CredentialStore`] keeps the in-memory copy and rehydrates it lazily: a
//! `get` with no cached credential reads the secret object, and failing that
//! is irrecoverable, because no other source of the shares exists.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::platform::Platform;

/// Result of cluster initialization: ordered key shares and the root token.
///
/// Serialized shape matches the `/v1/sys/init` response,
/// `{"keys":[...],"keys_base64":[...],"root_token":"..."}`, and is stored
/// verbatim in the secret object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitKeys {
    /// Hex-encoded key shares, in submission order.
    pub keys: Vec<String>,
    /// The same shares, base64-encoded.
    #[serde(default)]
    pub keys_base64: Vec<String>,
    /// Root token for configuration calls.
    pub root_token: String,
}

/// In-memory credential cache backed by one durable secret object.
pub struct CredentialStore {
    platform: Arc<dyn Platform>,
    secret_name: String,
    cached: Option<InitKeys>,
}

impl CredentialStore {
    /// Store reading and writing the named secret object.
    pub fn new(platform: Arc<dyn Platform>, secret_name: impl Into<String>) -> Self {
        Self {
            platform,
            secret_name: secret_name.into(),
            cached: None,
        }
    }

    /// Whether a credential is already cached in memory.
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// Return the credential, rehydrating from the secret object when the
    /// in-memory copy is absent (the process restarted after initializing).
    ///
    /// # Errors
    ///
    /// [`Error::Credentials`] when nothing is cached and the secret object is
    /// missing, unreadable, or does not deserialize. That error is
    /// irrecoverable: without the shares the process cannot unseal anything.
    pub async fn get(&mut self) -> Result<InitKeys> {
        if let Some(keys) = &self.cached {
            return Ok(keys.clone());
        }

        let bytes = self
            .platform
            .read_secret(&self.secret_name)
            .await
            .map_err(|err| {
                Error::Credentials(format!("reading secret {}: {err}", self.secret_name))
            })?
            .ok_or_else(|| {
                Error::Credentials(format!("secret {} does not exist", self.secret_name))
            })?;
        let keys: InitKeys = serde_json::from_slice(&bytes).map_err(|err| {
            Error::Credentials(format!(
                "secret {} does not deserialize: {err}",
                self.secret_name
            ))
        })?;
        info!(secret = %self.secret_name, shares = keys.keys.len(),
              "rehydrated initialization credentials");
        self.cached = Some(keys.clone());
        Ok(keys)
    }

    /// Persist a freshly issued credential to the secret object and cache it.
    ///
    /// Write failures are returned, not swallowed; the bootstrap coordinator
    /// aborts on them because an unpersisted credential cannot survive a
    /// restart.
    pub async fn put(&mut self, keys: InitKeys) -> Result<()> {
        let bytes = serde_json::to_vec(&keys)
            .map_err(|err| Error::Credentials(format!("serializing credentials: {err}")))?;
        self.platform
            .write_secret(&self.secret_name, &bytes)
            .await
            .map_err(|err| {
                Error::Credentials(format!("writing secret {}: {err}", self.secret_name))
            })?;
        self.cached = Some(keys);
        Ok(())
    }
}
