//! The reconciliation engine instance.
//!
//! [`Keeper`] owns every piece of process-wide mutable state: the replica
//! view, the credential cache, the HTTP client, and the immutable bootstrap
//! configuration. All of it lives in one struct passed explicitly to the
//! bootstrap and reconciliation code, so tests can construct isolated
//! instances instead of fighting global state.
//!
//! Lifecycle: [`Keeper::run`] executes the one-time bootstrap sequence (see
//! [`crate::bootstrap`]) and then hands over to the seal reconciliation loop
//! (see [`crate::reconcile`]) for the rest of the process lifetime. Both run
//! on the single calling task; nothing here needs locking.

use std::sync::Arc;

use crate::config::BootstrapConfig;
use crate::constants::KEYS_SECRET_NAME;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::membership::MembershipTracker;
use crate::platform::Platform;
use crate::vault::VaultClient;

/// Bootstrap-and-reconcile engine. See the module docs.
pub struct Keeper {
    pub(crate) config: BootstrapConfig,
    pub(crate) vault: VaultClient,
    pub(crate) membership: MembershipTracker,
    pub(crate) credentials: CredentialStore,
}

impl Keeper {
    /// Engine talking to replicas on the standard API port.
    pub fn new(config: BootstrapConfig, platform: Arc<dyn Platform>) -> Self {
        let vault = VaultClient::new(config.wait_time);
        Self::with_vault_client(config, platform, vault)
    }

    /// Engine with an injected HTTP client. Tests use this to point at stub
    /// replicas on an ephemeral port.
    pub fn with_vault_client(
        config: BootstrapConfig,
        platform: Arc<dyn Platform>,
        vault: VaultClient,
    ) -> Self {
        let membership = MembershipTracker::new(platform.clone(), &config);
        let credentials = CredentialStore::new(platform, KEYS_SECRET_NAME);
        Self {
            config,
            vault,
            membership,
            credentials,
        }
    }

    /// Current replica view, for inspection in tests and logs.
    pub fn replicas(&self) -> &std::collections::BTreeMap<String, String> {
        self.membership.replicas()
    }

    /// Run the engine: bootstrap once, then reconcile forever.
    ///
    /// Only returns on error; every returned error is fatal by construction
    /// (transient failures are absorbed inside the loop). The caller decides
    /// process exit, typically racing this future against a shutdown signal.
    pub async fn run(&mut self) -> Result<()> {
        self.bootstrap().await?;
        self.reconcile_forever().await
    }
}
