//! One-time cluster bootstrap.
//!
//! Linear state machine executed once at process start, against a single
//! deterministically chosen primary replica:
//!
//! 1. **Discover**: refresh membership, wait for address assignment.
//! 2. **SelectPrimary**: first reachable replica in name order.
//! 3. **InitializeIfNeeded**: initialize the cluster unless a replica
//!    already reports it initialized; persist the issued credentials.
//! 4. **FirstUnseal**: unseal the primary with the fresh shares.
//! 5. **ConfigureAuthBackend**: enable and configure LDAP auth.
//! 6. **WritePolicies**: PUT every configured policy document.
//! 7. **BindPolicies**: bind policy sets to groups and users.
//! 8. **EnableSecretEngines**: mount every configured engine.
//!
//! # Fatal vs. Logged
//!
//! Failures that leave the cluster in an ambiguous or unrecoverable state
//! abort the process so an operator notices immediately: losing the freshly
//! issued credentials (step 3), a primary still sealed after the first
//! unseal (step 4), a half-configured auth backend (step 5), or missing
//! secret engines (step 8). A sealed primary in particular must abort here:
//! a sealed replica rejects every configuration call, so continuing would
//! produce a running but unconfigured cluster with nothing in the logs but
//! ignored status codes. Failures that redeploying the ConfigMap repairs are
//! logged and skipped: individual policy documents (step 6) and individual
//! policy bindings (step 7).
//!
//! An already-initialized cluster (any restart of this process) skips steps
//! 3–4; the auth, policy, and engine calls are idempotent against the server
//! and run again on every start.

use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::keeper::Keeper;
use crate::reconcile::UnsealOutcome;

impl Keeper {
    /// Run the bootstrap sequence. See the module docs.
    pub async fn bootstrap(&mut self) -> Result<()> {
        // Discover + SelectPrimary.
        self.membership.refresh().await;
        self.membership.await_addresses().await;
        let (primary, address) = self.membership.first_reachable(&self.vault).await?;
        info!(replica = %primary, %address, "selected bootstrap primary");

        // InitializeIfNeeded + FirstUnseal.
        if self.cluster_initialized(&address).await {
            info!(replica = %primary, "cluster already initialized, skipping initialization");
        } else {
            self.initialize_cluster(&primary, &address).await?;
            // The primary must come up unsealed before any configuration
            // call; a sealed replica rejects them all.
            match self.unseal_replica(&primary, &address).await? {
                UnsealOutcome::Unsealed => {}
                outcome => {
                    error!(replica = %primary, ?outcome,
                           "first unseal did not complete, aborting bootstrap");
                    return Err(Error::Unseal { replica: primary });
                }
            }
        }

        let token = self.credentials.get().await?.root_token;

        // ConfigureAuthBackend: half-enabled auth is not acceptable for
        // unattended startup, so both calls are fatal.
        self.vault
            .enable_auth_backend(&address, &token, &self.config.ldap_enable_payload)
            .await?;
        self.vault
            .configure_auth_backend(&address, &token, &self.config.ldap_config_payload)
            .await?;
        info!("ldap auth backend enabled and configured");

        self.write_policies(&address, &token).await;
        self.bind_policies(&address, &token).await;
        self.enable_secret_engines(&address, &token).await?;

        info!("bootstrap complete");
        Ok(())
    }

    /// Whether the cluster reports itself initialized.
    ///
    /// A failed status query counts as initialized: issuing a second
    /// initialize against a cluster that may already hold one is worse than
    /// deferring to the reconciliation loop.
    async fn cluster_initialized(&self, address: &str) -> bool {
        match self.vault.init_status(address).await {
            Ok(initialized) => initialized,
            Err(err) => {
                error!(%address, error = %err,
                       "could not query initialization status, assuming initialized");
                true
            }
        }
    }

    async fn initialize_cluster(&mut self, primary: &str, address: &str) -> Result<()> {
        info!(replica = %primary, shares = self.config.secret_shares,
              threshold = self.config.secret_threshold, "initializing the cluster");
        let keys = self
            .vault
            .initialize(
                address,
                self.config.secret_shares,
                self.config.secret_threshold,
            )
            .await?;
        // Persist before anything else; an unpersisted credential cannot
        // survive a restart, so continuing would be unsafe.
        self.credentials.put(keys).await?;
        Ok(())
    }

    async fn write_policies(&mut self, address: &str, token: &str) {
        for (name, document) in &self.config.policies {
            info!(policy = %name, "writing policy document");
            if let Err(err) = self.vault.write_policy(address, token, name, document).await {
                warn!(policy = %name, error = %err,
                      "could not write policy, continuing with the rest");
            }
        }
    }

    async fn bind_policies(&mut self, address: &str, token: &str) {
        let Some(bindings) = &self.config.policy_bindings else {
            info!("no policy mappings configured, skipping bindings");
            return;
        };
        let read_payload = bindings.policies.read_payload();
        let read_write_payload = bindings.policies.read_write_payload();

        for group in &bindings.groups.r_groups {
            if let Err(err) = self
                .vault
                .bind_group_policy(address, token, group, &read_payload)
                .await
            {
                warn!(group = %group, error = %err, "could not bind read policies to group");
            }
        }
        for group in &bindings.groups.rw_groups {
            if let Err(err) = self
                .vault
                .bind_group_policy(address, token, group, &read_write_payload)
                .await
            {
                warn!(group = %group, error = %err, "could not bind read-write policies to group");
            }
        }
        for user in &bindings.groups.r_users {
            if let Err(err) = self
                .vault
                .bind_user_policy(address, token, user, &read_payload)
                .await
            {
                warn!(user = %user, error = %err, "could not bind read policies to user");
            }
        }
        for user in &bindings.groups.rw_users {
            if let Err(err) = self
                .vault
                .bind_user_policy(address, token, user, &read_write_payload)
                .await
            {
                warn!(user = %user, error = %err, "could not bind read-write policies to user");
            }
        }
    }

    async fn enable_secret_engines(&mut self, address: &str, token: &str) -> Result<()> {
        for (path, payload) in &self.config.secret_engines {
            info!(mount = %path, "enabling secret engine");
            self.vault
                .enable_secret_engine(address, token, path, payload)
                .await?;
        }
        Ok(())
    }
}
