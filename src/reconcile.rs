//! Seal-state reconciliation loop.
//!
//! The permanent steady state of the process: on a fixed interval, refresh
//! the replica view, wait out unassigned addresses, query every replica's
//! seal status, and run the unseal protocol against each one found sealed.
//! A replica whose status query fails, for any reason, is classified sealed:
//! a redundant unseal attempt is cheaper than silently skipping a sealed
//! replica.
//!
//! # Unseal Protocol
//!
//! Per sealed replica: probe the base address until it answers. A refused or
//! unroutable connection means the replica no longer exists at this address
//! (the pod moved); the replica is abandoned for this tick and an immediate
//! membership refresh picks up the new address for the next one. Any other
//! probe failure is waited out. Once the replica answers, exactly
//! `threshold` key shares are submitted in credential order, and a final
//! seal-status query confirms the result rather than trusting the last
//! submission's progress counter.
//!
//! Transient failures never stop the loop. The only errors that escape are
//! configuration defects and irrecoverable credential loss.

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::Result;
use crate::keeper::Keeper;

/// How an unseal attempt against one replica ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsealOutcome {
    /// The confirmatory status query reported the replica unsealed.
    Unsealed,
    /// All shares were submitted but the replica still reports sealed.
    StillSealed,
    /// The address refused connections; membership was refreshed and the
    /// replica abandoned for this tick.
    StaleAddress,
}

impl Keeper {
    /// Reconcile forever on the configured poll interval. Never returns under
    /// normal operation.
    pub async fn reconcile_forever(&mut self) -> Result<()> {
        info!(interval = ?self.config.poll_interval, "entering the reconciliation loop");
        loop {
            self.tick().await?;
            sleep(self.config.poll_interval).await;
        }
    }

    /// One reconciliation pass: refresh membership and unseal every replica
    /// that reports (or must be assumed) sealed.
    pub async fn tick(&mut self) -> Result<()> {
        self.membership.refresh().await;
        self.membership.await_addresses().await;

        // Snapshot: unseal attempts may refresh membership mid-pass, and the
        // rest of this pass keeps operating on the view it started with.
        let replicas: Vec<(String, String)> = self
            .membership
            .replicas()
            .iter()
            .map(|(name, address)| (name.clone(), address.clone()))
            .collect();

        for (name, address) in replicas {
            if !self.replica_sealed(&name, &address).await {
                continue;
            }
            match self.unseal_replica(&name, &address).await {
                Ok(UnsealOutcome::Unsealed) => {
                    info!(replica = %name, "replica unsealed");
                }
                Ok(UnsealOutcome::StillSealed) => {
                    warn!(replica = %name, "replica still sealed after submitting all shares");
                }
                Ok(UnsealOutcome::StaleAddress) => {
                    info!(replica = %name, %address,
                          "address is stale, replica deferred to the next tick");
                }
                Err(err) if err.is_transient() => {
                    warn!(replica = %name, error = %err,
                          "unseal attempt failed, retrying on the next tick");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Seal-status of one replica, conservatively classifying any query
    /// failure as sealed.
    async fn replica_sealed(&self, name: &str, address: &str) -> bool {
        match self.vault.seal_status(address).await {
            Ok(status) if status.sealed => {
                info!(replica = %name, "replica is sealed");
                true
            }
            Ok(_) => {
                info!(replica = %name, "replica is unsealed");
                false
            }
            Err(err) => {
                warn!(replica = %name, %address, error = %err,
                      "could not query seal status, treating the replica as sealed");
                true
            }
        }
    }

    /// Apply the unseal protocol to one replica. See the module docs.
    pub(crate) async fn unseal_replica(
        &mut self,
        name: &str,
        address: &str,
    ) -> Result<UnsealOutcome> {
        loop {
            match self.vault.probe(address).await {
                Ok(()) => break,
                Err(err) if err.is_connect_failure() => {
                    warn!(replica = %name, %address, error = %err,
                          "replica no longer answers at this address, refreshing membership");
                    self.membership.refresh().await;
                    return Ok(UnsealOutcome::StaleAddress);
                }
                Err(err) => {
                    warn!(replica = %name, %address, error = %err,
                          "replica not accepting connections yet, waiting");
                    sleep(self.config.wait_time).await;
                }
            }
        }

        let keys = self.credentials.get().await?;
        let threshold = self.config.secret_threshold as usize;
        for share in keys.keys.iter().take(threshold) {
            let status = self.vault.submit_unseal_share(address, share).await?;
            tracing::debug!(replica = %name, progress = status.progress, "submitted unseal share");
        }

        // Confirm instead of trusting the last submission's progress counter.
        match self.vault.seal_status(address).await {
            Ok(status) if !status.sealed => Ok(UnsealOutcome::Unsealed),
            Ok(_) => Ok(UnsealOutcome::StillSealed),
            Err(err) => {
                warn!(replica = %name, error = %err,
                      "could not confirm seal status after submitting shares");
                Ok(UnsealOutcome::StillSealed)
            }
        }
    }
}
