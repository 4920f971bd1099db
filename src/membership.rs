//! Replica membership tracking.
//!
//! [`MembershipTracker`] maintains the live name-to-address view of the
//! server replicas. The view is recomputed wholesale on every refresh, never
//! diffed: a replica the platform stops reporting simply vanishes from the
//! map, and one whose pod moved gets its address overwritten. A stale address
//! therefore only survives until the next refresh, and unreachable-at-old-
//! address is handled by the caller forcing a refresh rather than by any
//! bookkeeping here.
//!
//! Addresses can be empty right after a pod starts, before the platform
//! assigns one. [`MembershipTracker::await_addresses`] waits those out with
//! no timeout; assignment is assumed to eventually happen or the replica
//! drops out of the next refresh.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::BootstrapConfig;
use crate::error::Result;
use crate::platform::Platform;
use crate::vault::VaultClient;

/// Live name-to-address view of the tracked replicas.
///
/// The map is ordered by name, which makes every iteration over it (probe
/// order, unseal order, primary selection) deterministic.
pub struct MembershipTracker {
    platform: Arc<dyn Platform>,
    label_selector: String,
    wait_time: std::time::Duration,
    replicas: BTreeMap<String, String>,
}

impl MembershipTracker {
    /// Tracker for replicas matching the configured label selector.
    pub fn new(platform: Arc<dyn Platform>, config: &BootstrapConfig) -> Self {
        Self {
            platform,
            label_selector: config.label_selector.clone(),
            wait_time: config.wait_time,
            replicas: BTreeMap::new(),
        }
    }

    /// Current replica view. Empty until the first successful refresh.
    pub fn replicas(&self) -> &BTreeMap<String, String> {
        &self.replicas
    }

    /// Replace the replica view with what the platform currently reports as
    /// Running.
    ///
    /// Never fatal: an empty listing is a valid (empty) view, and a failed
    /// platform call is logged and leaves the previous view in place.
    pub async fn refresh(&mut self) {
        match self.platform.list_replicas(&self.label_selector).await {
            Ok(listing) => {
                self.replicas = listing
                    .into_iter()
                    .map(|replica| (replica.name, replica.address))
                    .collect();
                debug!(replicas = ?self.replicas, "refreshed membership");
            }
            Err(err) => {
                warn!(error = %err, selector = %self.label_selector,
                      "could not list replicas, keeping previous view");
            }
        }
    }

    /// Block until every tracked replica has a non-empty address, refreshing
    /// in between. May wait indefinitely.
    pub async fn await_addresses(&mut self) {
        loop {
            let unassigned: Vec<&String> = self
                .replicas
                .iter()
                .filter(|(_, address)| address.is_empty())
                .map(|(name, _)| name)
                .collect();
            if unassigned.is_empty() {
                debug!("all tracked replicas have addresses");
                return;
            }
            warn!(replicas = ?unassigned, "replicas without an address, waiting");
            sleep(self.wait_time).await;
            self.refresh().await;
        }
    }

    /// Find the first replica answering a liveness probe, in name order.
    ///
    /// Probes every tracked replica once per pass and sleeps between passes;
    /// retries forever because bootstrap has nothing else to operate against.
    /// Returns the replica's `(name, address)`.
    pub async fn first_reachable(&self, vault: &VaultClient) -> Result<(String, String)> {
        info!("probing for the first reachable replica");
        loop {
            for (name, address) in &self.replicas {
                match vault.probe(address).await {
                    Ok(()) => {
                        info!(replica = %name, %address, "replica is reachable");
                        return Ok((name.clone(), address.clone()));
                    }
                    Err(err) => {
                        warn!(replica = %name, %address, error = %err,
                              "replica not accepting connections, trying the next one");
                    }
                }
            }
            debug!("no reachable replica in this pass, sleeping before the next");
            sleep(self.wait_time).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MockPlatform, Replica};
    use std::collections::BTreeMap as Map;
    use std::time::Duration;

    fn config() -> BootstrapConfig {
        let data = Map::from([
            ("vaultLabelSelector".to_string(), "app=vault".to_string()),
            ("ldapConfig".to_string(), "{}".to_string()),
            ("serviceWaitTimeInSeconds".to_string(), "1".to_string()),
        ]);
        BootstrapConfig::from_map(&data).unwrap()
    }

    #[tokio::test]
    async fn refresh_replaces_the_view_wholesale() {
        let platform = Arc::new(MockPlatform::new());
        platform.push_listing(vec![
            Replica::new("vault-0", "10.0.0.1"),
            Replica::new("vault-1", "10.0.0.2"),
        ]);
        platform.push_listing(vec![Replica::new("vault-2", "10.0.0.9")]);

        let mut tracker = MembershipTracker::new(platform, &config());
        tracker.refresh().await;
        assert_eq!(tracker.replicas().len(), 2);

        tracker.refresh().await;
        // vault-0 and vault-1 are gone, not merged in.
        assert_eq!(tracker.replicas().len(), 1);
        assert_eq!(tracker.replicas()["vault-2"], "10.0.0.9");
    }

    #[tokio::test]
    async fn empty_listing_yields_empty_view() {
        let platform = Arc::new(MockPlatform::new());
        platform.push_listing(vec![Replica::new("vault-0", "10.0.0.1")]);
        platform.push_listing(Vec::new());

        let mut tracker = MembershipTracker::new(platform, &config());
        tracker.refresh().await;
        tracker.refresh().await;
        assert!(tracker.replicas().is_empty());
    }

    #[tokio::test]
    async fn failed_listing_keeps_previous_view() {
        let platform = Arc::new(MockPlatform::new());
        platform.push_listing(vec![Replica::new("vault-0", "10.0.0.1")]);

        let mut tracker = MembershipTracker::new(platform.clone(), &config());
        tracker.refresh().await;
        assert_eq!(tracker.replicas().len(), 1);

        platform.fail_listings(true);
        tracker.refresh().await;
        assert_eq!(tracker.replicas()["vault-0"], "10.0.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn await_addresses_blocks_until_assignment() {
        let platform = Arc::new(MockPlatform::new());
        platform.push_listing(vec![Replica::new("vault-0", "")]);
        platform.push_listing(vec![Replica::new("vault-0", "")]);
        platform.push_listing(vec![Replica::new("vault-0", "10.0.0.7")]);

        let mut tracker = MembershipTracker::new(platform.clone(), &config());
        tracker.refresh().await;
        tracker.await_addresses().await;

        assert_eq!(tracker.replicas()["vault-0"], "10.0.0.7");
        // Initial refresh plus two re-listings from inside the wait.
        assert_eq!(platform.list_calls(), 3);
    }

    #[tokio::test]
    async fn await_addresses_returns_immediately_when_assigned() {
        let platform = Arc::new(MockPlatform::new());
        platform.push_listing(vec![
            Replica::new("vault-0", "10.0.0.1"),
            Replica::new("vault-1", "10.0.0.2"),
        ]);
        let mut tracker = MembershipTracker::new(platform.clone(), &config());
        tracker.refresh().await;
        tracker.await_addresses().await;
        assert_eq!(platform.list_calls(), 1);
    }
}
