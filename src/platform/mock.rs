//! In-memory mock platform for testing.
//!
//! Provides a scripted implementation of [`Platform`] so membership and
//! reconciliation behavior can be tested without a cluster. Replica listings
//! are a queue of snapshots: each `list_replicas` call consumes the next one,
//! and the final snapshot repeats forever. That makes "the address changed
//! between two refreshes" scenarios a one-liner to script.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{Platform, Replica};

#[derive(Default)]
struct MockState {
    listings: VecDeque<Vec<Replica>>,
    secrets: HashMap<String, Vec<u8>>,
    configs: HashMap<String, BTreeMap<String, String>>,
    fail_listings: bool,
    fail_secret_reads: bool,
    fail_secret_writes: bool,
}

/// Scripted in-memory [`Platform`].
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
    list_calls: AtomicUsize,
}

impl MockPlatform {
    /// Empty platform: no replicas, no secrets, no config maps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a replica snapshot. The last queued snapshot is sticky: once the
    /// queue is down to one entry, every further list call returns it again.
    pub fn push_listing(&self, replicas: Vec<Replica>) {
        self.state.lock().unwrap().listings.push_back(replicas);
    }

    /// Seed a secret object as if it had been written by a previous process.
    pub fn seed_secret(&self, name: &str, data: Vec<u8>) {
        self.state.lock().unwrap().secrets.insert(name.to_string(), data);
    }

    /// Seed a config map.
    pub fn seed_config(&self, name: &str, data: BTreeMap<String, String>) {
        self.state.lock().unwrap().configs.insert(name.to_string(), data);
    }

    /// Make subsequent `list_replicas` calls fail.
    pub fn fail_listings(&self, fail: bool) {
        self.state.lock().unwrap().fail_listings = fail;
    }

    /// Make subsequent secret reads fail.
    pub fn fail_secret_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_secret_reads = fail;
    }

    /// Make subsequent secret writes fail.
    pub fn fail_secret_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_secret_writes = fail;
    }

    /// Number of `list_replicas` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Stored bytes of a secret, if any.
    pub fn secret(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().secrets.get(name).cloned()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn list_replicas(&self, _label_selector: &str) -> Result<Vec<Replica>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.fail_listings {
            return Err(Error::Platform("scripted listing failure".to_string()));
        }
        match state.listings.len() {
            0 => Ok(Vec::new()),
            1 => Ok(state.listings.front().cloned().unwrap_or_default()),
            _ => Ok(state.listings.pop_front().unwrap_or_default()),
        }
    }

    async fn read_secret(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.lock().unwrap();
        if state.fail_secret_reads {
            return Err(Error::Platform("scripted secret read failure".to_string()));
        }
        Ok(state.secrets.get(name).cloned())
    }

    async fn write_secret(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_secret_writes {
            return Err(Error::Platform("scripted secret write failure".to_string()));
        }
        state.secrets.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_config(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let state = self.state.lock().unwrap();
        state
            .configs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Platform(format!("configmap {name} not found")))
    }
}
