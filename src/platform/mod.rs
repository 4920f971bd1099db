//! Orchestration-platform access.
//!
//! The [`Platform`] trait abstracts the four control-plane primitives
//! sealkeeper needs, allowing:
//!
//! - Different backend implementations (Kubernetes, in-memory for testing)
//! - Deterministic tests with a scripted [`MockPlatform`]
//! - A clear seam between reconciliation logic and cluster plumbing
//!
//! # Available Implementations
//!
//! - [`KubePlatform`]: production Kubernetes backend (default)
//! - [`MockPlatform`]: in-memory mock for tests

mod kube;
mod mock;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

pub use self::kube::KubePlatform;
pub use self::mock::MockPlatform;

/// One discovered server replica.
///
/// The address may be empty while the platform has not assigned one yet;
/// membership tracking waits those out before operating on the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replica {
    /// Unique name, stable for the replica's lifetime.
    pub name: String,
    /// Network address without port, possibly empty.
    pub address: String,
}

impl Replica {
    /// Convenience constructor, mostly for tests.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Control-plane primitives provided by the orchestration platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// List replicas matching `label_selector` that are in the Running phase.
    /// Replicas without an assigned address are included with an empty one.
    async fn list_replicas(&self, label_selector: &str) -> Result<Vec<Replica>>;

    /// Read the credential field of the named secret object.
    /// `Ok(None)` means the object (or its field) does not exist.
    async fn read_secret(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Create the named secret object with the given credential bytes.
    async fn write_secret(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read the data of the named configuration object.
    async fn read_config(&self, name: &str) -> Result<BTreeMap<String, String>>;
}
