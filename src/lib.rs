//! # sealkeeper
//!
//! Keeps a clustered secret-management service (a Vault-style cluster running
//! as pods in Kubernetes) continuously available despite pod churn: a
//! one-time cluster bootstrap, then a forever reconciliation loop that
//! unseals every replica found sealed.
//!
//! # What it does
//!
//! On startup, sealkeeper discovers the server replicas by label selector and
//! picks the first reachable one. Exactly once per cluster lifetime it
//! initializes that replica, persists the issued key shares and root token to
//! a Kubernetes Secret, and performs the first unseal. Every start then
//! enables and configures LDAP auth, writes ACL policies, binds them to
//! groups and users, and mounts the configured secret engines.
//!
//! From then on it reconciles: every few seconds it re-lists the replicas and
//! submits the stored key shares to any replica that reports itself sealed,
//! so restarted or newly scheduled pods rejoin the cluster without operator
//! intervention. The process keeps no durable state of its own; after a
//! restart it rehydrates the credentials from the Secret and carries on.
//!
//! # Architecture
//!
//! ```text
//!        ┌──────────────┐  list pods / read+write Secret
//!        │  Kubernetes  │◄──────────────┐
//!        └──────────────┘               │
//!                                 ┌─────┴─────┐
//!                                 │  Keeper   │  bootstrap once,
//!                                 │  (engine) │  then reconcile forever
//!                                 └─────┬─────┘
//!              HEAD / sys/init / seal-status / unseal / auth / policy
//!              ┌────────────────────────┼────────────────────────┐
//!              ▼                        ▼                        ▼
//!        ┌──────────┐            ┌──────────┐             ┌──────────┐
//!        │ vault-0  │            │ vault-1  │             │ vault-2  │
//!        └──────────┘            └──────────┘             └──────────┘
//! ```
//!
//! The engine state lives in [`keeper::Keeper`]; membership tracking,
//! credential storage, the bootstrap sequence, and the reconciliation loop
//! are documented in their modules. The platform is reached through the
//! [`platform::Platform`] trait, with a scripted [`platform::MockPlatform`]
//! for tests.

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod keeper;
pub mod membership;
pub mod platform;
pub mod reconcile;
pub mod telemetry;
pub mod vault;
