//! Centralized defaults and protocol constants.
//!
//! This module consolidates the magic numbers and fixed names used throughout
//! sealkeeper. Having them in one place makes it easier to:
//!
//! - Understand the bootstrap protocol constraints
//! - Update values consistently
//! - Document the rationale for each constant
//!
//! # Categories
//!
//! - **Vault API Constants**: port and header names of the cluster HTTP API
//! - **Initialization Defaults**: Shamir share parameters
//! - **Timing Defaults**: probe and reconciliation intervals
//! - **Platform Object Names**: the durable Secret and ConfigMap keys

// =============================================================================
// Vault API Constants
// =============================================================================

/// TCP port every Vault replica listens on. Replica addresses discovered from
/// the platform carry no port; the client appends this one.
pub const VAULT_API_PORT: u16 = 8200;

/// Header carrying the root token on configuration calls.
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

// =============================================================================
// Initialization Defaults
// =============================================================================

/// Number of Shamir key shares requested from `/v1/sys/init` when the
/// ConfigMap does not specify `secretShares`.
pub const DEFAULT_SECRET_SHARES: u32 = 5;

/// Number of shares required to unseal when the ConfigMap does not specify
/// `secretThreshold`. Must never exceed the share count.
pub const DEFAULT_SECRET_THRESHOLD: u32 = 3;

// =============================================================================
// Timing Defaults
// =============================================================================

/// Seconds to wait between liveness-probe attempts, and the per-attempt probe
/// timeout, when `serviceWaitTimeInSeconds` is absent.
pub const DEFAULT_WAIT_TIME_SECS: u64 = 3;

/// Seconds between reconciliation ticks when `pollIntervalSeconds` is absent.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

// =============================================================================
// Platform Object Names
// =============================================================================

/// Name of the Kubernetes Secret holding the serialized initialization
/// credentials. This object is the only durable copy of the key shares.
pub const KEYS_SECRET_NAME: &str = "vault-init-keys";

/// Field inside [`KEYS_SECRET_NAME`] holding the JSON-serialized credentials.
pub const KEYS_SECRET_FIELD: &str = "init-keys";

/// Environment variable naming the ConfigMap with the bootstrap settings.
pub const INIT_CONFIG_MAP_ENV: &str = "INIT_CONFIG_MAP";

// -----------------------------------------------------------------------------
// ConfigMap Keys
// -----------------------------------------------------------------------------
// Key names match the original deployment manifests so existing ConfigMaps
// keep working.

/// Label selector identifying Vault server pods. Required.
pub const KEY_LABEL_SELECTOR: &str = "vaultLabelSelector";

/// Shamir share count. Optional, defaults to [`DEFAULT_SECRET_SHARES`].
pub const KEY_SECRET_SHARES: &str = "secretShares";

/// Unseal threshold. Optional, defaults to [`DEFAULT_SECRET_THRESHOLD`].
pub const KEY_SECRET_THRESHOLD: &str = "secretThreshold";

/// Probe wait time in seconds. Optional.
pub const KEY_WAIT_TIME: &str = "serviceWaitTimeInSeconds";

/// Reconciliation interval in seconds. Optional.
pub const KEY_POLL_INTERVAL: &str = "pollIntervalSeconds";

/// JSON payload enabling the LDAP auth backend. Optional.
pub const KEY_ENABLE_LDAP: &str = "enableLDAP";

/// JSON payload configuring the LDAP auth backend. Required.
pub const KEY_LDAP_CONFIG: &str = "ldapConfig";

/// JSON mapping of groups/users to read and read-write policy sets. Optional.
pub const KEY_POLICY_MAPPINGS: &str = "ldapPolicyGroupMappings";

/// JSON mapping of secret-engine mount path to mount payload. Optional.
pub const KEY_SECRET_ENGINES: &str = "secretEngines";

/// Suffix marking a ConfigMap key as a named policy document.
pub const POLICY_DOC_SUFFIX: &str = ".hcl";

/// Default payload for [`KEY_ENABLE_LDAP`] when absent.
pub const DEFAULT_ENABLE_LDAP_PAYLOAD: &str =
    r#"{ "type": "ldap", "description": "Login with LDAP" }"#;
