//! Bootstrap configuration.
//!
//! All settings come from a single ConfigMap (named by the `INIT_CONFIG_MAP`
//! environment variable) whose data is handed to [`BootstrapConfig::from_map`]
//! as a plain string map. The key names are documented in [`crate::constants`]
//! and match the original deployment manifests.
//!
//! Missing optional keys fall back to documented defaults with a warning;
//! missing required keys (`vaultLabelSelector`, `ldapConfig`) are a
//! [`Error::Config`](crate::error::Error::Config) and abort startup. The
//! configuration is loaded once and immutable afterwards.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::constants::{
    DEFAULT_ENABLE_LDAP_PAYLOAD, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SECRET_SHARES,
    DEFAULT_SECRET_THRESHOLD, DEFAULT_WAIT_TIME_SECS, KEY_ENABLE_LDAP, KEY_LABEL_SELECTOR,
    KEY_LDAP_CONFIG, KEY_POLICY_MAPPINGS, KEY_POLL_INTERVAL, KEY_SECRET_ENGINES,
    KEY_SECRET_SHARES, KEY_SECRET_THRESHOLD, KEY_WAIT_TIME, POLICY_DOC_SUFFIX,
};
use crate::error::{Error, Result};

/// Principals to which policies get bound, split by access class.
///
/// The `r_`/`rw_` split mirrors the wire shape of the
/// `ldapPolicyGroupMappings` ConfigMap value; users live under the same JSON
/// object as groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PrincipalSets {
    /// Groups receiving the read-only policy set.
    #[serde(default)]
    pub r_groups: Vec<String>,
    /// Groups receiving the read-write policy set.
    #[serde(default)]
    pub rw_groups: Vec<String>,
    /// Users receiving the read-only policy set.
    #[serde(default)]
    pub r_users: Vec<String>,
    /// Users receiving the read-write policy set.
    #[serde(default)]
    pub rw_users: Vec<String>,
}

/// Named policy sets referenced by [`PrincipalSets`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PolicySets {
    /// Policies granted to read-only principals.
    #[serde(default)]
    pub r_policy: Vec<String>,
    /// Policies granted to read-write principals.
    #[serde(default)]
    pub rw_policy: Vec<String>,
}

/// Parsed `ldapPolicyGroupMappings` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PolicyBindings {
    /// Group and user names per access class.
    #[serde(default)]
    pub groups: PrincipalSets,
    /// Policy names per access class.
    #[serde(default)]
    pub policies: PolicySets,
}

impl PolicySets {
    /// Binding payload for the read-only policy set: `{"policies":"a,b"}`.
    pub fn read_payload(&self) -> String {
        policy_payload(&self.r_policy)
    }

    /// Binding payload for the read-write policy set.
    pub fn read_write_payload(&self) -> String {
        policy_payload(&self.rw_policy)
    }
}

fn policy_payload(policies: &[String]) -> String {
    format!(r#"{{"policies":"{}"}}"#, policies.join(","))
}

/// Immutable bootstrap settings, loaded once at process start.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Label selector identifying Vault server pods.
    pub label_selector: String,
    /// Shamir share count passed to `/v1/sys/init`.
    pub secret_shares: u32,
    /// Shares required to unseal; never exceeds `secret_shares`.
    pub secret_threshold: u32,
    /// Per-attempt probe timeout and inter-attempt sleep.
    pub wait_time: Duration,
    /// Sleep between reconciliation ticks.
    pub poll_interval: Duration,
    /// JSON payload for `POST /v1/sys/auth/ldap`.
    pub ldap_enable_payload: String,
    /// JSON payload for `PUT /v1/auth/ldap/config`.
    pub ldap_config_payload: String,
    /// Policy name (suffix stripped) to policy document, from `*.hcl` keys.
    pub policies: BTreeMap<String, String>,
    /// Parsed policy bindings, if configured.
    pub policy_bindings: Option<PolicyBindings>,
    /// Secret-engine mount path to mount payload.
    pub secret_engines: BTreeMap<String, serde_json::Value>,
}

impl BootstrapConfig {
    /// Build the configuration from ConfigMap data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `vaultLabelSelector` or `ldapConfig` is
    /// missing, when the threshold exceeds the share count, or when one of the
    /// JSON-valued keys does not parse.
    pub fn from_map(data: &BTreeMap<String, String>) -> Result<Self> {
        let label_selector = required(data, KEY_LABEL_SELECTOR)?;
        let ldap_config_payload = required(data, KEY_LDAP_CONFIG)?;

        let secret_shares = parse_or_default(data, KEY_SECRET_SHARES, DEFAULT_SECRET_SHARES);
        let secret_threshold =
            parse_or_default(data, KEY_SECRET_THRESHOLD, DEFAULT_SECRET_THRESHOLD);
        if secret_threshold > secret_shares {
            return Err(Error::Config(format!(
                "secretThreshold ({secret_threshold}) exceeds secretShares ({secret_shares})"
            )));
        }

        let wait_secs = parse_or_default(data, KEY_WAIT_TIME, DEFAULT_WAIT_TIME_SECS);
        let poll_secs = parse_or_default(data, KEY_POLL_INTERVAL, DEFAULT_POLL_INTERVAL_SECS);

        let ldap_enable_payload = match data.get(KEY_ENABLE_LDAP) {
            Some(payload) if !payload.is_empty() => payload.clone(),
            _ => {
                warn!(
                    key = KEY_ENABLE_LDAP,
                    "LDAP enable payload not provided, using the basic enable payload"
                );
                DEFAULT_ENABLE_LDAP_PAYLOAD.to_string()
            }
        };

        let policies = data
            .iter()
            .filter(|(key, _)| key.ends_with(POLICY_DOC_SUFFIX))
            .map(|(key, doc)| {
                let name = key.trim_end_matches(POLICY_DOC_SUFFIX).to_string();
                (name, doc.clone())
            })
            .collect();

        let policy_bindings = match data.get(KEY_POLICY_MAPPINGS) {
            Some(raw) if !raw.is_empty() => Some(serde_json::from_str(raw).map_err(|err| {
                Error::Config(format!("{KEY_POLICY_MAPPINGS} does not parse: {err}"))
            })?),
            _ => None,
        };

        let secret_engines = match data.get(KEY_SECRET_ENGINES) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map_err(|err| {
                Error::Config(format!("{KEY_SECRET_ENGINES} does not parse: {err}"))
            })?,
            _ => BTreeMap::new(),
        };

        Ok(Self {
            label_selector,
            secret_shares,
            secret_threshold,
            wait_time: Duration::from_secs(wait_secs),
            poll_interval: Duration::from_secs(poll_secs),
            ldap_enable_payload,
            ldap_config_payload,
            policies,
            policy_bindings,
            secret_engines,
        })
    }
}

fn required(data: &BTreeMap<String, String>, key: &str) -> Result<String> {
    match data.get(key) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(Error::Config(format!("required ConfigMap key {key} is not set"))),
    }
}

/// Parse a numeric key, warning and falling back to the default when the key
/// is absent or does not parse. Matches the forgiving behavior the original
/// deployment relied on.
fn parse_or_default<T>(data: &BTreeMap<String, String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match data.get(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw = %raw, %default, "could not parse value, using default");
                default
            }
        },
        None => {
            warn!(key, %default, "value not specified, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                KEY_LABEL_SELECTOR.to_string(),
                "app.kubernetes.io/name=vault,component=server".to_string(),
            ),
            (
                KEY_LDAP_CONFIG.to_string(),
                r#"{"url":"ldaps://ldap.example.com"}"#.to_string(),
            ),
        ])
    }

    #[test]
    fn minimal_map_uses_documented_defaults() {
        let config = BootstrapConfig::from_map(&minimal()).unwrap();
        assert_eq!(config.secret_shares, 5);
        assert_eq!(config.secret_threshold, 3);
        assert_eq!(config.wait_time, Duration::from_secs(3));
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.ldap_enable_payload, DEFAULT_ENABLE_LDAP_PAYLOAD);
        assert!(config.policies.is_empty());
        assert!(config.policy_bindings.is_none());
        assert!(config.secret_engines.is_empty());
    }

    #[test]
    fn missing_label_selector_is_a_config_error() {
        let mut data = minimal();
        data.remove(KEY_LABEL_SELECTOR);
        let err = BootstrapConfig::from_map(&data).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn missing_ldap_config_is_a_config_error() {
        let mut data = minimal();
        data.remove(KEY_LDAP_CONFIG);
        assert!(BootstrapConfig::from_map(&data).is_err());
    }

    #[test]
    fn unparsable_shares_fall_back_to_default() {
        let mut data = minimal();
        data.insert(KEY_SECRET_SHARES.to_string(), "five".to_string());
        let config = BootstrapConfig::from_map(&data).unwrap();
        assert_eq!(config.secret_shares, DEFAULT_SECRET_SHARES);
    }

    #[test]
    fn numeric_values_are_trimmed_before_parsing() {
        let mut data = minimal();
        data.insert(KEY_SECRET_SHARES.to_string(), " 7 ".to_string());
        data.insert(KEY_SECRET_THRESHOLD.to_string(), "4\n".to_string());
        let config = BootstrapConfig::from_map(&data).unwrap();
        assert_eq!(config.secret_shares, 7);
        assert_eq!(config.secret_threshold, 4);
    }

    #[test]
    fn threshold_above_shares_is_rejected() {
        let mut data = minimal();
        data.insert(KEY_SECRET_SHARES.to_string(), "3".to_string());
        data.insert(KEY_SECRET_THRESHOLD.to_string(), "5".to_string());
        let err = BootstrapConfig::from_map(&data).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn hcl_keys_become_named_policies() {
        let mut data = minimal();
        data.insert(
            "read-only.hcl".to_string(),
            r#"path "secret/*" { capabilities = ["read"] }"#.to_string(),
        );
        data.insert("ops.hcl".to_string(), "path \"sys/*\" {}".to_string());
        let config = BootstrapConfig::from_map(&data).unwrap();
        assert_eq!(config.policies.len(), 2);
        assert!(config.policies.contains_key("read-only"));
        assert!(config.policies.contains_key("ops"));
        // Suffix-less keys are not policies.
        assert!(!config.policies.contains_key(KEY_LDAP_CONFIG));
    }

    #[test]
    fn policy_mappings_parse_into_bindings() {
        let mut data = minimal();
        data.insert(
            KEY_POLICY_MAPPINGS.to_string(),
            r#"{
                "groups": {
                    "r_groups": ["auditors"],
                    "rw_groups": ["platform", "sre"],
                    "r_users": ["alice"],
                    "rw_users": []
                },
                "policies": {
                    "r_policy": ["read-only"],
                    "rw_policy": ["read-only", "ops"]
                }
            }"#
            .to_string(),
        );
        let config = BootstrapConfig::from_map(&data).unwrap();
        let bindings = config.policy_bindings.unwrap();
        assert_eq!(bindings.groups.rw_groups, vec!["platform", "sre"]);
        assert_eq!(bindings.groups.r_users, vec!["alice"]);
        assert_eq!(bindings.policies.read_payload(), r#"{"policies":"read-only"}"#);
        assert_eq!(
            bindings.policies.read_write_payload(),
            r#"{"policies":"read-only,ops"}"#
        );
    }

    #[test]
    fn malformed_policy_mappings_abort() {
        let mut data = minimal();
        data.insert(KEY_POLICY_MAPPINGS.to_string(), "{not json".to_string());
        assert!(BootstrapConfig::from_map(&data).is_err());
    }

    #[test]
    fn secret_engines_parse_into_path_payload_map() {
        let mut data = minimal();
        data.insert(
            KEY_SECRET_ENGINES.to_string(),
            r#"{"kv-app": {"type": "kv", "options": {"version": "2"}}}"#.to_string(),
        );
        let config = BootstrapConfig::from_map(&data).unwrap();
        assert_eq!(config.secret_engines.len(), 1);
        assert_eq!(config.secret_engines["kv-app"]["type"], "kv");
    }
}
