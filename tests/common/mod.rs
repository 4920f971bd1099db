//! Shared test support: an in-memory stub Vault replica.
//!
//! [`StubVault`] speaks just enough of the cluster HTTP API for bootstrap and
//! reconciliation tests: init status, initialize, seal status, unseal share
//! submission, and the auth/policy/mount configuration endpoints. Every call
//! is recorded so tests can assert exactly what the engine sent.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use sealkeeper::config::BootstrapConfig;

/// Observable state of one stub replica.
#[derive(Debug)]
pub struct StubState {
    pub initialized: bool,
    pub sealed: bool,
    /// Number of `PUT /v1/sys/init` calls received.
    pub init_calls: u32,
    /// Every unseal share ever submitted, in arrival order.
    pub received_shares: Vec<String>,
    /// Shares submitted in the current unseal round.
    round_shares: u32,
    /// Threshold governing when an unseal round completes.
    pub threshold: u32,
    pub ldap_enable_calls: u32,
    pub ldap_config_calls: u32,
    /// `(name, request body)` of every policy write.
    pub policies: Vec<(String, String)>,
    /// `(group, request body)` of every group binding.
    pub group_bindings: Vec<(String, String)>,
    /// `(user, request body)` of every user binding.
    pub user_bindings: Vec<(String, String)>,
    /// `(path, request body)` of every engine mount.
    pub mounts: Vec<(String, String)>,
    /// Root tokens observed on configuration calls.
    pub seen_tokens: Vec<String>,
    /// When set, `GET /v1/sys/seal-status` answers with a malformed body.
    pub garble_seal_status: bool,
    /// When set, `GET /v1/sys/init` answers with a malformed body.
    pub garble_init_status: bool,
    /// When set, share submissions are recorded but the replica never
    /// reports unsealed, like a server that rejects the shares.
    pub stuck_sealed: bool,
}

impl StubState {
    fn new(initialized: bool, sealed: bool) -> Self {
        Self {
            initialized,
            sealed,
            init_calls: 0,
            received_shares: Vec::new(),
            round_shares: 0,
            threshold: 3,
            ldap_enable_calls: 0,
            ldap_config_calls: 0,
            policies: Vec::new(),
            group_bindings: Vec::new(),
            user_bindings: Vec::new(),
            mounts: Vec::new(),
            seen_tokens: Vec::new(),
            garble_seal_status: false,
            garble_init_status: false,
            stuck_sealed: false,
        }
    }

    fn seal_status_body(&self) -> String {
        serde_json::json!({
            "sealed": self.sealed,
            "progress": self.threshold.saturating_sub(self.round_shares),
            "t": self.threshold,
            "n": 5,
            "initialized": self.initialized,
        })
        .to_string()
    }
}

/// One stub replica listening on `<ip>:<port>`.
pub struct StubVault {
    pub ip: String,
    pub port: u16,
    state: Arc<Mutex<StubState>>,
    server: JoinHandle<()>,
}

impl Drop for StubVault {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl StubVault {
    /// Spawn a stub bound to the given loopback ip and port (0 for any).
    pub async fn spawn(ip: &str, port: u16, initialized: bool, sealed: bool) -> Self {
        let listener = TcpListener::bind((ip, port))
            .await
            .unwrap_or_else(|err| panic!("binding {ip}:{port}: {err}"));
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(StubState::new(initialized, sealed)));

        let accept_state = state.clone();
        let server = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let conn_state = accept_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(conn_state.clone(), req));
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            ip: ip.to_string(),
            port,
            state,
            server,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap()
    }
}

async fn handle(
    state: Arc<Mutex<StubState>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let token = req
        .headers()
        .get("X-Vault-Token")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body_bytes = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let body = String::from_utf8_lossy(&body_bytes).into_owned();

    let mut stub = state.lock().unwrap();
    if let Some(token) = token {
        stub.seen_tokens.push(token);
    }

    let reply = |payload: String| Ok(Response::new(Full::new(Bytes::from(payload))));

    match (method, path.as_str()) {
        (Method::HEAD, "/") => reply(String::new()),
        (Method::GET, "/v1/sys/init") => {
            if stub.garble_init_status {
                return reply("{not json at all".to_string());
            }
            reply(format!(r#"{{"initialized":{}}}"#, stub.initialized))
        }
        (Method::PUT, "/v1/sys/init") => {
            stub.init_calls += 1;
            stub.initialized = true;
            let request: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
            let shares = request["secret_shares"].as_u64().unwrap_or(5);
            stub.threshold = request["secret_threshold"].as_u64().unwrap_or(3) as u32;
            let keys: Vec<String> = (0..shares).map(|i| format!("key-{i}")).collect();
            let keys_base64: Vec<String> = (0..shares).map(|i| format!("a2V5LTE{i}")).collect();
            reply(
                serde_json::json!({
                    "keys": keys,
                    "keys_base64": keys_base64,
                    "root_token": "s.stub-root",
                })
                .to_string(),
            )
        }
        (Method::GET, "/v1/sys/seal-status") => {
            if stub.garble_seal_status {
                return reply("{not json at all".to_string());
            }
            reply(stub.seal_status_body())
        }
        (Method::PUT, "/v1/sys/unseal") => {
            let request: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
            let share = request["key"].as_str().unwrap_or_default().to_string();
            stub.received_shares.push(share);
            stub.round_shares += 1;
            if stub.round_shares >= stub.threshold {
                if !stub.stuck_sealed {
                    stub.sealed = false;
                }
                stub.round_shares = 0;
            }
            reply(stub.seal_status_body())
        }
        (Method::POST, "/v1/sys/auth/ldap") => {
            stub.ldap_enable_calls += 1;
            reply("{}".to_string())
        }
        (Method::PUT, "/v1/auth/ldap/config") => {
            stub.ldap_config_calls += 1;
            reply("{}".to_string())
        }
        (Method::PUT, path) if path.starts_with("/v1/sys/policy/") => {
            let name = path.trim_start_matches("/v1/sys/policy/").to_string();
            stub.policies.push((name, body));
            reply("{}".to_string())
        }
        (Method::PUT, path) if path.starts_with("/v1/auth/ldap/groups/") => {
            let name = path.trim_start_matches("/v1/auth/ldap/groups/").to_string();
            stub.group_bindings.push((name, body));
            reply("{}".to_string())
        }
        (Method::PUT, path) if path.starts_with("/v1/auth/ldap/users/") => {
            let name = path.trim_start_matches("/v1/auth/ldap/users/").to_string();
            stub.user_bindings.push((name, body));
            reply("{}".to_string())
        }
        (Method::PUT, path) if path.starts_with("/v1/sys/mounts/") => {
            let name = path.trim_start_matches("/v1/sys/mounts/").to_string();
            stub.mounts.push((name, body));
            reply("{}".to_string())
        }
        _ => {
            let mut response = Response::new(Full::new(Bytes::from("{}")));
            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
            Ok(response)
        }
    }
}

/// Minimal valid ConfigMap data; tests extend it per scenario.
pub fn config_data() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("vaultLabelSelector".to_string(), "app=vault".to_string()),
        (
            "ldapConfig".to_string(),
            r#"{"url":"ldaps://ldap.example.com","userdn":"ou=People,dc=example,dc=com"}"#
                .to_string(),
        ),
        ("serviceWaitTimeInSeconds".to_string(), "1".to_string()),
        ("pollIntervalSeconds".to_string(), "1".to_string()),
    ])
}

/// Parsed [`config_data`], with scenario-specific overrides applied first.
pub fn config_with(overrides: &[(&str, &str)]) -> BootstrapConfig {
    let mut data = config_data();
    for (key, value) in overrides {
        data.insert(key.to_string(), value.to_string());
    }
    BootstrapConfig::from_map(&data).unwrap()
}

/// Serialized credentials matching what a stub's initialize call issues.
pub fn stub_credentials_json() -> Vec<u8> {
    serde_json::json!({
        "keys": ["key-0", "key-1", "key-2", "key-3", "key-4"],
        "keys_base64": ["a2V5LTEw", "a2V5LTEx", "a2V5LTEy", "a2V5LTEz", "a2V5LTE0"],
        "root_token": "s.stub-root",
    })
    .to_string()
    .into_bytes()
}
