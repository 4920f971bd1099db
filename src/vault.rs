//! HTTP client for the cluster API of the Vault replicas.
//!
//! One [`VaultClient`] instance serves every replica; all methods take the
//! replica address and build the base URL `http://<address>:<port>` from it.
//! The port is [`VAULT_API_PORT`] in production and injectable for tests.
//!
//! # Transport-Only Errors
//!
//! Following the observed server behavior, only transport failures surface as
//! errors from the raw executor; HTTP status codes are logged, not branched
//! on. Vault answers 400 to re-enabling an existing auth mount, and restart
//! idempotency of the bootstrap sequence depends on treating that as success.
//! Endpoints that parse a response body fail with
//! [`Error::Response`](crate::error::Error::Response) when the body does not
//! have the expected shape.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::constants::{VAULT_API_PORT, VAULT_TOKEN_HEADER};
use crate::credentials::InitKeys;
use crate::error::{Error, Result};

/// Response of `GET /v1/sys/init`.
#[derive(Debug, Clone, Deserialize)]
struct InitStatus {
    initialized: bool,
}

/// Seal state of one replica, as reported by `/v1/sys/seal-status` and echoed
/// by every `/v1/sys/unseal` share submission.
///
/// Only `sealed` is required; a body without it is a malformed response and
/// the caller treats the query as failed (which classifies the replica as
/// sealed). The remaining fields are informational.
#[derive(Debug, Clone, Deserialize)]
pub struct SealStatus {
    /// Whether the replica is currently sealed.
    pub sealed: bool,
    /// Shares still required before the in-progress unseal completes.
    #[serde(default)]
    pub progress: u32,
    /// Configured unseal threshold.
    #[serde(default)]
    pub t: u32,
    /// Configured share count.
    #[serde(default)]
    pub n: u32,
    /// Whether the cluster behind this replica is initialized.
    #[serde(default)]
    pub initialized: bool,
}

/// HTTP client for the per-replica cluster API.
#[derive(Clone)]
pub struct VaultClient {
    http: Client<HttpConnector, Full<Bytes>>,
    port: u16,
    probe_timeout: Duration,
}

impl VaultClient {
    /// Client against the standard API port.
    pub fn new(probe_timeout: Duration) -> Self {
        Self::with_port(VAULT_API_PORT, probe_timeout)
    }

    /// Client against a non-standard port. Used by tests that run stub
    /// replicas on ephemeral ports.
    pub fn with_port(port: u16, probe_timeout: Duration) -> Self {
        Self {
            http: Client::builder(TokioExecutor::new()).build_http(),
            port,
            probe_timeout,
        }
    }

    fn base_url(&self, address: &str) -> String {
        format!("http://{}:{}", address.trim(), self.port)
    }

    /// Fire one request and return the raw response body.
    ///
    /// The lone transport primitive every endpoint goes through.
    async fn request(
        &self,
        method: Method,
        url: String,
        token: Option<&str>,
        payload: Option<String>,
    ) -> Result<Bytes> {
        let mut builder = Request::builder().method(method).uri(url.as_str());
        if let Some(token) = token {
            builder = builder.header(VAULT_TOKEN_HEADER, token);
        }
        let request = match payload {
            Some(body) => {
                debug!(%url, "sending request with json payload");
                builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from(body)))
            }
            None => builder.body(Full::new(Bytes::new())),
        }
        .map_err(|err| Error::Response {
            url: url.clone(),
            reason: format!("could not build request: {err}"),
        })?;

        let response = self
            .http
            .request(request)
            .await
            .map_err(|err| Error::Http {
                url: url.clone(),
                source: Box::new(err),
            })?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|err| Error::Http {
                url: url.clone(),
                source: Box::new(err),
            })?
            .to_bytes();
        debug!(%url, status = %status, "request completed");
        Ok(body)
    }

    fn parse<T: DeserializeOwned>(url: &str, body: &Bytes) -> Result<T> {
        serde_json::from_slice(body).map_err(|err| Error::Response {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }

    /// Lightweight liveness probe: `HEAD /` with a bounded timeout.
    pub async fn probe(&self, address: &str) -> Result<()> {
        let url = format!("{}/", self.base_url(address));
        let request = Request::builder()
            .method(Method::HEAD)
            .uri(url.as_str())
            .body(Full::new(Bytes::new()))
            .map_err(|err| Error::Response {
                url: url.clone(),
                reason: format!("could not build request: {err}"),
            })?;
        match tokio::time::timeout(self.probe_timeout, self.http.request(request)).await {
            Err(_) => Err(Error::Timeout { url }),
            Ok(Err(err)) => Err(Error::Http {
                url,
                source: Box::new(err),
            }),
            Ok(Ok(response)) => {
                debug!(%url, status = %response.status(), "replica is live");
                Ok(())
            }
        }
    }

    /// `GET /v1/sys/init`: whether the cluster is initialized.
    pub async fn init_status(&self, address: &str) -> Result<bool> {
        let url = format!("{}/v1/sys/init", self.base_url(address));
        let body = self.request(Method::GET, url.clone(), None, None).await?;
        let status: InitStatus = Self::parse(&url, &body)?;
        Ok(status.initialized)
    }

    /// `PUT /v1/sys/init`: initialize the cluster, returning the generated
    /// key shares and root token.
    pub async fn initialize(
        &self,
        address: &str,
        secret_shares: u32,
        secret_threshold: u32,
    ) -> Result<InitKeys> {
        let url = format!("{}/v1/sys/init", self.base_url(address));
        let payload = serde_json::json!({
            "secret_shares": secret_shares,
            "secret_threshold": secret_threshold,
        });
        let body = self
            .request(Method::PUT, url.clone(), None, Some(payload.to_string()))
            .await?;
        Self::parse(&url, &body)
    }

    /// `GET /v1/sys/seal-status`.
    pub async fn seal_status(&self, address: &str) -> Result<SealStatus> {
        let url = format!("{}/v1/sys/seal-status", self.base_url(address));
        let body = self.request(Method::GET, url.clone(), None, None).await?;
        Self::parse(&url, &body)
    }

    /// `PUT /v1/sys/unseal`: submit one key share, returning the updated seal
    /// status with its remaining-progress counter.
    pub async fn submit_unseal_share(&self, address: &str, share: &str) -> Result<SealStatus> {
        let url = format!("{}/v1/sys/unseal", self.base_url(address));
        let payload = serde_json::json!({ "key": share });
        let body = self
            .request(Method::PUT, url.clone(), None, Some(payload.to_string()))
            .await?;
        Self::parse(&url, &body)
    }

    /// `POST /v1/sys/auth/ldap`: enable the LDAP auth backend.
    pub async fn enable_auth_backend(
        &self,
        address: &str,
        token: &str,
        payload: &str,
    ) -> Result<()> {
        let url = format!("{}/v1/sys/auth/ldap", self.base_url(address));
        self.request(Method::POST, url, Some(token), Some(payload.to_string()))
            .await?;
        Ok(())
    }

    /// `PUT /v1/auth/ldap/config`: push the LDAP connection configuration.
    pub async fn configure_auth_backend(
        &self,
        address: &str,
        token: &str,
        payload: &str,
    ) -> Result<()> {
        let url = format!("{}/v1/auth/ldap/config", self.base_url(address));
        self.request(Method::PUT, url, Some(token), Some(payload.to_string()))
            .await?;
        Ok(())
    }

    /// `PUT /v1/sys/policy/<name>`: write one named policy document.
    pub async fn write_policy(
        &self,
        address: &str,
        token: &str,
        name: &str,
        document: &str,
    ) -> Result<()> {
        let url = format!("{}/v1/sys/policy/{}", self.base_url(address), name.trim());
        let payload = serde_json::json!({ "policy": document });
        self.request(Method::PUT, url, Some(token), Some(payload.to_string()))
            .await?;
        Ok(())
    }

    /// `PUT /v1/auth/ldap/groups/<name>`: bind a policy set to a group.
    pub async fn bind_group_policy(
        &self,
        address: &str,
        token: &str,
        group: &str,
        payload: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/v1/auth/ldap/groups/{}",
            self.base_url(address),
            group.trim()
        );
        self.request(Method::PUT, url, Some(token), Some(payload.to_string()))
            .await?;
        Ok(())
    }

    /// `PUT /v1/auth/ldap/users/<name>`: bind a policy set to a user.
    pub async fn bind_user_policy(
        &self,
        address: &str,
        token: &str,
        user: &str,
        payload: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/v1/auth/ldap/users/{}",
            self.base_url(address),
            user.trim()
        );
        self.request(Method::PUT, url, Some(token), Some(payload.to_string()))
            .await?;
        Ok(())
    }

    /// `PUT /v1/sys/mounts/<path>`: enable one secret engine.
    pub async fn enable_secret_engine(
        &self,
        address: &str,
        token: &str,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = format!("{}/v1/sys/mounts/{}", self.base_url(address), path.trim());
        self.request(Method::PUT, url, Some(token), Some(payload.to_string()))
            .await?;
        Ok(())
    }
}
