//! Kubernetes implementation of [`Platform`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::{Api, ListParams, ObjectMeta, PostParams};
use kube::Client;
use tracing::{debug, info};

use crate::constants::KEYS_SECRET_FIELD;
use crate::error::{Error, Result};

use super::{Platform, Replica};

/// [`Platform`] backed by the Kubernetes API server, scoped to the namespace
/// the process runs in.
pub struct KubePlatform {
    client: Client,
    namespace: String,
}

impl KubePlatform {
    /// Connect using the in-cluster service account (or local kubeconfig when
    /// running outside a pod).
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|err| Error::Platform(format!("connecting to the api server: {err}")))?;
        let namespace = client.default_namespace().to_string();
        info!(namespace = %namespace, "connected to the platform api");
        Ok(Self { client, namespace })
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl Platform for KubePlatform {
    async fn list_replicas(&self, label_selector: &str) -> Result<Vec<Replica>> {
        let params = ListParams::default()
            .labels(label_selector)
            .fields("status.phase=Running");
        let pods = self
            .pods()
            .list(&params)
            .await
            .map_err(|err| Error::Platform(format!("listing pods: {err}")))?;

        let replicas: Vec<Replica> = pods
            .items
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                let address = pod
                    .status
                    .and_then(|status| status.pod_ip)
                    .unwrap_or_default();
                Some(Replica { name, address })
            })
            .collect();
        debug!(count = replicas.len(), %label_selector, "listed running replicas");
        Ok(replicas)
    }

    async fn read_secret(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let secret = self
            .secrets()
            .get_opt(name)
            .await
            .map_err(|err| Error::Platform(format!("reading secret {name}: {err}")))?;
        Ok(secret
            .and_then(|secret| secret.data)
            .and_then(|mut data| data.remove(KEYS_SECRET_FIELD))
            .map(|field| field.0))
    }

    async fn write_secret(&self, name: &str, data: &[u8]) -> Result<()> {
        let payload = String::from_utf8(data.to_vec())
            .map_err(|err| Error::Platform(format!("secret payload is not utf-8: {err}")))?;
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), "vault".to_string()),
                    ("type".to_string(), "init-keys".to_string()),
                ])),
                ..Default::default()
            },
            string_data: Some(BTreeMap::from([(KEYS_SECRET_FIELD.to_string(), payload)])),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        self.secrets()
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|err| Error::Platform(format!("creating secret {name}: {err}")))?;
        info!(secret = %name, "stored initialization credentials");
        Ok(())
    }

    async fn read_config(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let config_map = self
            .config_maps()
            .get(name)
            .await
            .map_err(|err| Error::Platform(format!("reading configmap {name}: {err}")))?;
        Ok(config_map.data.unwrap_or_default())
    }
}
