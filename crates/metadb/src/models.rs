//! Core data models for the metadata database

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Identity of a container as observed from the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub container_id: String,
    pub pid_namespace: u32,
}

/// IP addresses assigned to a cluster object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(default)]
    pub ips: Vec<String>,
}

/// Objects that can be indexed by their IP addresses
pub trait HasIps {
    fn ips(&self) -> &[String];
}

/// Kind of the controller owning a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerKind {
    ReplicaSet,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    #[serde(other)]
    Other,
}

/// Controller reference of a pod, as read from its owner references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodOwner {
    pub kind: OwnerKind,
    pub name: String,
}

/// A Kubernetes pod.
///
/// Instances are owned by the informer and shared with the database through
/// `Arc`. The deployment name is resolved lazily by the informer (the owning
/// replica set may arrive after the pod) and is written in place, so it sits
/// behind its own lock.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub container_ids: Vec<String>,
    #[serde(default)]
    pub ip_info: IpInfo,
    #[serde(default)]
    pub owner: Option<PodOwner>,
    #[serde(default)]
    deployment: RwLock<Option<String>>,
}

impl PodInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ip_info.ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_container_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.container_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_owner(mut self, kind: OwnerKind, name: impl Into<String>) -> Self {
        self.owner = Some(PodOwner {
            kind,
            name: name.into(),
        });
        self
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Deployment owning this pod, if already resolved
    pub fn deployment_name(&self) -> Option<String> {
        self.deployment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record the owning deployment. Called by the informer.
    pub fn set_deployment_name(&self, name: impl Into<String>) {
        *self
            .deployment
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    /// Logical service name used to cluster telemetry across replicas:
    /// the deployment if known, otherwise the direct owner, otherwise the pod.
    pub fn service_name(&self) -> String {
        if let Some(deployment) = self.deployment_name() {
            return deployment;
        }
        match &self.owner {
            Some(owner) if !owner.name.is_empty() => owner.name.clone(),
            _ => self.name.clone(),
        }
    }

    /// `namespace/name` key
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

impl HasIps for PodInfo {
    fn ips(&self) -> &[String] {
        &self.ip_info.ips
    }
}

/// A Kubernetes service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub ip_info: IpInfo,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ip_info: IpInfo::default(),
        }
    }

    pub fn with_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ip_info.ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

impl HasIps for ServiceInfo {
    fn ips(&self) -> &[String] {
        &self.ip_info.ips
    }
}

/// A Kubernetes node. Nodes are cluster scoped, so `namespace` is usually empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub ip_info: IpInfo,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            ip_info: IpInfo::default(),
        }
    }

    pub fn with_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ip_info.ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

impl HasIps for NodeInfo {
    fn ips(&self) -> &[String] {
        &self.ip_info.ips
    }
}

pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_prefers_deployment() {
        let pod = PodInfo::new("web-6d4b9-x2x", "prod").with_owner(OwnerKind::ReplicaSet, "web-6d4b9");
        assert_eq!(pod.service_name(), "web-6d4b9");

        pod.set_deployment_name("web");
        assert_eq!(pod.service_name(), "web");
        assert_eq!(pod.deployment_name().as_deref(), Some("web"));
    }

    #[test]
    fn test_service_name_falls_back_to_pod_name() {
        let pod = PodInfo::new("standalone", "default");
        assert_eq!(pod.service_name(), "standalone");
    }

    #[test]
    fn test_pod_info_from_json() {
        let pod: PodInfo = serde_json::from_str(
            r#"{
                "name": "db-0",
                "namespace": "data",
                "container_ids": ["abc"],
                "ip_info": {"ips": ["10.1.0.4"]},
                "owner": {"kind": "StatefulSet", "name": "db"}
            }"#,
        )
        .unwrap();

        assert_eq!(pod.ips(), ["10.1.0.4".to_string()]);
        assert_eq!(pod.owner.as_ref().unwrap().kind, OwnerKind::StatefulSet);
        assert_eq!(pod.deployment_name(), None);
        assert_eq!(pod.service_name(), "db");
    }

    #[test]
    fn test_unknown_owner_kind() {
        let owner: PodOwner =
            serde_json::from_str(r#"{"kind": "Rollout", "name": "canary"}"#).unwrap();
        assert_eq!(owner.kind, OwnerKind::Other);
    }
}
