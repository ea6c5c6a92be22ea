//! Cluster informer contract
//!
//! The database does not watch the cluster itself. An informer streams
//! add/update/delete notifications for pods, services and nodes to
//! registered [`ResourceEventHandler`]s, notifies [`ContainerEventHandler`]s
//! when containers go away, and answers point queries about pods.

mod memory;

pub use memory::{Inventory, MemoryInformer, ReplicaSetEntry};

use crate::error::InformerError;
use crate::models::{NodeInfo, PodInfo, ServiceInfo};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Cluster object families tracked by the informer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    Service,
    Node,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Service => "service",
            ResourceKind::Node => "node",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Pod => f.write_str("Pod"),
            ResourceKind::Service => f.write_str("Service"),
            ResourceKind::Node => f.write_str("Node"),
        }
    }
}

/// Receives add/update/delete notifications for one object family
pub trait ResourceEventHandler<T>: Send + Sync {
    fn on_add(&self, obj: &Arc<T>);
    fn on_update(&self, old: &Arc<T>, new: &Arc<T>);
    fn on_delete(&self, obj: &Arc<T>);
}

/// Receives container eviction notifications
pub trait ContainerEventHandler: Send + Sync {
    fn on_deletion(&self, container_ids: &[String]);
}

/// Watch-and-cache view of the cluster
pub trait Informer: Send + Sync {
    fn add_container_event_handler(&self, handler: Arc<dyn ContainerEventHandler>);

    fn add_pod_event_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<PodInfo>>,
    ) -> Result<(), InformerError>;

    fn add_service_event_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<ServiceInfo>>,
    ) -> Result<(), InformerError>;

    fn add_node_event_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<NodeInfo>>,
    ) -> Result<(), InformerError>;

    /// Pod running the given container, if known
    fn container_pod(&self, container_id: &str) -> Option<Arc<PodInfo>>;

    /// Fill in owner metadata (deployment) of `pod` in place.
    /// Best effort and safe to call repeatedly.
    fn fetch_pod_owner_info(&self, pod: &PodInfo);
}
