//! Pod metadata database
//!
//! Correlates what the kernel sees (PIDs, PID namespaces, IPs) with what the
//! cluster knows (pods, services, nodes). Two independent event streams feed
//! it: container lifecycle from the process inspector and object
//! add/update/delete from the informer. The telemetry pipeline reads from it
//! concurrently.
//!
//! Every index has its own lock. No lock is held while calling into the
//! informer, and operations that touch several indexes lock them one after
//! the other, so indexes are only eventually consistent with each other.

mod ip_index;


use crate::error::DatabaseError;
use crate::informer::{ContainerEventHandler, Informer, ResourceEventHandler, ResourceKind};
use crate::inspector::ContainerInspector;
use crate::models::{ContainerInfo, NodeInfo, PodInfo, ServiceInfo};
use crate::observability::{DatabaseMetrics, EventAction, OwnerLookup};
use dashmap::DashMap;
use ip_index::IpIndex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Entry counts of every index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub containers: usize,
    pub namespaces: usize,
    pub owner_pods: usize,
    pub pods_by_ip: usize,
    pub services_by_ip: usize,
    pub nodes_by_ip: usize,
}

/// Aggregates cluster metadata from the informer and the process inspector
pub struct Database {
    informer: Arc<dyn Informer>,
    inspector: Arc<dyn ContainerInspector>,
    metrics: DatabaseMetrics,

    /// container ID → container
    containers: DashMap<String, Arc<ContainerInfo>>,

    /// PID namespace → any container inside it
    namespaces: DashMap<u32, Arc<ContainerInfo>>,

    /// PID namespace → owner pod, memoized from `namespaces` + informer
    owner_pods: DashMap<u32, Arc<PodInfo>>,

    pods_by_ip: IpIndex<PodInfo>,
    services_by_ip: IpIndex<ServiceInfo>,
    nodes_by_ip: IpIndex<NodeInfo>,
}

impl Database {
    /// Create an empty database bound to `informer`. Nothing is registered:
    /// see [`Database::start`].
    pub fn new(informer: Arc<dyn Informer>, inspector: Arc<dyn ContainerInspector>) -> Self {
        Self {
            informer,
            inspector,
            metrics: DatabaseMetrics::new(),
            containers: DashMap::new(),
            namespaces: DashMap::new(),
            owner_pods: DashMap::new(),
            pods_by_ip: IpIndex::new(),
            services_by_ip: IpIndex::new(),
            nodes_by_ip: IpIndex::new(),
        }
    }

    /// Create a database and register it with the informer as container
    /// event handler and as pod, service and node event handler.
    ///
    /// Fails on the first handler registration error. Handlers registered
    /// before the failure are not rolled back; the returned error means the
    /// database must not be used.
    pub fn start(
        informer: Arc<dyn Informer>,
        inspector: Arc<dyn ContainerInspector>,
    ) -> Result<Arc<Self>, DatabaseError> {
        let db = Arc::new(Self::new(Arc::clone(&informer), inspector));

        informer.add_container_event_handler(db.clone());
        informer
            .add_pod_event_handler(db.clone())
            .map_err(|source| DatabaseError::Registration {
                kind: ResourceKind::Pod,
                source,
            })?;
        informer
            .add_service_event_handler(db.clone())
            .map_err(|source| DatabaseError::Registration {
                kind: ResourceKind::Service,
                source,
            })?;
        informer
            .add_node_event_handler(db.clone())
            .map_err(|source| DatabaseError::Registration {
                kind: ResourceKind::Node,
                source,
            })?;

        info!("Database registered with informer");
        Ok(db)
    }

    /// Forget the given containers. Unknown IDs are ignored.
    pub fn on_deletion(&self, container_ids: &[String]) {
        for cid in container_ids {
            if let Some((_, info)) = self.containers.remove(cid) {
                debug!(container_id = %cid, pid_namespace = info.pid_namespace, "Removing container");
                self.delete_owner_cache(info.pid_namespace);
                self.namespaces.remove(&info.pid_namespace);
                self.metrics.inc_container_deletions();
            }
        }
        self.metrics.set_containers_indexed(self.containers.len());
    }

    /// Inspect `pid` and index its container. Processes that can't be
    /// inspected (typically because they already exited) are dropped.
    pub fn add_process(&self, pid: u32) {
        match self.inspector.info_for_pid(pid) {
            Ok(info) => self.add_container(info),
            Err(error) => {
                debug!(pid, error = %error, "failing to get container information");
                self.metrics.inc_inspection_failures();
            }
        }
    }

    fn add_container(&self, info: ContainerInfo) {
        let info = Arc::new(info);
        // the namespace number may have been reused by the kernel
        self.delete_owner_cache(info.pid_namespace);
        self.namespaces.insert(info.pid_namespace, Arc::clone(&info));
        self.containers.insert(info.container_id.clone(), info);
        self.metrics.set_containers_indexed(self.containers.len());
    }

    /// Drop the memoized owner pod of `pid_namespace`.
    ///
    /// The namespace → container mapping is kept: process and container
    /// events are not ordered with respect to each other, while the owner
    /// cache is rebuilt on the next lookup.
    pub fn clean_process_caches(&self, pid_namespace: u32) {
        self.delete_owner_cache(pid_namespace);
    }

    fn delete_owner_cache(&self, pid_namespace: u32) {
        self.owner_pods.remove(&pid_namespace);
    }

    /// Pod owning the processes of `pid_namespace`.
    ///
    /// Owner metadata is refreshed through the informer on every call, cache
    /// hit or not, because the replica set of a pod may show up after the
    /// pod was cached.
    pub fn owner_pod_info(&self, pid_namespace: u32) -> Option<Arc<PodInfo>> {
        let start = Instant::now();

        let cached = self
            .owner_pods
            .get(&pid_namespace)
            .map(|pod| Arc::clone(pod.value()));

        let (pod, outcome) = match cached {
            Some(pod) => (pod, OwnerLookup::CacheHit),
            None => {
                let container_id = self
                    .namespaces
                    .get(&pid_namespace)
                    .map(|info| info.container_id.clone());
                let Some(container_id) = container_id else {
                    self.metrics
                        .record_owner_lookup(OwnerLookup::NoContainer, start.elapsed().as_secs_f64());
                    return None;
                };
                let Some(pod) = self.informer.container_pod(&container_id) else {
                    debug!(pid_namespace, container_id = %container_id, "No pod known for container");
                    self.metrics
                        .record_owner_lookup(OwnerLookup::NoPod, start.elapsed().as_secs_f64());
                    return None;
                };
                // a concurrent lookup may have won the race; keep its pod
                let pod = Arc::clone(self.owner_pods.entry(pid_namespace).or_insert(pod).value());
                (pod, OwnerLookup::Resolved)
            }
        };

        self.informer.fetch_pod_owner_info(&pod);
        self.metrics
            .record_owner_lookup(outcome, start.elapsed().as_secs_f64());
        Some(pod)
    }

    /// Map every IP of `pod` to it.
    pub fn update_new_pods_by_ip_index(&self, pod: &Arc<PodInfo>) {
        self.pods_by_ip.insert_all(pod);
        self.metrics
            .set_ip_index_entries(ResourceKind::Pod, self.pods_by_ip.len());
    }

    /// Unmap every IP of `pod`.
    pub fn update_deleted_pods_by_ip_index(&self, pod: &PodInfo) {
        self.pods_by_ip.remove_all(pod);
        self.metrics
            .set_ip_index_entries(ResourceKind::Pod, self.pods_by_ip.len());
    }

    /// Pod currently mapped to `ip`.
    pub fn pod_info_for_ip(&self, ip: &str) -> Option<Arc<PodInfo>> {
        let pod = self.pods_by_ip.get(ip);
        self.metrics.record_ip_lookup(ResourceKind::Pod, pod.is_some());
        pod
    }

    /// Map every IP of `svc` to it.
    pub fn update_new_services_by_ip_index(&self, svc: &Arc<ServiceInfo>) {
        self.services_by_ip.insert_all(svc);
        self.metrics
            .set_ip_index_entries(ResourceKind::Service, self.services_by_ip.len());
    }

    /// Unmap every IP of `svc`.
    pub fn update_deleted_services_by_ip_index(&self, svc: &ServiceInfo) {
        self.services_by_ip.remove_all(svc);
        self.metrics
            .set_ip_index_entries(ResourceKind::Service, self.services_by_ip.len());
    }

    /// Service currently mapped to `ip`.
    pub fn service_info_for_ip(&self, ip: &str) -> Option<Arc<ServiceInfo>> {
        let svc = self.services_by_ip.get(ip);
        self.metrics
            .record_ip_lookup(ResourceKind::Service, svc.is_some());
        svc
    }

    /// Map every IP of `node` to it.
    pub fn update_new_nodes_by_ip_index(&self, node: &Arc<NodeInfo>) {
        self.nodes_by_ip.insert_all(node);
        self.metrics
            .set_ip_index_entries(ResourceKind::Node, self.nodes_by_ip.len());
    }

    /// Unmap every IP of `node`.
    pub fn update_deleted_nodes_by_ip_index(&self, node: &NodeInfo) {
        self.nodes_by_ip.remove_all(node);
        self.metrics
            .set_ip_index_entries(ResourceKind::Node, self.nodes_by_ip.len());
    }

    /// Node currently mapped to `ip`.
    pub fn node_info_for_ip(&self, ip: &str) -> Option<Arc<NodeInfo>> {
        let node = self.nodes_by_ip.get(ip);
        self.metrics.record_ip_lookup(ResourceKind::Node, node.is_some());
        node
    }

    /// Display name of the owner of `ip`: service, then pod, then node.
    /// Empty if the IP is unknown.
    pub fn host_name_for_ip(&self, ip: &str) -> String {
        if let Some(svc) = self.services_by_ip.get(ip) {
            return svc.name.clone();
        }
        if let Some(pod) = self.pods_by_ip.get(ip) {
            return pod.name.clone();
        }
        if let Some(node) = self.nodes_by_ip.get(ip) {
            return node.name.clone();
        }
        String::new()
    }

    /// Service name and namespace of the owner of `ip`, with the same
    /// precedence as [`Database::host_name_for_ip`]. Pods report their
    /// logical service name so replicas group together.
    pub fn service_name_namespace_for_ip(&self, ip: &str) -> (String, String) {
        if let Some(svc) = self.services_by_ip.get(ip) {
            return (svc.name.clone(), svc.namespace.clone());
        }
        if let Some(pod) = self.pods_by_ip.get(ip) {
            return (pod.service_name(), pod.namespace.clone());
        }
        if let Some(node) = self.nodes_by_ip.get(ip) {
            return (node.name.clone(), node.namespace.clone());
        }
        (String::new(), String::new())
    }

    /// Entry counts of every index.
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            containers: self.containers.len(),
            namespaces: self.namespaces.len(),
            owner_pods: self.owner_pods.len(),
            pods_by_ip: self.pods_by_ip.len(),
            services_by_ip: self.services_by_ip.len(),
            nodes_by_ip: self.nodes_by_ip.len(),
        }
    }
}

impl ContainerEventHandler for Database {
    fn on_deletion(&self, container_ids: &[String]) {
        Database::on_deletion(self, container_ids);
    }
}

// Updates are applied as delete-old then add-new in two separate critical
// sections, so readers may briefly see neither mapping.

impl ResourceEventHandler<PodInfo> for Database {
    fn on_add(&self, pod: &Arc<PodInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Pod, EventAction::Add);
        self.update_new_pods_by_ip_index(pod);
    }

    fn on_update(&self, old: &Arc<PodInfo>, new: &Arc<PodInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Pod, EventAction::Update);
        self.update_deleted_pods_by_ip_index(old);
        self.update_new_pods_by_ip_index(new);
    }

    fn on_delete(&self, pod: &Arc<PodInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Pod, EventAction::Delete);
        self.update_deleted_pods_by_ip_index(pod);
    }
}

impl ResourceEventHandler<ServiceInfo> for Database {
    fn on_add(&self, svc: &Arc<ServiceInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Service, EventAction::Add);
        self.update_new_services_by_ip_index(svc);
    }

    fn on_update(&self, old: &Arc<ServiceInfo>, new: &Arc<ServiceInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Service, EventAction::Update);
        self.update_deleted_services_by_ip_index(old);
        self.update_new_services_by_ip_index(new);
    }

    fn on_delete(&self, svc: &Arc<ServiceInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Service, EventAction::Delete);
        self.update_deleted_services_by_ip_index(svc);
    }
}

impl ResourceEventHandler<NodeInfo> for Database {
    fn on_add(&self, node: &Arc<NodeInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Node, EventAction::Add);
        self.update_new_nodes_by_ip_index(node);
    }

    fn on_update(&self, old: &Arc<NodeInfo>, new: &Arc<NodeInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Node, EventAction::Update);
        self.update_deleted_nodes_by_ip_index(old);
        self.update_new_nodes_by_ip_index(new);
    }

    fn on_delete(&self, node: &Arc<NodeInfo>) {
        self.metrics
            .record_informer_event(ResourceKind::Node, EventAction::Delete);
        self.update_deleted_nodes_by_ip_index(node);
    }
}
