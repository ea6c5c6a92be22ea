//! In-process informer backed by plain maps
//!
//! Objects are pushed in with `apply_*` / `delete_*` (from a static inventory
//! or from tests) and fanned out to registered handlers in the same order
//! they were stored.

use super::{ContainerEventHandler, Informer, ResourceEventHandler, ResourceKind};
use crate::error::InformerError;
use crate::models::{object_key, NodeInfo, OwnerKind, PodInfo, ServiceInfo};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Replica set → deployment relation, as found in the replica set's owner references
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaSetEntry {
    pub namespace: String,
    pub name: String,
    pub deployment: String,
}

/// Static cluster snapshot used to seed a [`MemoryInformer`]
#[derive(Debug, Default, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub pods: Vec<PodInfo>,
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub replica_sets: Vec<ReplicaSetEntry>,
}

impl Inventory {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// One object family: its store, its handlers, and a delivery lock that
/// keeps notifications in store order.
struct Family<T> {
    kind: ResourceKind,
    objects: RwLock<HashMap<String, Arc<T>>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<T>>>>,
    delivery: Mutex<()>,
}

impl<T> Family<T> {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            objects: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            delivery: Mutex::new(()),
        }
    }

    fn handlers(&self) -> Vec<Arc<dyn ResourceEventHandler<T>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a handler, replaying the current objects to it as adds
    fn register(&self, handler: Arc<dyn ResourceEventHandler<T>>) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let existing: Vec<Arc<T>> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for obj in &existing {
            handler.on_add(obj);
        }
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
        debug!(kind = %self.kind, replayed = existing.len(), "Registered event handler");
    }

    fn apply(&self, key: String, obj: Arc<T>) -> Option<Arc<T>> {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let old = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&obj));
        for handler in self.handlers() {
            match &old {
                Some(old) => handler.on_update(old, &obj),
                None => handler.on_add(&obj),
            }
        }
        old
    }

    fn delete(&self, key: &str) -> Option<Arc<T>> {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if let Some(obj) = &removed {
            for handler in self.handlers() {
                handler.on_delete(obj);
            }
        }
        removed
    }

    fn get(&self, key: &str) -> Option<Arc<T>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Informer holding the whole cluster view in memory
pub struct MemoryInformer {
    pods: Family<PodInfo>,
    services: Family<ServiceInfo>,
    nodes: Family<NodeInfo>,
    /// container ID → pod running it
    containers: RwLock<HashMap<String, Arc<PodInfo>>>,
    /// `namespace/replicaset` → deployment name
    replica_sets: RwLock<HashMap<String, String>>,
    container_handlers: RwLock<Vec<Arc<dyn ContainerEventHandler>>>,
    stopped: AtomicBool,
}

impl Default for MemoryInformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInformer {
    pub fn new() -> Self {
        Self {
            pods: Family::new(ResourceKind::Pod),
            services: Family::new(ResourceKind::Service),
            nodes: Family::new(ResourceKind::Node),
            containers: RwLock::new(HashMap::new()),
            replica_sets: RwLock::new(HashMap::new()),
            container_handlers: RwLock::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Stop accepting new handlers. Already registered handlers keep
    /// receiving events.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn check_running(&self, kind: ResourceKind) -> Result<(), InformerError> {
        if self.is_stopped() {
            Err(InformerError::Stopped(kind))
        } else {
            Ok(())
        }
    }

    /// Seed the informer from a static snapshot.
    /// Replica sets go first so pods resolve their deployment on first lookup.
    pub fn load(&self, inventory: Inventory) {
        let counts = (
            inventory.pods.len(),
            inventory.services.len(),
            inventory.nodes.len(),
            inventory.replica_sets.len(),
        );
        for rs in inventory.replica_sets {
            self.apply_replica_set(&rs.namespace, &rs.name, rs.deployment);
        }
        for node in inventory.nodes {
            self.apply_node(node);
        }
        for svc in inventory.services {
            self.apply_service(svc);
        }
        for pod in inventory.pods {
            self.apply_pod(pod);
        }
        info!(
            pods = counts.0,
            services = counts.1,
            nodes = counts.2,
            replica_sets = counts.3,
            "Loaded cluster inventory"
        );
    }

    /// Add or replace a pod. Containers that disappear from the pod on
    /// replacement are reported to container handlers as deleted.
    pub fn apply_pod(&self, pod: PodInfo) -> Arc<PodInfo> {
        let pod = Arc::new(pod);
        {
            let mut containers = self
                .containers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for cid in &pod.container_ids {
                containers.insert(cid.clone(), Arc::clone(&pod));
            }
        }

        let old = self.pods.apply(pod.key(), Arc::clone(&pod));

        if let Some(old) = old {
            let current: HashSet<&String> = pod.container_ids.iter().collect();
            let gone: Vec<String> = old
                .container_ids
                .iter()
                .filter(|cid| !current.contains(cid))
                .cloned()
                .collect();
            if !gone.is_empty() {
                self.forget_containers(&old, &gone);
            }
        }
        pod
    }

    pub fn delete_pod(&self, namespace: &str, name: &str) -> Option<Arc<PodInfo>> {
        let removed = self.pods.delete(&object_key(namespace, name))?;
        if !removed.container_ids.is_empty() {
            self.forget_containers(&removed, &removed.container_ids);
        }
        Some(removed)
    }

    /// Drop the containers of `owner` that are still indexed to it. A
    /// container already taken over by another pod stays live.
    fn forget_containers(&self, owner: &Arc<PodInfo>, container_ids: &[String]) {
        let forgotten: Vec<String> = {
            let mut containers = self
                .containers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            container_ids
                .iter()
                .filter(|cid| {
                    let owned = containers
                        .get(cid.as_str())
                        .is_some_and(|pod| Arc::ptr_eq(pod, owner));
                    if owned {
                        containers.remove(cid.as_str());
                    }
                    owned
                })
                .cloned()
                .collect()
        };
        if forgotten.is_empty() {
            return;
        }
        let handlers = self
            .container_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler.on_deletion(&forgotten);
        }
    }

    pub fn apply_service(&self, svc: ServiceInfo) -> Arc<ServiceInfo> {
        let svc = Arc::new(svc);
        self.services.apply(svc.key(), Arc::clone(&svc));
        svc
    }

    pub fn delete_service(&self, namespace: &str, name: &str) -> Option<Arc<ServiceInfo>> {
        self.services.delete(&object_key(namespace, name))
    }

    pub fn apply_node(&self, node: NodeInfo) -> Arc<NodeInfo> {
        let node = Arc::new(node);
        self.nodes.apply(node.key(), Arc::clone(&node));
        node
    }

    pub fn delete_node(&self, name: &str) -> Option<Arc<NodeInfo>> {
        self.nodes.delete(&object_key("", name))
    }

    pub fn apply_replica_set(&self, namespace: &str, name: &str, deployment: impl Into<String>) {
        self.replica_sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(object_key(namespace, name), deployment.into());
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Arc<PodInfo>> {
        self.pods.get(&object_key(namespace, name))
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Arc<ServiceInfo>> {
        self.services.get(&object_key(namespace, name))
    }

    pub fn node(&self, name: &str) -> Option<Arc<NodeInfo>> {
        self.nodes.get(&object_key("", name))
    }

    /// Object counts as (pods, services, nodes)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.pods.len(), self.services.len(), self.nodes.len())
    }
}

impl Informer for MemoryInformer {
    fn add_container_event_handler(&self, handler: Arc<dyn ContainerEventHandler>) {
        self.container_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    fn add_pod_event_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<PodInfo>>,
    ) -> Result<(), InformerError> {
        self.check_running(ResourceKind::Pod)?;
        self.pods.register(handler);
        Ok(())
    }

    fn add_service_event_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<ServiceInfo>>,
    ) -> Result<(), InformerError> {
        self.check_running(ResourceKind::Service)?;
        self.services.register(handler);
        Ok(())
    }

    fn add_node_event_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<NodeInfo>>,
    ) -> Result<(), InformerError> {
        self.check_running(ResourceKind::Node)?;
        self.nodes.register(handler);
        Ok(())
    }

    fn container_pod(&self, container_id: &str) -> Option<Arc<PodInfo>> {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(container_id)
            .cloned()
    }

    fn fetch_pod_owner_info(&self, pod: &PodInfo) {
        if pod.deployment_name().is_some() {
            return;
        }
        let Some(owner) = &pod.owner else {
            return;
        };
        match owner.kind {
            OwnerKind::Deployment => pod.set_deployment_name(owner.name.clone()),
            OwnerKind::ReplicaSet => {
                let deployment = self
                    .replica_sets
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&object_key(&pod.namespace, &owner.name))
                    .cloned();
                if let Some(deployment) = deployment {
                    pod.set_deployment_name(deployment);
                }
            }
            _ => {}
        }
    }
}
