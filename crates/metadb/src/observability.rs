//! Observability infrastructure for the metadata database
//!
//! Provides:
//! - Prometheus metrics (lookup outcomes, lookup latency, index sizes, informer events)
//! - Structured JSON logging with tracing

use crate::informer::ResourceKind;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for in-memory lookups (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.000001, 0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DatabaseMetricsInner> = OnceLock::new();

/// Result label of an owner pod lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerLookup {
    CacheHit,
    Resolved,
    NoContainer,
    NoPod,
}

impl OwnerLookup {
    fn as_str(&self) -> &'static str {
        match self {
            OwnerLookup::CacheHit => "cache_hit",
            OwnerLookup::Resolved => "resolved",
            OwnerLookup::NoContainer => "no_container",
            OwnerLookup::NoPod => "no_pod",
        }
    }
}

/// Informer notification label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Add,
    Update,
    Delete,
}

impl EventAction {
    fn as_str(&self) -> &'static str {
        match self {
            EventAction::Add => "add",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
        }
    }
}

struct DatabaseMetricsInner {
    owner_lookups: IntCounterVec,
    owner_lookup_latency_seconds: Histogram,
    ip_lookups: IntCounterVec,
    informer_events: IntCounterVec,
    inspection_failures: IntCounter,
    container_deletions: IntCounter,
    containers_indexed: IntGauge,
    ip_index_entries: IntGaugeVec,
}

impl DatabaseMetricsInner {
    fn new() -> Self {
        Self {
            owner_lookups: register_int_counter_vec!(
                "metadb_owner_lookups_total",
                "Owner pod lookups by PID namespace, by outcome",
                &["result"]
            )
            .expect("Failed to register owner_lookups"),

            owner_lookup_latency_seconds: register_histogram!(
                "metadb_owner_lookup_latency_seconds",
                "Time spent resolving the owner pod of a PID namespace",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register owner_lookup_latency_seconds"),

            ip_lookups: register_int_counter_vec!(
                "metadb_ip_lookups_total",
                "Direct IP index lookups, by index and outcome",
                &["index", "result"]
            )
            .expect("Failed to register ip_lookups"),

            informer_events: register_int_counter_vec!(
                "metadb_informer_events_total",
                "Informer notifications applied to the IP indexes",
                &["kind", "action"]
            )
            .expect("Failed to register informer_events"),

            inspection_failures: register_int_counter!(
                "metadb_process_inspection_failures_total",
                "Processes dropped because their container could not be inspected"
            )
            .expect("Failed to register inspection_failures"),

            container_deletions: register_int_counter!(
                "metadb_container_deletions_total",
                "Containers removed from the database"
            )
            .expect("Failed to register container_deletions"),

            containers_indexed: register_int_gauge!(
                "metadb_containers_indexed",
                "Number of containers currently indexed"
            )
            .expect("Failed to register containers_indexed"),

            ip_index_entries: register_int_gauge_vec!(
                "metadb_ip_index_entries",
                "Number of IPs currently mapped, per index",
                &["index"]
            )
            .expect("Failed to register ip_index_entries"),
        }
    }
}

/// Database metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct DatabaseMetrics {
    _private: (),
}

impl Default for DatabaseMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DatabaseMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DatabaseMetricsInner {
        GLOBAL_METRICS.get_or_init(DatabaseMetricsInner::new)
    }

    pub fn record_owner_lookup(&self, result: OwnerLookup, duration_secs: f64) {
        let inner = self.inner();
        inner
            .owner_lookups
            .with_label_values(&[result.as_str()])
            .inc();
        inner.owner_lookup_latency_seconds.observe(duration_secs);
    }

    pub fn record_ip_lookup(&self, index: ResourceKind, hit: bool) {
        self.inner()
            .ip_lookups
            .with_label_values(&[index.as_str(), if hit { "hit" } else { "miss" }])
            .inc();
    }

    pub fn record_informer_event(&self, kind: ResourceKind, action: EventAction) {
        self.inner()
            .informer_events
            .with_label_values(&[kind.as_str(), action.as_str()])
            .inc();
    }

    pub fn inc_inspection_failures(&self) {
        self.inner().inspection_failures.inc();
    }

    pub fn inc_container_deletions(&self) {
        self.inner().container_deletions.inc();
    }

    pub fn set_containers_indexed(&self, count: usize) {
        self.inner().containers_indexed.set(count as i64);
    }

    pub fn set_ip_index_entries(&self, index: ResourceKind, count: usize) {
        self.inner()
            .ip_index_entries
            .with_label_values(&[index.as_str()])
            .set(count as i64);
    }
}

/// Structured logger for agent lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            "Metadata agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Metadata agent shutting down"
        );
    }

    pub fn log_inventory_loaded(&self, path: &str, pods: usize, services: usize, nodes: usize) {
        info!(
            event = "inventory_loaded",
            node = %self.node_name,
            path = %path,
            pods = pods,
            services = services,
            nodes = nodes,
            "Cluster inventory loaded"
        );
    }

    pub fn log_registration_failure(&self, error: &dyn std::error::Error) {
        warn!(
            event = "database_registration_failed",
            node = %self.node_name,
            error = %error,
            "Database could not register with the informer"
        );
    }
}
