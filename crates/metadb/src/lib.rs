//! Pod metadata database for node-level telemetry
//!
//! This crate provides the core functionality for:
//! - Indexing containers by ID and PID namespace
//! - Resolving the pod owning a PID namespace through a cluster informer
//! - Mapping IP addresses to pods, services and nodes
//! - Health checks and observability

pub mod database;
pub mod error;
pub mod health;
pub mod informer;
pub mod inspector;
pub mod models;
pub mod observability;

pub use database::{Database, DatabaseStats};
pub use error::{DatabaseError, InformerError, InspectError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use informer::{
    ContainerEventHandler, Informer, Inventory, MemoryInformer, ResourceEventHandler, ResourceKind,
};
pub use inspector::{ContainerInspector, ProcfsInspector};
pub use models::*;
pub use observability::{DatabaseMetrics, StructuredLogger};
