//! Error types for the metadata database

use crate::informer::ResourceKind;
use thiserror::Error;

/// Errors surfaced while starting the database
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("can't register database as {kind} event handler: {source}")]
    Registration {
        kind: ResourceKind,
        #[source]
        source: InformerError,
    },
}

/// Errors returned by an informer
#[derive(Debug, Error)]
pub enum InformerError {
    #[error("{0} informer is stopped")]
    Stopped(ResourceKind),

    #[error("{kind} informer rejected handler: {reason}")]
    Rejected { kind: ResourceKind, reason: String },
}

/// Errors returned while inspecting a process
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("reading {path} for pid {pid}: {source}")]
    Io {
        pid: u32,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pid {0} does not belong to a container")]
    NoContainer(u32),

    #[error("pid {pid} has malformed pid namespace link {link:?}")]
    MalformedNamespace { pid: u32, link: String },
}
