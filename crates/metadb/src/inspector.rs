//! Process inspection: PID → container identity
//!
//! Reads `/proc/<pid>/cgroup` to find the container ID and the
//! `/proc/<pid>/ns/pid` link to find the PID namespace.

use crate::error::InspectError;
use crate::models::ContainerInfo;
use std::fs;
use std::path::PathBuf;

/// Resolves the container a process runs in
pub trait ContainerInspector: Send + Sync {
    fn info_for_pid(&self, pid: u32) -> Result<ContainerInfo, InspectError>;
}

/// Inspector reading a procfs mount
#[derive(Debug, Clone)]
pub struct ProcfsInspector {
    proc_root: PathBuf,
}

impl Default for ProcfsInspector {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsInspector {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn pid_namespace(&self, pid: u32) -> Result<u32, InspectError> {
        let path = self.proc_root.join(pid.to_string()).join("ns").join("pid");
        let link = fs::read_link(&path).map_err(|source| InspectError::Io {
            pid,
            path: path.display().to_string(),
            source,
        })?;
        let link = link.to_string_lossy();
        parse_pid_namespace(&link).ok_or_else(|| InspectError::MalformedNamespace {
            pid,
            link: link.to_string(),
        })
    }

    fn container_id(&self, pid: u32) -> Result<String, InspectError> {
        let path = self.proc_root.join(pid.to_string()).join("cgroup");
        let content = fs::read_to_string(&path).map_err(|source| InspectError::Io {
            pid,
            path: path.display().to_string(),
            source,
        })?;

        // v1: "<id>:<controllers>:<path>", v2: "0::<path>"
        content
            .lines()
            .filter_map(|line| line.splitn(3, ':').nth(2))
            .find_map(extract_container_id)
            .ok_or(InspectError::NoContainer(pid))
    }
}

impl ContainerInspector for ProcfsInspector {
    fn info_for_pid(&self, pid: u32) -> Result<ContainerInfo, InspectError> {
        let container_id = self.container_id(pid)?;
        let pid_namespace = self.pid_namespace(pid)?;
        Ok(ContainerInfo {
            container_id,
            pid_namespace,
        })
    }
}

/// Parse a `pid:[4026531836]` namespace link
pub fn parse_pid_namespace(link: &str) -> Option<u32> {
    link.strip_prefix("pid:[")?.strip_suffix(']')?.parse().ok()
}

/// Extract a 64-hex-digit container ID from a cgroup path.
///
/// Handles plain docker/containerd components as well as systemd scope
/// units such as `crio-<id>.scope`, `docker-<id>.scope` and
/// `cri-containerd-<id>.scope`.
pub fn extract_container_id(cgroup_path: &str) -> Option<String> {
    for part in cgroup_path.split('/').rev() {
        let part = part.strip_suffix(".scope").unwrap_or(part);
        let candidate = part.rsplit('-').next().unwrap_or(part);
        if is_container_id(candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

fn is_container_id(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}
