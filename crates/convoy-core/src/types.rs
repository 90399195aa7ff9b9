//! Domain types shared by the process managers, the load-balancer layer and
//! the scheduler façade.
//!
//! All types serialize so an [`App`] can be loaded from a TOML or JSON
//! manifest.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::image::Image;

/// Unique identifier for an application.
pub type AppId = String;

/// Name of a process type within an app (e.g. `web`, `worker`).
pub type ProcessType = String;

/// Backend-assigned identifier of a running task.
pub type InstanceId = String;

// ── App ────────────────────────────────────────────────────────────

/// A deployable application: an id plus its declared processes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    /// Stable identifier, used to namespace backend resources.
    pub id: AppId,
    /// Declared processes, in declaration order.
    #[serde(default)]
    pub processes: Vec<Process>,
}

impl App {
    pub fn new(id: impl Into<AppId>, processes: Vec<Process>) -> Self {
        Self {
            id: id.into(),
            processes,
        }
    }
}

// ── Process ────────────────────────────────────────────────────────

/// One process type within an app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Process {
    /// Process type; the key correlating this declaration to a backend
    /// service and task definition.
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    /// Shell-style command line.
    #[serde(default)]
    pub command: String,
    /// Environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub image: Image,
    /// CPU shares, in backend units.
    #[serde(default)]
    pub cpu_shares: u32,
    /// Memory limit in bytes.
    #[serde(default)]
    pub memory_limit: u64,
    /// Desired replica count.
    #[serde(default)]
    pub instances: u32,
    /// Published ports. The first entry is the one exposed through a
    /// load balancer.
    #[serde(default)]
    pub ports: Vec<PortMap>,
    /// Name of the load balancer attached to this process's service.
    #[serde(default)]
    pub load_balancer: Option<String>,
    /// Whether the load balancer is reachable from outside the VPC.
    #[serde(default)]
    pub exposure: Exposure,
    /// Certificate reference for an HTTPS listener.
    #[serde(default)]
    pub ssl_cert: Option<String>,
}

impl Process {
    /// A process with no ports, resources or environment.
    pub fn new(process_type: impl Into<ProcessType>, image: Image) -> Self {
        Self {
            process_type: process_type.into(),
            command: String::new(),
            env: HashMap::new(),
            image,
            cpu_shares: 0,
            memory_limit: 0,
            instances: 0,
            ports: Vec::new(),
            load_balancer: None,
            exposure: Exposure::Private,
            ssl_cert: None,
        }
    }

    /// The port mapping exposed through a load balancer, if any.
    pub fn published_port(&self) -> Option<&PortMap> {
        self.ports.first()
    }
}

/// A host/container port pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMap {
    pub host: u16,
    pub container: u16,
}

impl PortMap {
    pub fn new(host: u16, container: u16) -> Self {
        Self { host, container }
    }
}

/// Reachability of a process's load balancer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    /// Internal-only load balancer.
    #[default]
    Private,
    /// Internet-facing load balancer.
    Public,
}

impl Exposure {
    pub fn is_external(self) -> bool {
        self == Exposure::Public
    }
}

// ── Instance ───────────────────────────────────────────────────────

/// A single running, pending or draining unit of work, as observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    /// The process definition this instance runs.
    pub process: Process,
    /// Free-form backend status (e.g. `RUNNING`, `PENDING`).
    pub state: String,
    /// Unix timestamp (seconds) of the observation.
    pub updated_at: u64,
}
