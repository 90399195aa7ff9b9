//! convoy-scheduler — reconciles apps against a container cluster.
//!
//! Process managers compose the same way the load balancer managers do:
//!
//! ```text
//! Scheduler
//!   └── LbProcessManager ── LoadBalancerManager (convoy-lb)
//!         └── EcsProcessManager ── ClusterClient ── ContainerBackend
//! ```
//!
//! [`Scheduler::new`] skips the load balancer layer.

pub mod backend;
pub mod classify;
pub mod client;
pub mod config;
pub mod ecs;
pub mod error;
pub mod lb_process;
pub mod manager;
pub mod memory;
pub mod scheduler;
pub mod task_definition;

pub use backend::ContainerBackend;
pub use classify::is_service_not_found;
pub use client::ClusterClient;
pub use config::SchedulerConfig;
pub use ecs::EcsProcessManager;
pub use error::{ListResult, SchedulerError, SchedulerResult};
pub use lb_process::LbProcessManager;
pub use manager::{Attach, ProcessManager};
pub use memory::InMemoryCluster;
pub use scheduler::{Scheduler, diff_process_types};
