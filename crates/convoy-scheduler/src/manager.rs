//! The process manager contract.

use async_trait::async_trait;
use convoy_core::{App, Process};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{ListResult, SchedulerResult};

/// Standard streams of an attached one-off process.
pub struct Attach {
    pub stdin: Box<dyn AsyncRead + Send + Unpin>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
}

impl Attach {
    /// Human-readable run mode, `attached` or `detached`.
    pub fn mode(attach: Option<&Attach>) -> &'static str {
        match attach {
            Some(_) => "attached",
            None => "detached",
        }
    }
}

/// Direct control over the individual processes of an app.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Create or update the process. Idempotent.
    async fn create_process(&self, app: &App, process: &Process) -> SchedulerResult<()>;

    /// Remove the process. Removing a process that does not exist succeeds.
    async fn remove_process(&self, app_id: &str, process_type: &str) -> SchedulerResult<()>;

    /// Every provisioned process of the app, as the backend reports it.
    async fn processes(&self, app_id: &str) -> ListResult<Process>;

    /// Set the desired replica count of one process.
    async fn scale(&self, app_id: &str, process_type: &str, instances: u32) -> SchedulerResult<()>;

    /// Run a one-off process, attached to `attach` when given.
    async fn run(&self, app: &App, process: &Process, attach: Option<Attach>)
    -> SchedulerResult<()>;
}
