//! App-namespaced access to a cluster.
//!
//! Services and task definition families are named
//! `{app}{delimiter}{process type}`. The helpers here page through listings,
//! honour the describe batch limits and filter by app.

use std::sync::Arc;

use convoy_core::{Process, arn};
use tracing::debug;

use crate::backend::{
    ContainerBackend, MAX_DESCRIBE_SERVICES, MAX_DESCRIBE_TASKS, RegisterTaskDefinition, Service,
    Task, TaskDefinition,
};
use crate::error::SchedulerResult;
use crate::task_definition::task_definition_to_process;

/// A cluster handle shared by the process manager and the scheduler façade.
#[derive(Clone)]
pub struct ClusterClient {
    backend: Arc<dyn ContainerBackend>,
    cluster: String,
    delimiter: String,
}

impl ClusterClient {
    pub fn new(
        backend: Arc<dyn ContainerBackend>,
        cluster: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            cluster: cluster.into(),
            delimiter: delimiter.into(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ContainerBackend> {
        &self.backend
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Name of the service and task definition family of a process.
    pub fn service_name(&self, app_id: &str, process_type: &str) -> String {
        format!("{app_id}{}{process_type}", self.delimiter)
    }

    /// True when `service_name` is the service of `process_type` in
    /// `app_id`. Listing by prefix alone would also match apps whose id
    /// starts with `{app_id}{delimiter}`.
    pub fn owns(&self, app_id: &str, service_name: &str, process_type: &str) -> bool {
        service_name == self.service_name(app_id, process_type)
    }

    pub async fn register_task_definition(
        &self,
        request: RegisterTaskDefinition,
    ) -> SchedulerResult<TaskDefinition> {
        let family = request.family.clone();
        let td = self.backend.register_task_definition(request).await?;
        debug!(%family, revision = td.revision, "task definition registered");
        Ok(td)
    }

    /// Names of the app's services. Matches on the name prefix only; see
    /// [`ClusterClient::owns`].
    pub async fn app_service_names(&self, app_id: &str) -> SchedulerResult<Vec<String>> {
        let prefix = format!("{app_id}{}", self.delimiter);
        let mut names = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .backend
                .list_services(&self.cluster, token.as_deref())
                .await?;
            for service_arn in &page.arns {
                let name = arn::resource_id(service_arn)?;
                if name.starts_with(&prefix) {
                    names.push(name.to_string());
                }
            }

            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        debug!(app = %app_id, count = names.len(), "listed app services");
        Ok(names)
    }

    /// Describe services in batches of [`MAX_DESCRIBE_SERVICES`].
    pub async fn describe_services(&self, names: &[String]) -> SchedulerResult<Vec<Service>> {
        let mut services = Vec::with_capacity(names.len());
        for batch in names.chunks(MAX_DESCRIBE_SERVICES) {
            services.extend(self.backend.describe_services(&self.cluster, batch).await?);
        }
        Ok(services)
    }

    /// Resource names of every task started by `service`.
    pub async fn service_task_arns(&self, service: &str) -> SchedulerResult<Vec<String>> {
        let mut arns = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .backend
                .list_tasks(&self.cluster, service, token.as_deref())
                .await?;
            arns.extend(page.arns);

            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(arns)
    }

    /// Describe tasks in batches of [`MAX_DESCRIBE_TASKS`].
    pub async fn describe_tasks(&self, arns: &[String]) -> SchedulerResult<Vec<Task>> {
        let mut tasks = Vec::with_capacity(arns.len());
        for batch in arns.chunks(MAX_DESCRIBE_TASKS) {
            tasks.extend(self.backend.describe_tasks(&self.cluster, batch).await?);
        }
        Ok(tasks)
    }

    /// The process a task definition was registered from.
    pub async fn task_definition_process(&self, task_definition: &str) -> SchedulerResult<Process> {
        let td = self
            .backend
            .describe_task_definition(task_definition)
            .await?;
        task_definition_to_process(&td)
    }

    pub async fn stop_task(&self, task: &str) -> SchedulerResult<Task> {
        Ok(self.backend.stop_task(&self.cluster, task).await?)
    }
}
