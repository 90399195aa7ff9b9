//! Scheduler — reconciles apps against the cluster.
//!
//! The `Scheduler` is the façade callers use to:
//! - Submit an app: create or update every declared process, then remove
//!   process types that are no longer declared
//! - Remove an app entirely
//! - Observe and stop the running instances of an app
//!
//! It holds no state of its own; every call re-reads the backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use convoy_core::{App, Instance, Partial, Process, ProcessType, arn};
use convoy_lb::{
    DnsBackend, ElbManager, LoadBalancerManager, LoadBalancingBackend, WithCname, WithLogging,
    ZoneNameserver,
};
use tracing::{debug, info};

use crate::backend::ContainerBackend;
use crate::client::ClusterClient;
use crate::config::SchedulerConfig;
use crate::ecs::EcsProcessManager;
use crate::error::{ListResult, SchedulerError, SchedulerResult};
use crate::lb_process::LbProcessManager;
use crate::manager::{Attach, ProcessManager};

pub struct Scheduler {
    client: ClusterClient,
    manager: Box<dyn ProcessManager>,
}

impl Scheduler {
    /// A scheduler that creates services only.
    pub fn new(
        config: &SchedulerConfig,
        backend: Arc<dyn ContainerBackend>,
    ) -> SchedulerResult<Self> {
        config.validate()?;

        let client = ClusterClient::new(backend, &config.cluster, &config.delimiter);
        let manager = EcsProcessManager::new(client.clone()).with_service_role(&config.service_role);
        Ok(Self::with_process_manager(client, Box::new(manager)))
    }

    /// A scheduler that also provisions a load balancer, and a CNAME for
    /// it, for every process that publishes a port.
    pub fn load_balanced(
        config: &SchedulerConfig,
        backend: Arc<dyn ContainerBackend>,
        elb: Arc<dyn LoadBalancingBackend>,
        dns: Arc<dyn DnsBackend>,
    ) -> SchedulerResult<Self> {
        config.validate_load_balanced()?;

        let client = ClusterClient::new(backend, &config.cluster, &config.delimiter);
        let ecs = EcsProcessManager::new(client.clone()).with_service_role(&config.service_role);

        let nameserver = ZoneNameserver::new(dns, &config.zone_id).with_ttl(config.dns_ttl);
        let lb: Arc<dyn LoadBalancerManager> = Arc::new(WithLogging::new(WithCname::new(
            ElbManager::new(elb, config.elb_config()),
            nameserver,
        )));

        let manager = LbProcessManager::new(Box::new(ecs), lb);
        Ok(Self::with_process_manager(client, Box::new(manager)))
    }

    /// A scheduler over an already composed process manager.
    pub fn with_process_manager(client: ClusterClient, manager: Box<dyn ProcessManager>) -> Self {
        Self { client, manager }
    }

    /// Create or update every process of `app`, then remove the process
    /// types provisioned earlier that `app` no longer declares.
    ///
    /// Stops at the first failure. Processes handled before it stay as
    /// they are.
    pub async fn submit(&self, app: &App) -> SchedulerResult<()> {
        let existing = self.manager.processes(&app.id).await?;

        for process in &app.processes {
            self.manager
                .create_process(app, process)
                .await
                .map_err(|e| SchedulerError::process(&process.process_type, e))?;
        }

        let to_remove = diff_process_types(&existing, &app.processes);
        for process_type in &to_remove {
            self.manager
                .remove_process(&app.id, process_type)
                .await
                .map_err(|e| SchedulerError::process(process_type, e))?;
        }

        info!(
            app = %app.id,
            processes = app.processes.len(),
            removed = to_remove.len(),
            "app submitted"
        );
        Ok(())
    }

    /// Remove every process of the app.
    pub async fn remove(&self, app_id: &str) -> SchedulerResult<()> {
        let existing = self.manager.processes(app_id).await?;

        for process_type in process_types(&existing) {
            self.manager
                .remove_process(app_id, &process_type)
                .await
                .map_err(|e| SchedulerError::process(&process_type, e))?;
        }

        info!(app = %app_id, "app removed");
        Ok(())
    }

    /// Every running, pending or draining instance of the app.
    pub async fn instances(&self, app_id: &str) -> ListResult<Instance> {
        let mut instances = Vec::new();
        match self.collect_instances(app_id, &mut instances).await {
            Ok(()) => Ok(instances),
            Err(e) => Err(Partial::new(instances, e)),
        }
    }

    async fn collect_instances(
        &self,
        app_id: &str,
        instances: &mut Vec<Instance>,
    ) -> SchedulerResult<()> {
        let mut definitions: HashMap<String, Process> = HashMap::new();

        for service in self.client.app_service_names(app_id).await? {
            let task_arns = self.client.service_task_arns(&service).await?;
            if task_arns.is_empty() {
                continue;
            }

            for task in self.client.describe_tasks(&task_arns).await? {
                let process = match definitions.get(&task.task_definition_arn) {
                    Some(p) => p.clone(),
                    None => {
                        let p = self
                            .client
                            .task_definition_process(&task.task_definition_arn)
                            .await?;
                        definitions.insert(task.task_definition_arn.clone(), p.clone());
                        p
                    }
                };
                if !self.client.owns(app_id, &service, &process.process_type) {
                    continue;
                }

                let id = arn::resource_id(&task.task_arn)?.to_string();
                instances.push(Instance {
                    id,
                    process,
                    state: task.last_status,
                    updated_at: epoch_secs(),
                });
            }
        }

        debug!(app = %app_id, count = instances.len(), "listed instances");
        Ok(())
    }

    /// Stop one instance. The desired count of its process is untouched,
    /// so the backend starts a replacement.
    pub async fn stop(&self, instance_id: &str) -> SchedulerResult<()> {
        self.client.stop_task(instance_id).await?;
        info!(instance = %instance_id, "instance stopped");
        Ok(())
    }
}

#[async_trait]
impl ProcessManager for Scheduler {
    async fn create_process(&self, app: &App, process: &Process) -> SchedulerResult<()> {
        self.manager.create_process(app, process).await
    }

    async fn remove_process(&self, app_id: &str, process_type: &str) -> SchedulerResult<()> {
        self.manager.remove_process(app_id, process_type).await
    }

    async fn processes(&self, app_id: &str) -> ListResult<Process> {
        self.manager.processes(app_id).await
    }

    async fn scale(&self, app_id: &str, process_type: &str, instances: u32) -> SchedulerResult<()> {
        self.manager.scale(app_id, process_type, instances).await
    }

    async fn run(
        &self,
        app: &App,
        process: &Process,
        attach: Option<Attach>,
    ) -> SchedulerResult<()> {
        self.manager.run(app, process, attach).await
    }
}

/// Process types present in `old` but not in `new`, sorted.
pub fn diff_process_types(old: &[Process], new: &[Process]) -> Vec<ProcessType> {
    let new = process_types(new);
    process_types(old)
        .into_iter()
        .filter(|t| !new.contains(t))
        .collect()
}

fn process_types(processes: &[Process]) -> BTreeSet<ProcessType> {
    processes.iter().map(|p| p.process_type.clone()).collect()
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ContainerOperation, InMemoryCluster};
    use convoy_core::{BackendError, Image};

    fn process(process_type: &str, instances: u32) -> Process {
        let mut p = Process::new(process_type, Image::parse("acme:v1").unwrap());
        p.instances = instances;
        p
    }

    fn scheduler(cluster: Arc<InMemoryCluster>) -> Scheduler {
        let config = SchedulerConfig {
            cluster: "default".to_string(),
            ..SchedulerConfig::default()
        };
        Scheduler::new(&config, cluster).unwrap()
    }

    #[test]
    fn diff_returns_orphaned_types() {
        let old = vec![process("web", 1), process("worker", 1), process("clock", 1)];
        let new = vec![process("web", 1), process("worker", 1)];
        assert_eq!(diff_process_types(&old, &new), vec!["clock".to_string()]);
        assert!(diff_process_types(&new, &old).is_empty());
    }

    #[test]
    fn diff_is_sorted_and_deduplicated() {
        let old = vec![process("worker", 1), process("clock", 1), process("clock", 2)];
        assert_eq!(
            diff_process_types(&old, &[]),
            vec!["clock".to_string(), "worker".to_string()]
        );
    }

    #[test]
    fn epoch_secs_returns_reasonable_value() {
        // After 2024-01-01.
        assert!(epoch_secs() > 1_704_067_200);
    }

    #[test]
    fn new_requires_cluster() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let err = Scheduler::new(&SchedulerConfig::default(), cluster)
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::MissingConfig("cluster")));
    }

    #[tokio::test]
    async fn submit_converges_to_declared_processes() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let s = scheduler(cluster.clone());

        let first = App::new(
            "acme",
            vec![process("web", 1), process("worker", 1), process("clock", 1)],
        );
        s.submit(&first).await.unwrap();

        let second = App::new("acme", vec![process("web", 2), process("worker", 1)]);
        s.submit(&second).await.unwrap();

        let mut types: Vec<String> = s
            .processes("acme")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.process_type)
            .collect();
        types.sort();
        assert_eq!(types, vec!["web", "worker"]);
        assert_eq!(cluster.tasks("acme-web").len(), 2);
        assert!(cluster.tasks("acme-clock").is_empty());
    }

    #[tokio::test]
    async fn submit_failure_names_the_process() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let s = scheduler(cluster.clone());
        cluster.fail_nth(
            ContainerOperation::RegisterTaskDefinition,
            2,
            BackendError::new("ThrottlingException", "Rate exceeded"),
        );

        let app = App::new("acme", vec![process("web", 1), process("worker", 1)]);
        let err = s.submit(&app).await.unwrap_err();
        let SchedulerError::Process { process_type, .. } = err else {
            panic!("expected process error");
        };
        assert_eq!(process_type, "worker");

        // No rollback: the first process stays.
        assert!(cluster.service("acme-web").is_some());
        assert!(cluster.service("acme-worker").is_none());
    }

    #[tokio::test]
    async fn remove_deletes_every_process() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let s = scheduler(cluster.clone());
        s.submit(&App::new("acme", vec![process("web", 1), process("worker", 2)]))
            .await
            .unwrap();

        s.remove("acme").await.unwrap();
        assert!(s.processes("acme").await.unwrap().is_empty());
        assert_eq!(cluster.task_count(), 0);

        // Removing an absent app is a no-op.
        s.remove("acme").await.unwrap();
    }

    #[tokio::test]
    async fn instances_report_task_ids_and_processes() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let s = scheduler(cluster.clone());
        s.submit(&App::new("acme", vec![process("web", 2), process("worker", 1)]))
            .await
            .unwrap();

        let instances = s.instances("acme").await.unwrap();
        assert_eq!(instances.len(), 3);
        for instance in &instances {
            assert_eq!(instance.id.len(), 32);
            assert_eq!(instance.state, "RUNNING");
            assert!(instance.updated_at > 0);
        }
        let web = instances
            .iter()
            .filter(|i| i.process.process_type == "web")
            .count();
        assert_eq!(web, 2);
    }

    #[tokio::test]
    async fn instances_failure_keeps_partial_results() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let s = scheduler(cluster.clone());
        s.submit(&App::new("acme", vec![process("web", 2), process("worker", 1)]))
            .await
            .unwrap();

        cluster.fail_nth(
            ContainerOperation::ListTasks,
            2,
            BackendError::new("ThrottlingException", "Rate exceeded"),
        );
        let err = s.instances("acme").await.unwrap_err();
        assert_eq!(err.partial.len(), 2);
    }

    #[tokio::test]
    async fn stop_replaces_the_instance() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let s = scheduler(cluster.clone());
        s.submit(&App::new("acme", vec![process("web", 1)]))
            .await
            .unwrap();

        let before = s.instances("acme").await.unwrap();
        s.stop(&before[0].id).await.unwrap();

        let after = s.instances("acme").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_ne!(after[0].id, before[0].id);
        assert_eq!(cluster.service("acme-web").unwrap().desired_count, 1);
    }

    #[tokio::test]
    async fn stop_unknown_instance_fails() {
        let cluster = Arc::new(InMemoryCluster::new("default"));
        let s = scheduler(cluster);
        assert!(s.stop("does-not-exist").await.is_err());
    }
}
