//! In-memory container cluster.
//!
//! Keeps task definition revisions, services and tasks for a single
//! cluster, and keeps every active service's task count at its desired
//! count: scaling launches or stops tasks, a new task definition replaces
//! them, and a stopped task is replaced by a fresh one. Errors use the
//! backend's own codes and messages so classification can be exercised
//! against it. Failures can be injected per operation.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use convoy_core::BackendError;
use tracing::debug;

use crate::backend::*;

const REGION: &str = "us-east-1";
const ACCOUNT: &str = "123456789012";

const LIST_SERVICES_PAGE: usize = 10;
const LIST_TASKS_PAGE: usize = 100;

pub const TASK_RUNNING: &str = "RUNNING";
pub const TASK_PENDING: &str = "PENDING";
pub const TASK_STOPPED: &str = "STOPPED";

/// Operations of [`InMemoryCluster`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerOperation {
    RegisterTaskDefinition,
    DescribeTaskDefinition,
    CreateService,
    UpdateService,
    DeleteService,
    ListServices,
    DescribeServices,
    ListTasks,
    DescribeTasks,
    StopTask,
}

struct StoredService {
    service: Service,
    role: Option<String>,
}

struct StoredTask {
    task: Task,
    service: String,
}

#[derive(Default)]
struct State {
    /// Revisions per family, oldest first.
    task_definitions: BTreeMap<String, Vec<TaskDefinition>>,
    services: BTreeMap<String, StoredService>,
    /// Keyed by task id, in launch order.
    tasks: BTreeMap<String, StoredTask>,
    launched: u64,
}

/// An in-memory [`ContainerBackend`] hosting one cluster.
pub struct InMemoryCluster {
    name: String,
    state: RwLock<State>,
    faults: Mutex<Vec<(ContainerOperation, usize, BackendError)>>,
}

impl InMemoryCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(State::default()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: ContainerOperation, error: BackendError) {
        self.fail_nth(op, 1, error);
    }

    /// Fail the n-th call (1-based) of `op` with `error`.
    pub fn fail_nth(&self, op: ContainerOperation, nth: usize, error: BackendError) {
        self.faults
            .lock()
            .expect("faults lock")
            .push((op, nth.max(1), error));
    }

    fn check(&self, op: ContainerOperation) -> BackendResult<()> {
        let mut faults = self.faults.lock().expect("faults lock");
        let Some(idx) = faults.iter().position(|(o, _, _)| *o == op) else {
            return Ok(());
        };
        faults[idx].1 -= 1;
        if faults[idx].1 == 0 {
            let (_, _, error) = faults.remove(idx);
            return Err(error);
        }
        Ok(())
    }

    fn check_cluster(&self, cluster: &str) -> BackendResult<()> {
        if cluster == self.name || cluster == self.cluster_arn() {
            Ok(())
        } else {
            Err(BackendError::new("ClusterNotFoundException", "Cluster not found."))
        }
    }

    fn cluster_arn(&self) -> String {
        format!("arn:aws:ecs:{REGION}:{ACCOUNT}:cluster/{}", self.name)
    }

    /// A service by name, active or not.
    pub fn service(&self, name: &str) -> Option<Service> {
        let state = self.state.read().expect("cluster lock");
        state.services.get(name).map(|s| s.service.clone())
    }

    /// The role a service was created with.
    pub fn service_role(&self, name: &str) -> Option<String> {
        let state = self.state.read().expect("cluster lock");
        state.services.get(name).and_then(|s| s.role.clone())
    }

    /// Names of every service, active or not.
    pub fn service_names(&self) -> Vec<String> {
        let state = self.state.read().expect("cluster lock");
        state.services.keys().cloned().collect()
    }

    /// Tasks of one service.
    pub fn tasks(&self, service: &str) -> Vec<Task> {
        let state = self.state.read().expect("cluster lock");
        state
            .tasks
            .values()
            .filter(|t| t.service == service)
            .map(|t| t.task.clone())
            .collect()
    }

    /// Number of tasks across all services.
    pub fn task_count(&self) -> usize {
        self.state.read().expect("cluster lock").tasks.len()
    }
}

fn service_not_found() -> BackendError {
    BackendError::new("ServiceNotFoundException", "Service not found.")
}

fn service_not_active() -> BackendError {
    BackendError::new("ServiceNotActiveException", "Service was not ACTIVE.")
}

fn invalid_parameter(message: impl Into<String>) -> BackendError {
    BackendError::new("InvalidParameterException", message)
}

/// Service name from a name or resource name.
fn service_key(service: &str) -> &str {
    service.rsplit('/').next().unwrap_or(service)
}

impl State {
    /// Resolve a family, `family:revision` or resource name.
    fn task_definition(&self, reference: &str) -> Option<&TaskDefinition> {
        let reference = reference.rsplit('/').next().unwrap_or(reference);
        let (family, revision) = match reference.split_once(':') {
            Some((family, revision)) => (family, Some(revision.parse::<u32>().ok()?)),
            None => (reference, None),
        };
        let revisions = self.task_definitions.get(family)?;
        match revision {
            Some(r) => revisions.iter().find(|td| td.revision == r),
            None => revisions.last(),
        }
    }

    fn launch(&mut self, service: &str, task_definition_arn: &str, status: &str) {
        self.launched += 1;
        let id = format!("{:08x}{}", self.launched, uuid::Uuid::new_v4().simple());
        let id = &id[..32];
        self.tasks.insert(
            id.to_string(),
            StoredTask {
                task: Task {
                    task_arn: format!("arn:aws:ecs:{REGION}:{ACCOUNT}:task/{id}"),
                    task_definition_arn: task_definition_arn.to_string(),
                    last_status: status.to_string(),
                    desired_status: TASK_RUNNING.to_string(),
                },
                service: service.to_string(),
            },
        );
    }

    /// Bring a service's tasks in line with its desired count and task
    /// definition. Replaced tasks start as `status`.
    fn converge(&mut self, name: &str, status: &str) {
        let Some(stored) = self.services.get(name) else {
            return;
        };
        let desired = stored.service.desired_count as usize;
        let task_definition = stored.service.task_definition.clone();

        self.tasks
            .retain(|_, t| t.service != name || t.task.task_definition_arn == task_definition);

        let current: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.service == name)
            .map(|(id, _)| id.clone())
            .collect();
        for id in current.iter().skip(desired) {
            self.tasks.remove(id);
        }
        for _ in current.len()..desired {
            self.launch(name, &task_definition, status);
        }

        if let Some(stored) = self.services.get_mut(name) {
            stored.service.running_count = desired as u32;
        }
    }
}

#[async_trait]
impl ContainerBackend for InMemoryCluster {
    async fn register_task_definition(
        &self,
        request: RegisterTaskDefinition,
    ) -> BackendResult<TaskDefinition> {
        self.check(ContainerOperation::RegisterTaskDefinition)?;

        if request.family.is_empty() {
            return Err(invalid_parameter("Family cannot be empty."));
        }
        if request.container_definitions.is_empty() {
            return Err(invalid_parameter("Container definitions cannot be empty."));
        }

        let mut state = self.state.write().expect("cluster lock");
        let revisions = state
            .task_definitions
            .entry(request.family.clone())
            .or_default();
        let revision = revisions.len() as u32 + 1;
        let td = TaskDefinition {
            arn: format!(
                "arn:aws:ecs:{REGION}:{ACCOUNT}:task-definition/{}:{revision}",
                request.family
            ),
            family: request.family,
            revision,
            container_definitions: request.container_definitions,
        };
        revisions.push(td.clone());
        debug!(arn = %td.arn, "in-memory task definition registered");
        Ok(td)
    }

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> BackendResult<TaskDefinition> {
        self.check(ContainerOperation::DescribeTaskDefinition)?;

        let state = self.state.read().expect("cluster lock");
        state
            .task_definition(task_definition)
            .cloned()
            .ok_or_else(|| {
                BackendError::new("ClientException", "Unable to describe task definition.")
            })
    }

    async fn create_service(&self, request: CreateService) -> BackendResult<Service> {
        self.check(ContainerOperation::CreateService)?;
        self.check_cluster(&request.cluster)?;

        let mut state = self.state.write().expect("cluster lock");
        if let Some(existing) = state.services.get(&request.service_name) {
            if existing.service.status == SERVICE_ACTIVE {
                return Err(invalid_parameter("Creation of service was not idempotent."));
            }
        }
        if !request.load_balancers.is_empty() && request.role.is_none() {
            return Err(invalid_parameter(
                "A role is required for services with load balancers.",
            ));
        }
        let task_definition = state
            .task_definition(&request.task_definition)
            .map(|td| td.arn.clone())
            .ok_or_else(|| invalid_parameter("TaskDefinition not found."))?;

        let name = request.service_name.clone();
        let service = Service {
            arn: format!("arn:aws:ecs:{REGION}:{ACCOUNT}:service/{name}"),
            name: name.clone(),
            status: SERVICE_ACTIVE.to_string(),
            desired_count: request.desired_count,
            running_count: 0,
            task_definition,
            load_balancers: request.load_balancers,
        };
        state.services.insert(
            name.clone(),
            StoredService {
                service,
                role: request.role,
            },
        );
        state.converge(&name, TASK_RUNNING);
        debug!(service = %name, "in-memory service created");

        Ok(state.services[&name].service.clone())
    }

    async fn update_service(&self, request: UpdateService) -> BackendResult<Service> {
        self.check(ContainerOperation::UpdateService)?;
        self.check_cluster(&request.cluster)?;

        let mut state = self.state.write().expect("cluster lock");
        let name = service_key(&request.service).to_string();
        let task_definition = match &request.task_definition {
            Some(reference) => Some(
                state
                    .task_definition(reference)
                    .map(|td| td.arn.clone())
                    .ok_or_else(|| invalid_parameter("TaskDefinition not found."))?,
            ),
            None => None,
        };

        let stored = state.services.get_mut(&name).ok_or_else(service_not_found)?;
        if stored.service.status != SERVICE_ACTIVE {
            return Err(service_not_active());
        }
        if let Some(count) = request.desired_count {
            stored.service.desired_count = count;
        }
        if let Some(arn) = task_definition {
            stored.service.task_definition = arn;
        }

        state.converge(&name, TASK_RUNNING);
        Ok(state.services[&name].service.clone())
    }

    async fn delete_service(&self, cluster: &str, service: &str) -> BackendResult<Service> {
        self.check(ContainerOperation::DeleteService)?;
        self.check_cluster(cluster)?;

        let mut state = self.state.write().expect("cluster lock");
        let name = service_key(service).to_string();
        let stored = state.services.get_mut(&name).ok_or_else(service_not_found)?;
        if stored.service.status != SERVICE_ACTIVE {
            return Err(service_not_active());
        }
        if stored.service.desired_count > 0 {
            return Err(invalid_parameter(
                "The service cannot be stopped while it is scaled above 0.",
            ));
        }
        stored.service.status = SERVICE_INACTIVE.to_string();
        let service = stored.service.clone();
        state.tasks.retain(|_, t| t.service != name);
        debug!(service = %name, "in-memory service deleted");
        Ok(service)
    }

    async fn list_services(&self, cluster: &str, next_token: Option<&str>) -> BackendResult<Page> {
        self.check(ContainerOperation::ListServices)?;
        self.check_cluster(cluster)?;

        let state = self.state.read().expect("cluster lock");
        let start = match next_token {
            Some(t) if !t.is_empty() => Bound::Excluded(t.to_string()),
            _ => Bound::Unbounded,
        };
        let mut active = state
            .services
            .range((start, Bound::Unbounded))
            .filter(|(_, s)| s.service.status == SERVICE_ACTIVE)
            .peekable();

        let mut page = Page::default();
        let mut last = None;
        while page.arns.len() < LIST_SERVICES_PAGE {
            match active.next() {
                Some((name, s)) => {
                    page.arns.push(s.service.arn.clone());
                    last = Some(name.clone());
                }
                None => break,
            }
        }
        if active.peek().is_some() {
            page.next_token = last;
        }
        Ok(page)
    }

    async fn describe_services(
        &self,
        cluster: &str,
        services: &[String],
    ) -> BackendResult<Vec<Service>> {
        self.check(ContainerOperation::DescribeServices)?;
        self.check_cluster(cluster)?;

        if services.len() > MAX_DESCRIBE_SERVICES {
            return Err(invalid_parameter(format!(
                "At most {MAX_DESCRIBE_SERVICES} services can be described at once."
            )));
        }

        let state = self.state.read().expect("cluster lock");
        Ok(services
            .iter()
            .filter_map(|s| state.services.get(service_key(s)))
            .map(|s| s.service.clone())
            .collect())
    }

    async fn list_tasks(
        &self,
        cluster: &str,
        service: &str,
        next_token: Option<&str>,
    ) -> BackendResult<Page> {
        self.check(ContainerOperation::ListTasks)?;
        self.check_cluster(cluster)?;

        let state = self.state.read().expect("cluster lock");
        let name = service_key(service);
        let start = match next_token {
            Some(t) if !t.is_empty() => Bound::Excluded(t.to_string()),
            _ => Bound::Unbounded,
        };
        let mut tasks = state
            .tasks
            .range((start, Bound::Unbounded))
            .filter(|(_, t)| t.service == name)
            .peekable();

        let mut page = Page::default();
        let mut last = None;
        while page.arns.len() < LIST_TASKS_PAGE {
            match tasks.next() {
                Some((id, t)) => {
                    page.arns.push(t.task.task_arn.clone());
                    last = Some(id.clone());
                }
                None => break,
            }
        }
        if tasks.peek().is_some() {
            page.next_token = last;
        }
        Ok(page)
    }

    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> BackendResult<Vec<Task>> {
        self.check(ContainerOperation::DescribeTasks)?;
        self.check_cluster(cluster)?;

        if tasks.len() > MAX_DESCRIBE_TASKS {
            return Err(invalid_parameter(format!(
                "At most {MAX_DESCRIBE_TASKS} tasks can be described at once."
            )));
        }

        let state = self.state.read().expect("cluster lock");
        Ok(tasks
            .iter()
            .filter_map(|t| state.tasks.get(service_key(t)))
            .map(|t| t.task.clone())
            .collect())
    }

    async fn stop_task(&self, cluster: &str, task: &str) -> BackendResult<Task> {
        self.check(ContainerOperation::StopTask)?;
        self.check_cluster(cluster)?;

        let mut state = self.state.write().expect("cluster lock");
        let id = service_key(task);
        let stored = state
            .tasks
            .remove(id)
            .ok_or_else(|| invalid_parameter("The referenced task was not found."))?;

        let mut stopped = stored.task;
        stopped.last_status = TASK_STOPPED.to_string();
        stopped.desired_status = TASK_STOPPED.to_string();

        // The service scheduler replaces the task to keep its desired count.
        state.converge(&stored.service, TASK_PENDING);
        debug!(task = %id, service = %stored.service, "in-memory task stopped");
        Ok(stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(family: &str) -> RegisterTaskDefinition {
        RegisterTaskDefinition {
            family: family.to_string(),
            container_definitions: vec![ContainerDefinition {
                name: "web".to_string(),
                image: "acme:v1".to_string(),
                command: vec!["acme".to_string()],
                cpu: 0,
                memory: 0,
                essential: true,
                environment: Vec::new(),
                port_mappings: Vec::new(),
            }],
        }
    }

    fn create(name: &str, desired_count: u32) -> CreateService {
        CreateService {
            cluster: "default".to_string(),
            service_name: name.to_string(),
            task_definition: name.to_string(),
            desired_count,
            load_balancers: Vec::new(),
            role: None,
        }
    }

    fn update(name: &str, desired_count: u32) -> UpdateService {
        UpdateService {
            cluster: "default".to_string(),
            service: name.to_string(),
            desired_count: Some(desired_count),
            task_definition: None,
        }
    }

    #[tokio::test]
    async fn revisions_increment_per_family() {
        let c = InMemoryCluster::new("default");
        let first = c.register_task_definition(definition("acme-web")).await.unwrap();
        let second = c.register_task_definition(definition("acme-web")).await.unwrap();
        assert_eq!((first.revision, second.revision), (1, 2));

        assert_eq!(c.describe_task_definition("acme-web").await.unwrap().revision, 2);
        assert_eq!(c.describe_task_definition("acme-web:1").await.unwrap().revision, 1);
        assert_eq!(
            c.describe_task_definition(&first.arn).await.unwrap().arn,
            first.arn
        );
        assert!(c.describe_task_definition("acme-worker").await.is_err());
    }

    #[tokio::test]
    async fn services_keep_desired_task_count() {
        let c = InMemoryCluster::new("default");
        c.register_task_definition(definition("acme-web")).await.unwrap();
        c.create_service(create("acme-web", 3)).await.unwrap();
        assert_eq!(c.tasks("acme-web").len(), 3);

        c.update_service(update("acme-web", 1)).await.unwrap();
        assert_eq!(c.tasks("acme-web").len(), 1);
    }

    #[tokio::test]
    async fn new_task_definition_replaces_tasks() {
        let c = InMemoryCluster::new("default");
        c.register_task_definition(definition("acme-web")).await.unwrap();
        c.create_service(create("acme-web", 2)).await.unwrap();
        let before = c.tasks("acme-web");

        let td = c.register_task_definition(definition("acme-web")).await.unwrap();
        c.update_service(UpdateService {
            task_definition: Some("acme-web".to_string()),
            ..update("acme-web", 2)
        })
        .await
        .unwrap();

        let after = c.tasks("acme-web");
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|t| t.task_definition_arn == td.arn));
        assert!(after.iter().all(|t| !before.contains(t)));
    }

    #[tokio::test]
    async fn update_reports_missing_and_inactive_services() {
        let c = InMemoryCluster::new("default");
        let err = c.update_service(update("acme-web", 1)).await.unwrap_err();
        assert_eq!(err.message, "Service not found.");

        c.register_task_definition(definition("acme-web")).await.unwrap();
        c.create_service(create("acme-web", 0)).await.unwrap();
        c.delete_service("default", "acme-web").await.unwrap();

        let err = c.update_service(update("acme-web", 1)).await.unwrap_err();
        assert_eq!(err.message, "Service was not ACTIVE.");
    }

    #[tokio::test]
    async fn delete_requires_zero_desired_count() {
        let c = InMemoryCluster::new("default");
        c.register_task_definition(definition("acme-web")).await.unwrap();
        c.create_service(create("acme-web", 1)).await.unwrap();

        let err = c.delete_service("default", "acme-web").await.unwrap_err();
        assert_eq!(err.code, "InvalidParameterException");
    }

    #[tokio::test]
    async fn create_is_not_idempotent_but_recreates_inactive() {
        let c = InMemoryCluster::new("default");
        c.register_task_definition(definition("acme-web")).await.unwrap();
        c.create_service(create("acme-web", 0)).await.unwrap();
        assert!(c.create_service(create("acme-web", 0)).await.is_err());

        c.delete_service("default", "acme-web").await.unwrap();
        let service = c.create_service(create("acme-web", 1)).await.unwrap();
        assert_eq!(service.status, SERVICE_ACTIVE);
    }

    #[tokio::test]
    async fn listing_pages_through_active_services() {
        let c = InMemoryCluster::new("default");
        for i in 0..15 {
            let name = format!("svc-{i:02}");
            c.register_task_definition(definition(&name)).await.unwrap();
            c.create_service(create(&name, 0)).await.unwrap();
        }
        c.delete_service("default", "svc-03").await.unwrap();

        let first = c.list_services("default", None).await.unwrap();
        assert_eq!(first.arns.len(), 10);
        let token = first.next_token.clone().unwrap();
        let second = c.list_services("default", Some(&token)).await.unwrap();
        assert_eq!(second.arns.len(), 4);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn describe_limits_batch_size() {
        let c = InMemoryCluster::new("default");
        let names: Vec<String> = (0..11).map(|i| format!("svc-{i}")).collect();
        let err = c.describe_services("default", &names).await.unwrap_err();
        assert_eq!(err.code, "InvalidParameterException");
    }

    #[tokio::test]
    async fn stopped_task_is_replaced() {
        let c = InMemoryCluster::new("default");
        c.register_task_definition(definition("acme-web")).await.unwrap();
        c.create_service(create("acme-web", 1)).await.unwrap();
        let task = c.tasks("acme-web").remove(0);

        let stopped = c.stop_task("default", &task.task_arn).await.unwrap();
        assert_eq!(stopped.last_status, TASK_STOPPED);

        let tasks = c.tasks("acme-web");
        assert_eq!(tasks.len(), 1);
        assert_ne!(tasks[0].task_arn, task.task_arn);
        assert_eq!(tasks[0].last_status, TASK_PENDING);
        assert_eq!(c.service("acme-web").unwrap().desired_count, 1);
    }

    #[tokio::test]
    async fn unknown_cluster_is_rejected() {
        let c = InMemoryCluster::new("default");
        let err = c.list_services("other", None).await.unwrap_err();
        assert_eq!(err.code, "ClusterNotFoundException");
    }
}
