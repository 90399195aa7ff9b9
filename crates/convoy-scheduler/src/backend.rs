//! The container scheduling backend contract.
//!
//! Mirrors the subset of a cluster service (task definitions, services,
//! tasks) the process managers need. Services and task definitions are
//! addressed by name or resource name; listing calls are paginated with an
//! opaque token.

use async_trait::async_trait;
use convoy_core::BackendError;

/// Maximum services per `describe_services` call.
pub const MAX_DESCRIBE_SERVICES: usize = 10;

/// Maximum tasks per `describe_tasks` call.
pub const MAX_DESCRIBE_TASKS: usize = 100;

/// Status of a service that accepts updates.
pub const SERVICE_ACTIVE: &str = "ACTIVE";

/// Status of a deleted service. Inactive services stay describable for a
/// while but reject updates.
pub const SERVICE_INACTIVE: &str = "INACTIVE";

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub cpu: u32,
    /// Hard memory limit in megabytes.
    pub memory: u64,
    pub essential: bool,
    pub environment: Vec<KeyValuePair>,
    pub port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTaskDefinition {
    pub family: String,
    pub container_definitions: Vec<ContainerDefinition>,
}

/// A registered revision of a task definition family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub arn: String,
    pub family: String,
    pub revision: u32,
    pub container_definitions: Vec<ContainerDefinition>,
}

/// A load balancer attachment of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLoadBalancer {
    pub container_name: String,
    pub container_port: u16,
    pub load_balancer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateService {
    pub cluster: String,
    pub service_name: String,
    /// Family (latest revision), `family:revision` or resource name.
    pub task_definition: String,
    pub desired_count: u32,
    pub load_balancers: Vec<ServiceLoadBalancer>,
    /// Role the backend assumes to register tasks with load balancers.
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateService {
    pub cluster: String,
    pub service: String,
    pub desired_count: Option<u32>,
    pub task_definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub arn: String,
    pub name: String,
    pub status: String,
    pub desired_count: u32,
    pub running_count: u32,
    /// Resource name of the task definition the service runs.
    pub task_definition: String,
    pub load_balancers: Vec<ServiceLoadBalancer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task_arn: String,
    pub task_definition_arn: String,
    pub last_status: String,
    pub desired_status: String,
}

/// One page of resource names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub arns: Vec<String>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ContainerBackend: Send + Sync {
    async fn register_task_definition(
        &self,
        request: RegisterTaskDefinition,
    ) -> BackendResult<TaskDefinition>;

    async fn describe_task_definition(&self, task_definition: &str)
    -> BackendResult<TaskDefinition>;

    async fn create_service(&self, request: CreateService) -> BackendResult<Service>;

    async fn update_service(&self, request: UpdateService) -> BackendResult<Service>;

    async fn delete_service(&self, cluster: &str, service: &str) -> BackendResult<Service>;

    /// Active services of the cluster.
    async fn list_services(&self, cluster: &str, next_token: Option<&str>) -> BackendResult<Page>;

    /// At most [`MAX_DESCRIBE_SERVICES`] services by name or resource name.
    async fn describe_services(
        &self,
        cluster: &str,
        services: &[String],
    ) -> BackendResult<Vec<Service>>;

    /// Tasks started by one service.
    async fn list_tasks(
        &self,
        cluster: &str,
        service: &str,
        next_token: Option<&str>,
    ) -> BackendResult<Page>;

    /// At most [`MAX_DESCRIBE_TASKS`] tasks. Unknown tasks are omitted.
    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> BackendResult<Vec<Task>>;

    async fn stop_task(&self, cluster: &str, task: &str) -> BackendResult<Task>;
}
