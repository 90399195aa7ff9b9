//! Process manager backed by services and task definitions of a container
//! cluster.
//!
//! Each process becomes one task definition family and one service, both
//! named `{app}{delimiter}{type}`. Creation is an upsert: the service is
//! updated in place and only created when the backend reports it missing.
//! A service's load balancer attachment is fixed at creation, so a service
//! whose attachment no longer matches the process is drained, deleted and
//! created again.

use async_trait::async_trait;
use convoy_core::{App, Partial, Process};
use tracing::{debug, info, warn};

use crate::backend::{CreateService, Service, ServiceLoadBalancer, UpdateService};
use crate::classify::is_missing_service;
use crate::client::ClusterClient;
use crate::error::{ListResult, SchedulerError, SchedulerResult};
use crate::manager::{Attach, ProcessManager};
use crate::task_definition::task_definition_input;

pub struct EcsProcessManager {
    client: ClusterClient,
    /// Role attached to services that register with a load balancer.
    service_role: Option<String>,
}

impl EcsProcessManager {
    pub fn new(client: ClusterClient) -> Self {
        Self {
            client,
            service_role: None,
        }
    }

    pub fn with_service_role(mut self, role: impl Into<String>) -> Self {
        self.service_role = Some(role.into()).filter(|r| !r.is_empty());
        self
    }

    /// Update the service, or `None` when it does not exist.
    async fn update_service(&self, name: &str, process: &Process) -> SchedulerResult<Option<Service>> {
        let result = self
            .client
            .backend()
            .update_service(UpdateService {
                cluster: self.client.cluster().to_string(),
                service: name.to_string(),
                desired_count: Some(process.instances),
                task_definition: Some(name.to_string()),
            })
            .await;

        match result {
            Ok(service) => Ok(Some(service)),
            Err(e) => {
                let e = SchedulerError::from(e);
                if is_missing_service(&e) {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn create_service(&self, name: &str, process: &Process) -> SchedulerResult<Service> {
        let mut load_balancers = Vec::new();
        let mut role = None;
        if let (Some(lb), Some(port)) = (desired_load_balancer(process), process.published_port()) {
            load_balancers.push(ServiceLoadBalancer {
                container_name: process.process_type.clone(),
                container_port: port.container,
                load_balancer_name: lb.to_string(),
            });
            role = self.service_role.clone();
        }

        let service = self
            .client
            .backend()
            .create_service(CreateService {
                cluster: self.client.cluster().to_string(),
                service_name: name.to_string(),
                task_definition: name.to_string(),
                desired_count: process.instances,
                load_balancers,
                role,
            })
            .await?;
        Ok(service)
    }

    async fn update_create_service(&self, name: &str, process: &Process) -> SchedulerResult<Service> {
        if let Some(service) = self.update_service(name, process).await? {
            let attached = service
                .load_balancers
                .first()
                .map(|lb| lb.load_balancer_name.as_str());
            if attached == desired_load_balancer(process) {
                debug!(service = %name, desired = process.instances, "service updated");
                return Ok(service);
            }

            warn!(
                service = %name,
                attached = ?attached,
                desired = ?desired_load_balancer(process),
                "load balancer attachment changed, recreating service"
            );
            self.set_desired_count(name, 0).await?;
            self.delete_service(name).await?;
        }
        let service = self.create_service(name, process).await?;
        debug!(service = %name, desired = process.instances, "service created");
        Ok(service)
    }

    async fn set_desired_count(&self, name: &str, instances: u32) -> SchedulerResult<()> {
        self.client
            .backend()
            .update_service(UpdateService {
                cluster: self.client.cluster().to_string(),
                service: name.to_string(),
                desired_count: Some(instances),
                task_definition: None,
            })
            .await?;
        Ok(())
    }

    async fn delete_service(&self, name: &str) -> SchedulerResult<()> {
        self.client
            .backend()
            .delete_service(self.client.cluster(), name)
            .await?;
        Ok(())
    }
}

/// The load balancer the process's service should be attached to. Only a
/// process with a published port is attached.
fn desired_load_balancer(process: &Process) -> Option<&str> {
    process
        .published_port()
        .and(process.load_balancer.as_deref())
}

#[async_trait]
impl ProcessManager for EcsProcessManager {
    async fn create_process(&self, app: &App, process: &Process) -> SchedulerResult<()> {
        let name = self.client.service_name(&app.id, &process.process_type);

        let input = task_definition_input(&name, process)?;
        self.client.register_task_definition(input).await?;
        self.update_create_service(&name, process).await?;

        info!(app = %app.id, process = %process.process_type, instances = process.instances, "process created");
        Ok(())
    }

    async fn remove_process(&self, app_id: &str, process_type: &str) -> SchedulerResult<()> {
        match self.scale(app_id, process_type, 0).await {
            Err(e) if is_missing_service(&e) => return Ok(()),
            other => other?,
        }

        let name = self.client.service_name(app_id, process_type);
        match self.delete_service(&name).await {
            Err(e) if is_missing_service(&e) => Ok(()),
            Err(e) => Err(e),
            Ok(()) => {
                info!(app = %app_id, process = %process_type, "process removed");
                Ok(())
            }
        }
    }

    async fn processes(&self, app_id: &str) -> ListResult<Process> {
        let mut processes = Vec::new();

        let names = match self.client.app_service_names(app_id).await {
            Ok(names) => names,
            Err(e) => return Err(Partial::new(processes, e)),
        };
        if names.is_empty() {
            return Ok(processes);
        }

        let services = match self.client.describe_services(&names).await {
            Ok(services) => services,
            Err(e) => return Err(Partial::new(processes, e)),
        };

        for service in services {
            let mut process = match self
                .client
                .task_definition_process(&service.task_definition)
                .await
            {
                Ok(p) => p,
                Err(e) => return Err(Partial::new(processes, e)),
            };

            if !self.client.owns(app_id, &service.name, &process.process_type) {
                debug!(app = %app_id, service = %service.name, "service belongs to another app");
                continue;
            }

            process.instances = service.desired_count;
            process.load_balancer = service
                .load_balancers
                .first()
                .map(|lb| lb.load_balancer_name.clone());
            processes.push(process);
        }

        Ok(processes)
    }

    async fn scale(&self, app_id: &str, process_type: &str, instances: u32) -> SchedulerResult<()> {
        let name = self.client.service_name(app_id, process_type);
        self.set_desired_count(&name, instances).await?;
        debug!(service = %name, instances, "service scaled");
        Ok(())
    }

    async fn run(
        &self,
        _app: &App,
        _process: &Process,
        attach: Option<Attach>,
    ) -> SchedulerResult<()> {
        Err(SchedulerError::NotImplemented(Attach::mode(attach.as_ref())))
    }
}
