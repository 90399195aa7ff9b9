//! Load-balancer-aware process manager.
//!
//! Processes that publish a port get a load balancer, found again later by
//! its ownership tags. The wrapped manager only sees the load balancer's
//! name on the process it is asked to create.
//!
//! Removal destroys the load balancers before the process itself, so a
//! failed teardown leaves the process listed and a retried removal finds
//! everything again.

use std::sync::Arc;

use async_trait::async_trait;
use convoy_core::{App, Process};
use convoy_lb::{CreateLoadBalancerOpts, LoadBalancer, LoadBalancerManager, ownership_tags};
use tracing::{info, warn};

use crate::error::{ListResult, SchedulerResult};
use crate::manager::{Attach, ProcessManager};

pub struct LbProcessManager {
    inner: Box<dyn ProcessManager>,
    lb: Arc<dyn LoadBalancerManager>,
}

impl LbProcessManager {
    pub fn new(inner: Box<dyn ProcessManager>, lb: Arc<dyn LoadBalancerManager>) -> Self {
        Self { inner, lb }
    }

    /// The load balancer `process` should be attached to, provisioned or
    /// repaired as needed.
    async fn ensure_load_balancer(
        &self,
        app: &App,
        process: &Process,
        instance_port: u16,
    ) -> SchedulerResult<LoadBalancer> {
        let tags = ownership_tags(&app.id, &process.process_type);
        let external = process.exposure.is_external();

        let existing = self.lb.load_balancers(&tags).await?;
        if existing.len() > 1 {
            warn!(
                app = %app.id,
                process = %process.process_type,
                count = existing.len(),
                "multiple load balancers own this process, using the first"
            );
        }

        match existing.into_iter().next() {
            Some(lb) if lb.external == external => {
                self.lb.reconcile_load_balancer(&lb).await?;
                Ok(lb)
            }
            Some(stale) => {
                // The scheme cannot change in place: detach the service,
                // then replace the load balancer.
                info!(
                    app = %app.id,
                    process = %process.process_type,
                    name = %stale.name,
                    external,
                    "exposure changed, replacing load balancer"
                );
                self.inner
                    .remove_process(&app.id, &process.process_type)
                    .await?;
                self.lb.destroy_load_balancer(&stale).await?;
                self.create_load_balancer(external, instance_port, process, tags)
                    .await
            }
            None => {
                self.create_load_balancer(external, instance_port, process, tags)
                    .await
            }
        }
    }

    async fn create_load_balancer(
        &self,
        external: bool,
        instance_port: u16,
        process: &Process,
        tags: convoy_lb::Tags,
    ) -> SchedulerResult<LoadBalancer> {
        let lb = self
            .lb
            .create_load_balancer(CreateLoadBalancerOpts {
                external,
                instance_port,
                ssl_cert: process.ssl_cert.clone(),
                tags,
            })
            .await?;
        Ok(lb)
    }
}

#[async_trait]
impl ProcessManager for LbProcessManager {
    async fn create_process(&self, app: &App, process: &Process) -> SchedulerResult<()> {
        let Some(port) = process.published_port() else {
            return self.inner.create_process(app, process).await;
        };

        let lb = self.ensure_load_balancer(app, process, port.host).await?;

        let mut process = process.clone();
        process.load_balancer = Some(lb.name);
        self.inner.create_process(app, &process).await
    }

    async fn remove_process(&self, app_id: &str, process_type: &str) -> SchedulerResult<()> {
        let owned = self
            .lb
            .load_balancers(&ownership_tags(app_id, process_type))
            .await?;
        for lb in &owned {
            self.lb.destroy_load_balancer(lb).await?;
        }

        self.inner.remove_process(app_id, process_type).await
    }

    async fn processes(&self, app_id: &str) -> ListResult<Process> {
        self.inner.processes(app_id).await
    }

    async fn scale(&self, app_id: &str, process_type: &str, instances: u32) -> SchedulerResult<()> {
        self.inner.scale(app_id, process_type, instances).await
    }

    async fn run(
        &self,
        app: &App,
        process: &Process,
        attach: Option<Attach>,
    ) -> SchedulerResult<()> {
        self.inner.run(app, process, attach).await
    }
}
