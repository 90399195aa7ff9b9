//! Logging decorator.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{LbResult, ListResult};
use crate::manager::{CreateLoadBalancerOpts, LoadBalancer, LoadBalancerManager, Tags};

/// Emits a structured event for every operation of the wrapped manager.
/// Results pass through unchanged.
pub struct WithLogging<M> {
    inner: M,
}

impl<M> WithLogging<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M: LoadBalancerManager> LoadBalancerManager for WithLogging<M> {
    async fn create_load_balancer(&self, opts: CreateLoadBalancerOpts) -> LbResult<LoadBalancer> {
        let external = opts.external;
        let instance_port = opts.instance_port;
        let tags = format!("{:?}", opts.tags);

        let result = self.inner.create_load_balancer(opts).await;
        match &result {
            Ok(lb) => info!(
                name = %lb.name,
                dns_name = %lb.dns_name,
                external,
                instance_port,
                %tags,
                "load balancer created"
            ),
            Err(e) => warn!(external, instance_port, %tags, error = %e, "load balancer creation failed"),
        }
        result
    }

    async fn destroy_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()> {
        let result = self.inner.destroy_load_balancer(lb).await;
        match &result {
            Ok(()) => info!(name = %lb.name, dns_name = %lb.dns_name, "load balancer destroyed"),
            Err(e) => warn!(name = %lb.name, error = %e, "load balancer destruction failed"),
        }
        result
    }

    async fn load_balancers(&self, tags: &Tags) -> ListResult<LoadBalancer> {
        let result = self.inner.load_balancers(tags).await;
        match &result {
            Ok(lbs) => info!(tags = ?tags, count = lbs.len(), "load balancers listed"),
            Err(e) => warn!(
                tags = ?tags,
                partial = e.partial.len(),
                error = %e,
                "load balancer listing failed"
            ),
        }
        result
    }

    async fn reconcile_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()> {
        let result = self.inner.reconcile_load_balancer(lb).await;
        match &result {
            Ok(()) => info!(name = %lb.name, "load balancer reconciled"),
            Err(e) => warn!(name = %lb.name, error = %e, "load balancer reconcile failed"),
        }
        result
    }
}
