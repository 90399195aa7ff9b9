//! CNAME decorator.
//!
//! Wraps a [`LoadBalancerManager`] so that every load balancer owned by an
//! app gets a CNAME from the app id to the load balancer's DNS name. The
//! composite operation is not transactional: when the DNS step fails the
//! load balancer stays, the error carries it, and retrying the same
//! operation converges because the record is upserted.
//!
//! Teardown runs in the opposite order: the record goes first, so a failed
//! DNS delete leaves the load balancer discoverable by its tags for the
//! retry. Only a record still pointing at the destroyed load balancer is
//! deleted; another process of the app may own it by now.

use async_trait::async_trait;
use tracing::debug;

use crate::dns::Nameserver;
use crate::error::{LbError, LbResult, ListResult};
use crate::manager::{CreateLoadBalancerOpts, LoadBalancer, LoadBalancerManager, Tags};

pub struct WithCname<M, N> {
    inner: M,
    nameserver: N,
}

impl<M, N> WithCname<M, N> {
    pub fn new(inner: M, nameserver: N) -> Self {
        Self { inner, nameserver }
    }
}

#[async_trait]
impl<M, N> LoadBalancerManager for WithCname<M, N>
where
    M: LoadBalancerManager,
    N: Nameserver,
{
    async fn create_load_balancer(&self, opts: CreateLoadBalancerOpts) -> LbResult<LoadBalancer> {
        let lb = self.inner.create_load_balancer(opts).await?;

        let Some(host) = lb.app_id().map(str::to_string) else {
            debug!(name = %lb.name, "load balancer has no app tag, skipping cname");
            return Ok(lb);
        };

        match self
            .nameserver
            .create_or_update_record(&host, &lb.dns_name)
            .await
        {
            Ok(()) => Ok(lb),
            Err(source) => Err(LbError::Dns {
                host,
                load_balancer: Some(Box::new(lb)),
                source,
            }),
        }
    }

    async fn destroy_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()> {
        if let Some(host) = lb.app_id() {
            self.nameserver
                .delete_record(host, &lb.dns_name)
                .await
                .map_err(|source| LbError::Dns {
                    host: host.to_string(),
                    load_balancer: Some(Box::new(lb.clone())),
                    source,
                })?;
        }
        self.inner.destroy_load_balancer(lb).await
    }

    async fn load_balancers(&self, tags: &Tags) -> ListResult<LoadBalancer> {
        self.inner.load_balancers(tags).await
    }

    async fn reconcile_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()> {
        self.inner.reconcile_load_balancer(lb).await?;

        let Some(host) = lb.app_id() else {
            return Ok(());
        };
        self.nameserver
            .create_or_update_record(host, &lb.dns_name)
            .await
            .map_err(|source| LbError::Dns {
                host: host.to_string(),
                load_balancer: Some(Box::new(lb.clone())),
                source,
            })
    }
}
