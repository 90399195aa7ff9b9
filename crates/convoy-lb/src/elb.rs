//! ELB-style load balancer manager.
//!
//! Creation is a two-step protocol: the load balancer is created with its
//! listeners and ownership tags, then connection draining and cross-zone
//! balancing are enabled. A load balancer without those attributes is only
//! partially provisioned and the creation is reported as failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use convoy_core::Partial;
use tracing::debug;

use crate::backend::*;
use crate::error::{LbError, LbResult, ListResult};
use crate::manager::{CreateLoadBalancerOpts, LoadBalancer, LoadBalancerManager, Tags, contains_tags};

/// Default connection draining timeout.
pub const DEFAULT_CONNECTION_DRAINING_TIMEOUT: Duration = Duration::from_secs(30);

/// Network placement and tuning for created load balancers.
#[derive(Debug, Clone)]
pub struct ElbConfig {
    /// Security group for internal load balancers.
    pub internal_security_group_id: String,
    /// Security group for internet-facing load balancers.
    pub external_security_group_id: String,
    pub internal_subnet_ids: Vec<String>,
    pub external_subnet_ids: Vec<String>,
    pub connection_draining_timeout: Duration,
    /// Page size for `describe_load_balancers`. Capped at the tag lookup's
    /// batch limit, since each page is joined against one `describe_tags`.
    pub page_size: usize,
}

impl Default for ElbConfig {
    fn default() -> Self {
        Self {
            internal_security_group_id: String::new(),
            external_security_group_id: String::new(),
            internal_subnet_ids: Vec::new(),
            external_subnet_ids: Vec::new(),
            connection_draining_timeout: DEFAULT_CONNECTION_DRAINING_TIMEOUT,
            page_size: MAX_DESCRIBE_TAGS_NAMES,
        }
    }
}

type NameGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// A [`LoadBalancerManager`] backed by a [`LoadBalancingBackend`].
pub struct ElbManager {
    backend: Arc<dyn LoadBalancingBackend>,
    config: ElbConfig,
    new_name: NameGenerator,
}

impl ElbManager {
    pub fn new(backend: Arc<dyn LoadBalancingBackend>, config: ElbConfig) -> Self {
        Self {
            backend,
            config,
            new_name: Arc::new(new_name),
        }
    }

    /// Replace the name generator (used by tests for predictable names).
    pub fn with_name_generator<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.new_name = Arc::new(f);
        self
    }

    fn page_size(&self) -> usize {
        self.config.page_size.clamp(1, MAX_DESCRIBE_TAGS_NAMES)
    }

    /// Connection draining and cross-zone balancing, which the create call
    /// cannot set.
    async fn apply_attributes(&self, name: &str) -> LbResult<()> {
        let attributes = LoadBalancerAttributes {
            connection_draining: ConnectionDraining {
                enabled: true,
                timeout_secs: self.config.connection_draining_timeout.as_secs(),
            },
            cross_zone_load_balancing: true,
        };
        self.backend
            .modify_load_balancer_attributes(name, attributes)
            .await
            .map_err(|source| LbError::PartiallyProvisioned {
                name: name.to_string(),
                source,
            })
    }
}

#[async_trait]
impl LoadBalancerManager for ElbManager {
    async fn create_load_balancer(&self, opts: CreateLoadBalancerOpts) -> LbResult<LoadBalancer> {
        let (scheme, security_group, subnets) = if opts.external {
            (
                Scheme::InternetFacing,
                &self.config.external_security_group_id,
                &self.config.external_subnet_ids,
            )
        } else {
            (
                Scheme::Internal,
                &self.config.internal_security_group_id,
                &self.config.internal_subnet_ids,
            )
        };

        let name = (self.new_name)();
        let request = CreateLoadBalancerRequest {
            name: name.clone(),
            listeners: listeners(opts.instance_port, opts.ssl_cert.as_deref()),
            scheme,
            security_groups: vec![security_group.clone()],
            subnets: subnets.clone(),
            tags: backend_tags(&opts.tags),
        };

        let dns_name = self.backend.create_load_balancer(request).await?;
        debug!(%name, %dns_name, scheme = scheme.as_str(), "load balancer created");

        self.apply_attributes(&name).await?;

        Ok(LoadBalancer {
            name,
            dns_name,
            external: opts.external,
            ssl_cert: opts.ssl_cert.filter(|c| !c.is_empty()),
            instance_port: Some(opts.instance_port),
            tags: opts.tags,
        })
    }

    async fn destroy_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()> {
        self.backend.delete_load_balancer(&lb.name).await?;
        debug!(name = %lb.name, "load balancer deleted");
        Ok(())
    }

    async fn load_balancers(&self, filter: &Tags) -> ListResult<LoadBalancer> {
        let mut lbs = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = match self
                .backend
                .describe_load_balancers(marker.as_deref(), self.page_size())
                .await
            {
                Ok(page) => page,
                Err(e) => return Err(Partial::new(lbs, e.into())),
            };

            if page.descriptions.is_empty() {
                break;
            }

            let names: Vec<String> = page.descriptions.iter().map(|d| d.name.clone()).collect();
            let tag_descriptions = match self.backend.describe_tags(&names).await {
                Ok(t) => t,
                Err(e) => return Err(Partial::new(lbs, e.into())),
            };
            let mut tags_by_name: HashMap<String, Tags> = tag_descriptions
                .into_iter()
                .map(|d| (d.load_balancer_name, map_tags(d.tags)))
                .collect();

            for description in page.descriptions {
                // Deleted between the two calls.
                let Some(tags) = tags_by_name.remove(&description.name) else {
                    continue;
                };
                if contains_tags(filter, &tags) {
                    lbs.push(to_load_balancer(description, tags));
                }
            }

            match page.next_marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => break,
            }
        }

        Ok(lbs)
    }

    async fn reconcile_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()> {
        self.apply_attributes(&lb.name).await
    }
}

/// A fresh load balancer name: a v4 UUID as 32 lowercase hex digits.
pub fn new_name() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// HTTP on port 80, plus HTTPS on 443 when a certificate is given. Both
/// forward plain HTTP to `instance_port`.
pub fn listeners(instance_port: u16, ssl_cert: Option<&str>) -> Vec<Listener> {
    let mut listeners = vec![Listener {
        load_balancer_port: 80,
        instance_port,
        protocol: "http".to_string(),
        instance_protocol: "http".to_string(),
        ssl_certificate_id: None,
    }];

    if let Some(cert) = ssl_cert.filter(|c| !c.is_empty()) {
        listeners.push(Listener {
            load_balancer_port: 443,
            instance_port,
            protocol: "https".to_string(),
            instance_protocol: "http".to_string(),
            ssl_certificate_id: Some(cert.to_string()),
        });
    }

    listeners
}

fn backend_tags(tags: &Tags) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

fn map_tags(tags: Vec<Tag>) -> Tags {
    tags.into_iter().map(|t| (t.key, t.value)).collect()
}

fn to_load_balancer(description: LoadBalancerDescription, tags: Tags) -> LoadBalancer {
    let instance_port = description.listeners.first().map(|l| l.instance_port);
    let ssl_cert = description
        .listeners
        .iter()
        .find_map(|l| l.ssl_certificate_id.clone());

    LoadBalancer {
        name: description.name,
        dns_name: description.dns_name,
        external: description.scheme == Scheme::InternetFacing,
        ssl_cert,
        instance_port,
        tags,
    }
}
