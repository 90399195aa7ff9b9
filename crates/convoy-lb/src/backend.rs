//! Contract expected from the load-balancing backend.
//!
//! The backend is a black-box RPC service. These types model only the calls
//! and fields the [`ElbManager`](crate::elb::ElbManager) relies on.

use async_trait::async_trait;
use convoy_core::BackendError;

/// Most load balancer names accepted by a single `describe_tags` call.
pub const MAX_DESCRIBE_TAGS_NAMES: usize = 20;

/// Longest load balancer name the backend accepts.
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Internal,
    InternetFacing,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Internal => "internal",
            Scheme::InternetFacing => "internet-facing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub load_balancer_port: u16,
    pub instance_port: u16,
    pub protocol: String,
    pub instance_protocol: String,
    pub ssl_certificate_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub listeners: Vec<Listener>,
    pub scheme: Scheme,
    pub security_groups: Vec<String>,
    pub subnets: Vec<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDraining {
    pub enabled: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerAttributes {
    pub connection_draining: ConnectionDraining,
    pub cross_zone_load_balancing: bool,
}

/// A load balancer as reported by `describe_load_balancers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerDescription {
    pub name: String,
    pub dns_name: String,
    pub scheme: Scheme,
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeLoadBalancersPage {
    pub descriptions: Vec<LoadBalancerDescription>,
    /// Continuation marker; `None` or empty when there are no more pages.
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TagDescription {
    pub load_balancer_name: String,
    pub tags: Vec<Tag>,
}

#[async_trait]
pub trait LoadBalancingBackend: Send + Sync {
    /// Create a load balancer, returning its DNS name.
    async fn create_load_balancer(
        &self,
        request: CreateLoadBalancerRequest,
    ) -> Result<String, BackendError>;

    async fn modify_load_balancer_attributes(
        &self,
        name: &str,
        attributes: LoadBalancerAttributes,
    ) -> Result<(), BackendError>;

    async fn delete_load_balancer(&self, name: &str) -> Result<(), BackendError>;

    async fn describe_load_balancers(
        &self,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<DescribeLoadBalancersPage, BackendError>;

    /// Tags for at most [`MAX_DESCRIBE_TAGS_NAMES`] load balancers.
    async fn describe_tags(&self, names: &[String]) -> Result<Vec<TagDescription>, BackendError>;
}
