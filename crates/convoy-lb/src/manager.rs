//! The load balancer manager contract shared by the ELB implementation and
//! its decorators.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{LbResult, ListResult};

/// Tag carrying the owning app's id.
pub const APP_ID_TAG: &str = "AppID";

/// Tag carrying the owning process type.
pub const PROCESS_TYPE_TAG: &str = "ProcessType";

/// Key/value tags used for ownership and discovery.
pub type Tags = BTreeMap<String, String>;

/// Ownership tags for the load balancer of `(app_id, process_type)`.
pub fn ownership_tags(app_id: &str, process_type: &str) -> Tags {
    Tags::from([
        (APP_ID_TAG.to_string(), app_id.to_string()),
        (PROCESS_TYPE_TAG.to_string(), process_type.to_string()),
    ])
}

/// A provisioned load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    /// Generated, opaque name.
    pub name: String,
    pub dns_name: String,
    /// Internet-facing when true, internal otherwise.
    pub external: bool,
    pub ssl_cert: Option<String>,
    /// Port traffic is forwarded to. `None` for a load balancer without
    /// listeners.
    pub instance_port: Option<u16>,
    pub tags: Tags,
}

impl LoadBalancer {
    /// The app that owns this load balancer, per its tags.
    pub fn app_id(&self) -> Option<&str> {
        self.tags.get(APP_ID_TAG).map(String::as_str)
    }
}

/// Options for creating a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateLoadBalancerOpts {
    pub external: bool,
    pub instance_port: u16,
    pub ssl_cert: Option<String>,
    /// Written atomically with creation.
    pub tags: Tags,
}

#[async_trait]
pub trait LoadBalancerManager: Send + Sync {
    async fn create_load_balancer(&self, opts: CreateLoadBalancerOpts) -> LbResult<LoadBalancer>;

    async fn destroy_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()>;

    /// Load balancers whose tags are a superset of `tags`. An empty filter
    /// matches every load balancer.
    async fn load_balancers(&self, tags: &Tags) -> ListResult<LoadBalancer>;

    /// Re-apply state that decorators keep alongside an existing load
    /// balancer, such as its DNS record. Safe to repeat; decorators must
    /// forward to their inner manager.
    async fn reconcile_load_balancer(&self, lb: &LoadBalancer) -> LbResult<()> {
        let _ = lb;
        Ok(())
    }
}

/// True when every entry of `filter` is present in `tags`.
pub fn contains_tags(filter: &Tags, tags: &Tags) -> bool {
    filter.iter().all(|(k, v)| tags.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let tags = ownership_tags("acme", "web");
        assert!(contains_tags(&Tags::new(), &tags));
        assert!(contains_tags(&Tags::new(), &Tags::new()));
    }

    #[test]
    fn filter_must_be_a_subset() {
        let tags = ownership_tags("acme", "web");
        let by_app = Tags::from([(APP_ID_TAG.to_string(), "acme".to_string())]);
        assert!(contains_tags(&by_app, &tags));

        let other_app = Tags::from([(APP_ID_TAG.to_string(), "other".to_string())]);
        assert!(!contains_tags(&other_app, &tags));

        let mut wider = ownership_tags("acme", "web");
        wider.insert("Env".to_string(), "prod".to_string());
        assert!(!contains_tags(&wider, &tags));
    }

    #[test]
    fn app_id_comes_from_tags() {
        let lb = LoadBalancer {
            name: "abc".to_string(),
            dns_name: "abc.elb.local".to_string(),
            external: false,
            ssl_cert: None,
            instance_port: Some(9000),
            tags: ownership_tags("acme", "web"),
        };
        assert_eq!(lb.app_id(), Some("acme"));
    }
}
