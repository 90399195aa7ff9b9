//! convoy-lb — load balancer provisioning for Convoy processes.
//!
//! Provides the [`LoadBalancerManager`] contract, an ELB-style
//! implementation over a [`LoadBalancingBackend`], and decorators that
//! compose around any manager:
//!
//! ```text
//! WithLogging
//!   └── WithCname ── Nameserver (ZoneNameserver → DnsBackend)
//!         └── ElbManager ── LoadBalancingBackend
//! ```
//!
//! Ownership is carried entirely by tags ([`APP_ID_TAG`],
//! [`PROCESS_TYPE_TAG`]); generated names are opaque.

pub mod backend;
pub mod cname;
pub mod dns;
pub mod elb;
pub mod error;
pub mod logging;
pub mod manager;
pub mod memory;

pub use backend::LoadBalancingBackend;
pub use cname::WithCname;
pub use dns::{DnsBackend, Nameserver, ZoneNameserver};
pub use elb::{ElbConfig, ElbManager};
pub use error::{LbError, LbResult, ListResult};
pub use logging::WithLogging;
pub use manager::{
    APP_ID_TAG, CreateLoadBalancerOpts, LoadBalancer, LoadBalancerManager, PROCESS_TYPE_TAG, Tags,
    ownership_tags,
};
pub use memory::{InMemoryElb, InMemoryZone};
