//! Load balancing error types.

use convoy_core::{BackendError, Partial};
use thiserror::Error;

use crate::manager::LoadBalancer;

/// Errors that can occur while managing load balancers and their DNS records.
#[derive(Debug, Error)]
pub enum LbError {
    #[error("load balancing backend error: {0}")]
    Backend(#[from] BackendError),

    /// The load balancer exists but its attributes could not be set.
    #[error("load balancer {name} created but not fully provisioned: {source}")]
    PartiallyProvisioned {
        name: String,
        #[source]
        source: BackendError,
    },

    /// The DNS step failed. For creations, `load_balancer` carries the load
    /// balancer that was created anyway.
    #[error("dns record for {host} failed: {source}")]
    Dns {
        host: String,
        load_balancer: Option<Box<LoadBalancer>>,
        #[source]
        source: BackendError,
    },
}

pub type LbResult<T> = Result<T, LbError>;

/// Result of a listing that may fail after gathering some items.
pub type ListResult<T> = Result<Vec<T>, Partial<Vec<T>, LbError>>;

impl<T> From<Partial<T, LbError>> for LbError {
    fn from(partial: Partial<T, LbError>) -> Self {
        partial.source
    }
}
