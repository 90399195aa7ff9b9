//! In-memory load-balancing and DNS backends.
//!
//! Behave like the remote services where the managers depend on it: name
//! limits, the `describe_tags` batch limit, marker pagination, idempotent
//! load balancer deletion, and exact-match DNS deletes. Failures can be
//! injected per operation.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use convoy_core::BackendError;
use tracing::debug;

use crate::backend::*;
use crate::dns::{Change, ChangeAction, DnsBackend, DnsResult, RecordType, ResourceRecordSet};

/// Operations of [`InMemoryElb`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElbOperation {
    Create,
    ModifyAttributes,
    Delete,
    Describe,
    DescribeTags,
}

/// Injected failures: the error fires on the n-th call after injection.
struct Faults<Op> {
    pending: Mutex<Vec<(Op, usize, BackendError)>>,
}

impl<Op> Default for Faults<Op> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl<Op: PartialEq + Copy> Faults<Op> {
    fn inject(&self, op: Op, nth: usize, error: BackendError) {
        self.pending
            .lock()
            .expect("faults lock")
            .push((op, nth.max(1), error));
    }

    fn check(&self, op: Op) -> Result<(), BackendError> {
        let mut pending = self.pending.lock().expect("faults lock");
        let Some(idx) = pending.iter().position(|(o, _, _)| *o == op) else {
            return Ok(());
        };
        pending[idx].1 -= 1;
        if pending[idx].1 == 0 {
            let (_, _, error) = pending.remove(idx);
            return Err(error);
        }
        Ok(())
    }
}

struct StoredLoadBalancer {
    request: CreateLoadBalancerRequest,
    description: LoadBalancerDescription,
    attributes: Option<LoadBalancerAttributes>,
}

/// An in-memory [`LoadBalancingBackend`].
pub struct InMemoryElb {
    lbs: RwLock<BTreeMap<String, StoredLoadBalancer>>,
    dns_suffix: String,
    faults: Faults<ElbOperation>,
}

impl InMemoryElb {
    pub fn new() -> Self {
        Self::with_dns_suffix("elb.local")
    }

    pub fn with_dns_suffix(suffix: &str) -> Self {
        Self {
            lbs: RwLock::new(BTreeMap::new()),
            dns_suffix: suffix.to_string(),
            faults: Faults::default(),
        }
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: ElbOperation, error: BackendError) {
        self.faults.inject(op, 1, error);
    }

    /// Fail the n-th call (1-based) of `op` with `error`.
    pub fn fail_nth(&self, op: ElbOperation, nth: usize, error: BackendError) {
        self.faults.inject(op, nth, error);
    }

    /// The request a load balancer was created with.
    pub fn created(&self, name: &str) -> Option<CreateLoadBalancerRequest> {
        let lbs = self.lbs.read().expect("elb lock");
        lbs.get(name).map(|lb| lb.request.clone())
    }

    pub fn attributes(&self, name: &str) -> Option<LoadBalancerAttributes> {
        let lbs = self.lbs.read().expect("elb lock");
        lbs.get(name).and_then(|lb| lb.attributes.clone())
    }

    /// Drop every listener of a load balancer.
    pub fn clear_listeners(&self, name: &str) {
        let mut lbs = self.lbs.write().expect("elb lock");
        if let Some(lb) = lbs.get_mut(name) {
            lb.description.listeners.clear();
        }
    }

    pub fn names(&self) -> Vec<String> {
        let lbs = self.lbs.read().expect("elb lock");
        lbs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lbs.read().expect("elb lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryElb {
    fn default() -> Self {
        Self::new()
    }
}

fn validation(message: impl Into<String>) -> BackendError {
    BackendError::new("ValidationError", message)
}

#[async_trait]
impl LoadBalancingBackend for InMemoryElb {
    async fn create_load_balancer(
        &self,
        request: CreateLoadBalancerRequest,
    ) -> Result<String, BackendError> {
        self.faults.check(ElbOperation::Create)?;

        let name = request.name.clone();
        if name.is_empty()
            || name.len() > MAX_NAME_LEN
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(validation(format!("invalid load balancer name: {name}")));
        }
        if request.listeners.is_empty() {
            return Err(validation("at least one listener is required"));
        }

        let mut lbs = self.lbs.write().expect("elb lock");
        if lbs.contains_key(&name) {
            return Err(BackendError::new(
                "DuplicateLoadBalancerName",
                format!("load balancer {name} already exists"),
            ));
        }

        let prefix = match request.scheme {
            Scheme::Internal => "internal-",
            Scheme::InternetFacing => "",
        };
        let dns_name = format!("{prefix}{name}.{}", self.dns_suffix);
        let description = LoadBalancerDescription {
            name: name.clone(),
            dns_name: dns_name.clone(),
            scheme: request.scheme,
            listeners: request.listeners.clone(),
        };
        lbs.insert(
            name.clone(),
            StoredLoadBalancer {
                request,
                description,
                attributes: None,
            },
        );
        debug!(%name, "in-memory load balancer created");
        Ok(dns_name)
    }

    async fn modify_load_balancer_attributes(
        &self,
        name: &str,
        attributes: LoadBalancerAttributes,
    ) -> Result<(), BackendError> {
        self.faults.check(ElbOperation::ModifyAttributes)?;

        let mut lbs = self.lbs.write().expect("elb lock");
        let lb = lbs.get_mut(name).ok_or_else(|| {
            BackendError::new(
                "LoadBalancerNotFound",
                format!("There is no ACTIVE Load Balancer named '{name}'"),
            )
        })?;
        lb.attributes = Some(attributes);
        Ok(())
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<(), BackendError> {
        self.faults.check(ElbOperation::Delete)?;

        let mut lbs = self.lbs.write().expect("elb lock");
        lbs.remove(name);
        Ok(())
    }

    async fn describe_load_balancers(
        &self,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<DescribeLoadBalancersPage, BackendError> {
        self.faults.check(ElbOperation::Describe)?;

        if page_size == 0 || page_size > 400 {
            return Err(validation(format!("invalid page size: {page_size}")));
        }

        let lbs = self.lbs.read().expect("elb lock");
        let start = match marker {
            Some(m) if !m.is_empty() => Bound::Excluded(m.to_string()),
            _ => Bound::Unbounded,
        };
        let mut remaining = lbs.range((start, Bound::Unbounded)).peekable();

        let mut descriptions = Vec::new();
        while descriptions.len() < page_size {
            match remaining.next() {
                Some((_, lb)) => descriptions.push(lb.description.clone()),
                None => break,
            }
        }

        let next_marker = match (remaining.peek(), descriptions.last()) {
            (Some(_), Some(last)) => Some(last.name.clone()),
            _ => None,
        };

        Ok(DescribeLoadBalancersPage {
            descriptions,
            next_marker,
        })
    }

    async fn describe_tags(&self, names: &[String]) -> Result<Vec<TagDescription>, BackendError> {
        self.faults.check(ElbOperation::DescribeTags)?;

        if names.len() > MAX_DESCRIBE_TAGS_NAMES {
            return Err(validation(format!(
                "at most {MAX_DESCRIBE_TAGS_NAMES} load balancer names may be described, got {}",
                names.len()
            )));
        }

        let lbs = self.lbs.read().expect("elb lock");
        Ok(names
            .iter()
            .filter_map(|name| {
                lbs.get(name).map(|lb| TagDescription {
                    load_balancer_name: name.clone(),
                    tags: lb.request.tags.clone(),
                })
            })
            .collect())
    }
}

// ── DNS ────────────────────────────────────────────────────────────

struct Zone {
    name: String,
    records: BTreeMap<(String, RecordType), ResourceRecordSet>,
}

/// An in-memory [`DnsBackend`] hosting any number of zones.
pub struct InMemoryZone {
    zones: RwLock<HashMap<String, Zone>>,
    faults: Faults<ChangeAction>,
}

impl InMemoryZone {
    pub fn new() -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            faults: Faults::default(),
        }
    }

    /// Host a zone. The domain is normalized to end with a dot.
    pub fn add_zone(&self, zone_id: &str, domain: &str) {
        let name = format!("{}.", domain.trim_end_matches('.'));
        let mut zones = self.zones.write().expect("dns lock");
        zones.insert(
            zone_id.to_string(),
            Zone {
                name,
                records: BTreeMap::new(),
            },
        );
    }

    /// Fail the next change batch containing `action`.
    pub fn fail_next(&self, action: ChangeAction, error: BackendError) {
        self.faults.inject(action, 1, error);
    }

    /// All records in a zone, ordered by name.
    pub fn records(&self, zone_id: &str) -> Vec<ResourceRecordSet> {
        let zones = self.zones.read().expect("dns lock");
        zones
            .get(zone_id)
            .map(|z| z.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve a CNAME by fully-qualified name.
    pub fn resolve(&self, zone_id: &str, name: &str) -> Option<String> {
        let zones = self.zones.read().expect("dns lock");
        zones
            .get(zone_id)?
            .records
            .get(&(name.to_string(), RecordType::Cname))
            .and_then(|r| r.values.first().cloned())
    }
}

impl Default for InMemoryZone {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_zone(zone_id: &str) -> BackendError {
    BackendError::new("NoSuchHostedZone", format!("No hosted zone found with ID: {zone_id}"))
}

#[async_trait]
impl DnsBackend for InMemoryZone {
    async fn zone_name(&self, zone_id: &str) -> DnsResult<String> {
        let zones = self.zones.read().expect("dns lock");
        zones
            .get(zone_id)
            .map(|z| z.name.clone())
            .ok_or_else(|| no_such_zone(zone_id))
    }

    async fn list_records(&self, zone_id: &str, name: &str) -> DnsResult<Vec<ResourceRecordSet>> {
        let zones = self.zones.read().expect("dns lock");
        let zone = zones.get(zone_id).ok_or_else(|| no_such_zone(zone_id))?;
        Ok(zone
            .records
            .values()
            .filter(|r| r.name == name)
            .cloned()
            .collect())
    }

    async fn change_records(&self, zone_id: &str, changes: Vec<Change>) -> DnsResult<()> {
        for change in &changes {
            self.faults.check(change.action)?;
        }

        let mut zones = self.zones.write().expect("dns lock");
        let zone = zones.get_mut(zone_id).ok_or_else(|| no_such_zone(zone_id))?;

        // Validate the whole batch before applying any of it.
        for change in &changes {
            let record = &change.record;
            if !record.name.ends_with(&zone.name) {
                return Err(BackendError::new(
                    "InvalidChangeBatch",
                    format!("{} is not permitted in zone {}", record.name, zone.name),
                ));
            }
            if change.action == ChangeAction::Delete {
                let key = (record.name.clone(), record.record_type);
                if zone.records.get(&key) != Some(record) {
                    return Err(BackendError::new(
                        "InvalidChangeBatch",
                        format!(
                            "Tried to delete resource record set {} but it was not found",
                            record.name
                        ),
                    ));
                }
            }
        }

        for change in changes {
            let key = (change.record.name.clone(), change.record.record_type);
            match change.action {
                ChangeAction::Upsert => {
                    zone.records.insert(key, change.record);
                }
                ChangeAction::Delete => {
                    zone.records.remove(&key);
                }
            }
        }
        Ok(())
    }
}
