//! DNS records for load balancers.
//!
//! A [`Nameserver`] binds a stable host name to a load balancer's address
//! with a CNAME. [`ZoneNameserver`] implements it against a hosted zone of a
//! [`DnsBackend`], qualifying bare host names with the zone's domain:
//! `acme` in zone `empire.` becomes `acme.empire.`.

use std::sync::Arc;

use async_trait::async_trait;
use convoy_core::BackendError;
use tracing::debug;

/// Default TTL for CNAME records, in seconds.
pub const DEFAULT_TTL: u32 = 60;

pub type DnsResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    A,
    Cname,
}

/// A record set in a hosted zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecordSet {
    /// Fully-qualified name, with trailing dot.
    pub name: String,
    pub record_type: RecordType,
    pub ttl: u32,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Create the record, or overwrite an existing one.
    Upsert,
    /// Delete a record. The record must match exactly.
    Delete,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub action: ChangeAction,
    pub record: ResourceRecordSet,
}

/// Contract expected from the DNS backend.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    /// Domain name of a hosted zone, with trailing dot.
    async fn zone_name(&self, zone_id: &str) -> DnsResult<String>;

    /// Record sets in the zone named exactly `name`.
    async fn list_records(&self, zone_id: &str, name: &str) -> DnsResult<Vec<ResourceRecordSet>>;

    /// Apply a batch of changes atomically.
    async fn change_records(&self, zone_id: &str, changes: Vec<Change>) -> DnsResult<()>;
}

#[async_trait]
pub trait Nameserver: Send + Sync {
    /// Point `host` at `target`, creating or overwriting the record.
    async fn create_or_update_record(&self, host: &str, target: &str) -> DnsResult<()>;

    /// Remove the record for `host` if it still points at `target`. Absent
    /// records, and records repointed elsewhere, are left alone.
    async fn delete_record(&self, host: &str, target: &str) -> DnsResult<()>;
}

/// A [`Nameserver`] managing CNAMEs in one hosted zone.
pub struct ZoneNameserver {
    backend: Arc<dyn DnsBackend>,
    zone_id: String,
    ttl: u32,
}

impl ZoneNameserver {
    pub fn new(backend: Arc<dyn DnsBackend>, zone_id: impl Into<String>) -> Self {
        Self {
            backend,
            zone_id: zone_id.into(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    async fn fqdn(&self, host: &str) -> DnsResult<String> {
        if host.ends_with('.') {
            return Ok(host.to_string());
        }
        let zone = self.backend.zone_name(&self.zone_id).await?;
        Ok(qualify(host, &zone))
    }
}

#[async_trait]
impl Nameserver for ZoneNameserver {
    async fn create_or_update_record(&self, host: &str, target: &str) -> DnsResult<()> {
        let name = self.fqdn(host).await?;
        let change = Change {
            action: ChangeAction::Upsert,
            record: ResourceRecordSet {
                name: name.clone(),
                record_type: RecordType::Cname,
                ttl: self.ttl,
                values: vec![target.to_string()],
            },
        };
        self.backend.change_records(&self.zone_id, vec![change]).await?;
        debug!(zone = %self.zone_id, %name, %target, "cname upserted");
        Ok(())
    }

    async fn delete_record(&self, host: &str, target: &str) -> DnsResult<()> {
        let name = self.fqdn(host).await?;
        let existing = self.backend.list_records(&self.zone_id, &name).await?;

        let changes: Vec<Change> = existing
            .into_iter()
            .filter(|r| r.record_type == RecordType::Cname && r.values == [target])
            .map(|record| Change {
                action: ChangeAction::Delete,
                record,
            })
            .collect();

        if changes.is_empty() {
            debug!(zone = %self.zone_id, %name, "no cname to delete");
            return Ok(());
        }

        self.backend.change_records(&self.zone_id, changes).await?;
        debug!(zone = %self.zone_id, %name, "cname deleted");
        Ok(())
    }
}

/// Join a host name and a zone domain into a fully-qualified name.
pub fn qualify(host: &str, zone: &str) -> String {
    let zone = zone.trim_end_matches('.');
    let host = host.trim_end_matches('.');
    if host == zone || host.ends_with(&format!(".{zone}")) {
        format!("{host}.")
    } else {
        format!("{host}.{zone}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryZone;

    fn zone() -> Arc<InMemoryZone> {
        let zone = InMemoryZone::new();
        zone.add_zone("Z123", "empire.");
        Arc::new(zone)
    }

    #[test]
    fn qualify_format() {
        assert_eq!(qualify("acme", "empire."), "acme.empire.");
        assert_eq!(qualify("acme", "empire"), "acme.empire.");
        assert_eq!(qualify("acme.empire", "empire."), "acme.empire.");
    }

    #[tokio::test]
    async fn upsert_creates_cname() {
        let backend = zone();
        let ns = ZoneNameserver::new(backend.clone(), "Z123");

        ns.create_or_update_record("acme", "lb1.elb.local").await.unwrap();

        let records = backend.records("Z123");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "acme.empire.");
        assert_eq!(records[0].record_type, RecordType::Cname);
        assert_eq!(records[0].ttl, DEFAULT_TTL);
        assert_eq!(records[0].values, vec!["lb1.elb.local"]);
    }

    #[tokio::test]
    async fn upsert_overwrites_instead_of_duplicating() {
        let backend = zone();
        let ns = ZoneNameserver::new(backend.clone(), "Z123").with_ttl(30);

        ns.create_or_update_record("acme", "lb1.elb.local").await.unwrap();
        ns.create_or_update_record("acme", "lb2.elb.local").await.unwrap();

        let records = backend.records("Z123");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values, vec!["lb2.elb.local"]);
        assert_eq!(records[0].ttl, 30);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let backend = zone();
        let ns = ZoneNameserver::new(backend.clone(), "Z123");

        ns.create_or_update_record("acme", "lb1.elb.local").await.unwrap();
        ns.delete_record("acme", "lb1.elb.local").await.unwrap();
        assert!(backend.records("Z123").is_empty());
    }

    #[tokio::test]
    async fn delete_keeps_record_pointing_elsewhere() {
        let backend = zone();
        let ns = ZoneNameserver::new(backend.clone(), "Z123");

        ns.create_or_update_record("acme", "lb2.elb.local").await.unwrap();
        ns.delete_record("acme", "lb1.elb.local").await.unwrap();
        assert_eq!(
            backend.resolve("Z123", "acme.empire."),
            Some("lb2.elb.local".to_string())
        );
    }

    #[tokio::test]
    async fn delete_absent_record_is_noop() {
        let backend = zone();
        let ns = ZoneNameserver::new(backend, "Z123");
        ns.delete_record("acme", "lb1.elb.local").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_zone_is_an_error() {
        let backend = zone();
        let ns = ZoneNameserver::new(backend, "Z999");
        let err = ns.create_or_update_record("acme", "lb1").await.unwrap_err();
        assert_eq!(err.code, "NoSuchHostedZone");
    }
}
