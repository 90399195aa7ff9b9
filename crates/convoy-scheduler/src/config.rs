//! Scheduler configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use convoy_lb::ElbConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

pub const DEFAULT_DELIMITER: &str = "-";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cluster to create services and task definitions in.
    pub cluster: String,
    /// Role for services with a load balancer attached.
    pub service_role: String,
    pub vpc: String,
    /// Hosted zone for internal CNAME records.
    pub zone_id: String,
    pub internal_security_group_id: String,
    pub external_security_group_id: String,
    pub internal_subnet_ids: Vec<String>,
    pub external_subnet_ids: Vec<String>,
    /// Separator between app id and process type in backend names.
    pub delimiter: String,
    pub connection_draining_timeout_secs: u64,
    /// Page size for load balancer listings.
    pub describe_page_size: usize,
    /// TTL of CNAME records, in seconds.
    pub dns_ttl: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            service_role: String::new(),
            vpc: String::new(),
            zone_id: String::new(),
            internal_security_group_id: String::new(),
            external_security_group_id: String::new(),
            internal_subnet_ids: Vec::new(),
            external_subnet_ids: Vec::new(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            connection_draining_timeout_secs: 30,
            describe_page_size: 20,
            dns_ttl: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> SchedulerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> SchedulerResult<Self> {
        toml::from_str(content).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SchedulerResult<String> {
        toml::to_string_pretty(self).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    /// Fields every scheduler needs.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.cluster.is_empty() {
            return Err(SchedulerError::MissingConfig("cluster"));
        }
        if self.delimiter.is_empty() {
            return Err(SchedulerError::Config("delimiter must not be empty".to_string()));
        }
        Ok(())
    }

    /// Fields a load-balanced scheduler needs, checked in a fixed order.
    pub fn validate_load_balanced(&self) -> SchedulerResult<()> {
        self.validate()?;

        let required: [(&'static str, bool); 6] = [
            ("service_role", self.service_role.is_empty()),
            ("zone_id", self.zone_id.is_empty()),
            (
                "internal_security_group_id",
                self.internal_security_group_id.is_empty(),
            ),
            (
                "external_security_group_id",
                self.external_security_group_id.is_empty(),
            ),
            ("internal_subnet_ids", self.internal_subnet_ids.is_empty()),
            ("external_subnet_ids", self.external_subnet_ids.is_empty()),
        ];
        match required.iter().find(|(_, missing)| *missing) {
            Some((field, _)) => Err(SchedulerError::MissingConfig(*field)),
            None => Ok(()),
        }
    }

    pub fn elb_config(&self) -> ElbConfig {
        ElbConfig {
            internal_security_group_id: self.internal_security_group_id.clone(),
            external_security_group_id: self.external_security_group_id.clone(),
            internal_subnet_ids: self.internal_subnet_ids.clone(),
            external_subnet_ids: self.external_subnet_ids.clone(),
            connection_draining_timeout: Duration::from_secs(self.connection_draining_timeout_secs),
            page_size: self.describe_page_size,
        }
    }
}
