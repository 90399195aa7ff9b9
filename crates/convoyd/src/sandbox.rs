//! Sandbox mode: reconciles one app manifest against in-memory backends.
//!
//! The daemon:
//! 1. Loads the manifest
//! 2. Builds the load-balanced scheduler over an in-memory cluster, load
//!    balancing backend and hosted zone
//! 3. Submits the app and reads back its processes and instances
//! 4. Optionally replays an instance log through the log streamer

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use convoy_core::{App, Instance, Process};
use convoy_lb::{InMemoryElb, InMemoryZone, LoadBalancingBackend};
use convoy_logs::{BroadcastSource, LogsStreamer, NullLogsStreamer, RecordLogsStreamer};
use convoy_scheduler::{InMemoryCluster, ProcessManager, Scheduler, SchedulerConfig};
use serde::Serialize;
use tracing::info;

/// State of the sandbox after a reconcile.
#[derive(Debug, Serialize)]
pub struct SandboxReport {
    pub app: String,
    pub processes: Vec<Process>,
    pub instances: Vec<Instance>,
    pub load_balancers: Vec<LoadBalancerSummary>,
    pub dns_records: Vec<DnsRecordSummary>,
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LoadBalancerSummary {
    pub name: String,
    pub dns_name: String,
}

#[derive(Debug, Serialize)]
pub struct DnsRecordSummary {
    pub name: String,
    pub ttl: u32,
    pub values: Vec<String>,
}

/// A configuration that passes load-balanced validation, naming sandbox
/// resources only.
pub fn default_config() -> SchedulerConfig {
    SchedulerConfig {
        cluster: "sandbox".to_string(),
        service_role: "sandbox-service-role".to_string(),
        zone_id: "ZSANDBOX".to_string(),
        internal_security_group_id: "sg-internal".to_string(),
        external_security_group_id: "sg-external".to_string(),
        internal_subnet_ids: vec!["subnet-internal".to_string()],
        external_subnet_ids: vec!["subnet-external".to_string()],
        ..SchedulerConfig::default()
    }
}

pub fn load_manifest(path: &Path) -> anyhow::Result<App> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let app = toml::from_str(&content)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(app)
}

pub async fn run(
    config: &SchedulerConfig,
    manifest: &Path,
    domain: &str,
    logs: bool,
) -> anyhow::Result<SandboxReport> {
    let app = load_manifest(manifest)?;
    info!(app = %app.id, processes = app.processes.len(), "manifest loaded");

    let cluster = Arc::new(InMemoryCluster::new(&config.cluster));
    let elb = Arc::new(InMemoryElb::new());
    let zone = Arc::new(InMemoryZone::new());
    zone.add_zone(&config.zone_id, domain);

    let scheduler = Scheduler::load_balanced(config, cluster, elb.clone(), zone.clone())?;
    info!(cluster = %config.cluster, "sandbox scheduler initialized");

    scheduler.submit(&app).await?;
    info!(app = %app.id, "app submitted");

    let processes = scheduler.processes(&app.id).await?;
    let instances = scheduler.instances(&app.id).await?;

    let load_balancers = elb
        .describe_load_balancers(None, config.describe_page_size)
        .await?
        .descriptions
        .into_iter()
        .map(|lb| LoadBalancerSummary {
            name: lb.name,
            dns_name: lb.dns_name,
        })
        .collect();
    let dns_records = zone
        .records(&config.zone_id)
        .into_iter()
        .map(|record| DnsRecordSummary {
            name: record.name,
            ttl: record.ttl,
            values: record.values,
        })
        .collect();

    let logs = if logs {
        replay_instance_log(&app, &instances).await?
    } else {
        stream_to_lines(&NullLogsStreamer, &app).await?
    };

    Ok(SandboxReport {
        app: app.id,
        processes,
        instances,
        load_balancers,
        dns_records,
        logs,
    })
}

/// Publish one record per instance and read them back through the record
/// streamer.
async fn replay_instance_log(app: &App, instances: &[Instance]) -> anyhow::Result<Vec<String>> {
    let source = Arc::new(BroadcastSource::with_capacity(instances.len()));
    let streamer = RecordLogsStreamer::new(source.clone());

    let publish = async {
        while source.subscribers(&app.id) == 0 {
            tokio::task::yield_now().await;
        }
        for instance in instances {
            source.publish(
                &app.id,
                format!(
                    "{}.{} {}",
                    instance.process.process_type, instance.id, instance.state
                ),
            );
        }
        source.close(&app.id);
    };

    let (lines, ()) = tokio::join!(stream_to_lines(&streamer, app), publish);
    lines
}

async fn stream_to_lines(streamer: &dyn LogsStreamer, app: &App) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    streamer.stream_logs(app, &mut out).await?;
    let text = String::from_utf8(out).context("log stream is not UTF-8")?;
    Ok(text.lines().map(str::to_string).collect())
}
