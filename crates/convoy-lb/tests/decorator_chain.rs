//! End-to-end tests for the full load balancer chain:
//! `WithLogging(WithCname(ElbManager, ZoneNameserver))` over the in-memory
//! backends.

use std::sync::Arc;

use convoy_core::BackendError;
use convoy_lb::dns::ChangeAction;
use convoy_lb::memory::ElbOperation;
use convoy_lb::*;

struct Harness {
    elb: Arc<InMemoryElb>,
    zone: Arc<InMemoryZone>,
    manager: Arc<dyn LoadBalancerManager>,
}

fn harness() -> Harness {
    let elb = Arc::new(InMemoryElb::new());
    let zone = Arc::new(InMemoryZone::new());
    zone.add_zone("Z42", "empire.local");

    let config = ElbConfig {
        internal_security_group_id: "sg-internal".to_string(),
        external_security_group_id: "sg-external".to_string(),
        internal_subnet_ids: vec!["subnet-a".to_string()],
        external_subnet_ids: vec!["subnet-b".to_string()],
        ..ElbConfig::default()
    };
    let manager: Arc<dyn LoadBalancerManager> = Arc::new(WithLogging::new(WithCname::new(
        ElbManager::new(elb.clone(), config),
        ZoneNameserver::new(zone.clone(), "Z42"),
    )));

    Harness { elb, zone, manager }
}

fn opts(app: &str, process_type: &str, external: bool) -> CreateLoadBalancerOpts {
    CreateLoadBalancerOpts {
        external,
        instance_port: 9000,
        ssl_cert: None,
        tags: ownership_tags(app, process_type),
    }
}

#[tokio::test]
async fn create_list_destroy_through_full_chain() {
    let h = harness();

    let web = h.manager.create_load_balancer(opts("acme", "web", true)).await.unwrap();
    let api = h
        .manager
        .create_load_balancer(opts("globex", "api", false))
        .await
        .unwrap();

    assert!(web.external);
    assert!(!api.external);
    assert_eq!(
        h.zone.resolve("Z42", "acme.empire.local."),
        Some(web.dns_name.clone())
    );
    assert_eq!(
        h.zone.resolve("Z42", "globex.empire.local."),
        Some(api.dns_name.clone())
    );

    let request = h.elb.created(&web.name).unwrap();
    assert_eq!(request.security_groups, vec!["sg-external".to_string()]);
    assert_eq!(request.subnets, vec!["subnet-b".to_string()]);

    let acme = h
        .manager
        .load_balancers(&ownership_tags("acme", "web"))
        .await
        .unwrap();
    assert_eq!(acme, vec![web.clone()]);
    assert_eq!(h.manager.load_balancers(&Tags::new()).await.unwrap().len(), 2);

    h.manager.destroy_load_balancer(&web).await.unwrap();
    assert_eq!(h.elb.names(), vec![api.name.clone()]);
    assert_eq!(h.zone.resolve("Z42", "acme.empire.local."), None);
    assert!(h.zone.resolve("Z42", "globex.empire.local.").is_some());
}

#[tokio::test]
async fn dns_failure_then_reconcile_converges() {
    let h = harness();
    h.zone.fail_next(
        ChangeAction::Upsert,
        BackendError::new("Throttling", "Rate exceeded"),
    );

    let err = h
        .manager
        .create_load_balancer(opts("acme", "web", false))
        .await
        .unwrap_err();
    let LbError::Dns {
        load_balancer: Some(lb),
        ..
    } = err
    else {
        panic!("expected dns error");
    };

    // The load balancer is discoverable by its tags even though the CNAME
    // step failed.
    let found = h
        .manager
        .load_balancers(&ownership_tags("acme", "web"))
        .await
        .unwrap();
    assert_eq!(found, vec![*lb.clone()]);

    h.manager.reconcile_load_balancer(&found[0]).await.unwrap();
    assert_eq!(h.zone.resolve("Z42", "acme.empire.local."), Some(lb.dns_name));
}

#[tokio::test]
async fn attribute_failure_leaves_partially_provisioned_lb() {
    let h = harness();
    h.elb.fail_next(
        ElbOperation::ModifyAttributes,
        BackendError::new("ValidationError", "bad attributes"),
    );

    let err = h
        .manager
        .create_load_balancer(opts("acme", "web", false))
        .await
        .unwrap_err();
    let LbError::PartiallyProvisioned { name, .. } = err else {
        panic!("expected partial provisioning");
    };
    assert_eq!(h.elb.names(), vec![name]);
    assert!(h.zone.records("Z42").is_empty());
}

#[tokio::test]
async fn listing_failure_after_first_page_is_partial() {
    let elb = Arc::new(InMemoryElb::new());
    let config = ElbConfig {
        page_size: 1,
        ..ElbConfig::default()
    };
    let manager = WithLogging::new(ElbManager::new(elb.clone(), config));

    for app in ["a", "b", "c"] {
        manager
            .create_load_balancer(opts(app, "web", false))
            .await
            .unwrap();
    }
    elb.fail_nth(
        ElbOperation::Describe,
        2,
        BackendError::new("Throttling", "Rate exceeded"),
    );

    let err = manager.load_balancers(&Tags::new()).await.unwrap_err();
    assert_eq!(err.partial.len(), 1);
    assert!(err.to_string().contains("Rate exceeded"));
}
