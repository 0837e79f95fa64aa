mod common;

use common::{Fault, World};
use idp_core::{ResourceKind, ResourceRef, ServiceType};
use orchestrator::{IdpConfig, Step, StepOutcome, TerminalState};

#[tokio::test]
async fn test_create_service_provisions_everything() {
    let world = World::new();
    let orchestrator = world.orchestrator(IdpConfig::default());

    let report = orchestrator
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap();

    assert_eq!(report.terminal, Some(TerminalState::Provisioned));
    assert_eq!(report.steps.len(), 11);
    assert_eq!(report.warnings().count(), 0);

    let root = world.root();
    assert!(root.join("apps/eth-collector/main.go").exists());
    assert!(root.join("apps/eth-collector/Dockerfile").exists());
    assert!(root.join("gitops/manifests/eth-collector/deployment.yaml").exists());
    assert!(root.join("gitops/apps/eth-collector.yaml").exists());
    assert!(root.join("terraform/grafana/eth-collector.tf").exists());
    // Storage manifests are applied, never committed.
    assert!(!root.join("storage").exists());

    assert!(world.exists(&ResourceRef::namespace("eth-app")));
    assert!(world.exists(&ResourceRef::persistent_volume("eth-data-pv")));
    assert!(world.exists(&ResourceRef::deployment("eth-collector", "eth-app")));
    assert!(world.exists(&World::application("eth-collector")));
    assert_eq!(world.dashboards(), vec!["grafana_dashboard.eth_collector_apm"]);
    assert_eq!(world.commits(), vec!["feat(idp): add eth-collector service"]);
    assert_eq!(world.pushes(), 1);
}

#[tokio::test]
async fn test_steps_run_in_order() {
    let world = World::new();
    world
        .orchestrator(IdpConfig::default())
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap();

    let build = world.position("builder build").unwrap();
    let import = world.position("builder import").unwrap();
    let namespace = world.position("cluster create_namespace").unwrap();
    let volume = world.position("cluster apply persistentvolume/").unwrap();
    let application = world.position("controller apply").unwrap();
    let push = world.position("vcs push").unwrap();
    let dashboard = world.position("dashboards apply").unwrap();

    assert!(build < import);
    assert!(import < namespace);
    assert!(namespace < volume);
    assert!(volume < application);
    assert!(application < push);
    assert!(push < dashboard);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let world = World::new();
    let orchestrator = world.orchestrator(IdpConfig::default());

    orchestrator
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap();
    let report = orchestrator
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap();

    assert_eq!(report.terminal, Some(TerminalState::Provisioned));
    assert!(matches!(
        report.outcome(Step::EnsureNamespace),
        Some(StepOutcome::NoOp(_))
    ));
    assert!(matches!(
        report.outcome(Step::CommitAndPush),
        Some(StepOutcome::NoOp(_))
    ));

    assert_eq!(world.count("cluster apply persistentvolume/eth-data-pv"), 1);
    assert_eq!(world.count("cluster apply persistentvolumeclaim/"), 2);
    assert_eq!(world.commits().len(), 1);
    assert_eq!(world.pushes(), 2);
}

#[tokio::test]
async fn test_sibling_service_reuses_volume() {
    let world = World::new();
    let orchestrator = world.orchestrator(IdpConfig::default());

    orchestrator
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap();
    orchestrator
        .create_service("eth-ingestor", "eth", ServiceType::Ingestor)
        .await
        .unwrap();

    assert_eq!(world.count("cluster apply persistentvolume/eth-data-pv"), 1);
    assert!(world.exists(&ResourceRef::namespaced(
        ResourceKind::PersistentVolumeClaim,
        "eth-ingestor-data",
        "eth-app"
    )));
}

#[tokio::test]
async fn test_build_failure_aborts_before_cluster_changes() {
    let world = World::new();
    world.fail(Fault::Build);

    let err = world
        .orchestrator(IdpConfig::default())
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(Step::BuildImage));
    assert!(err.to_string().contains("Docker daemon"));
    assert!(world.position("builder import").is_none());
    assert!(world.position("cluster").is_none());
    assert_eq!(world.pushes(), 0);
}

#[tokio::test]
async fn test_import_failure_is_fatal() {
    let world = World::new();
    world.fail(Fault::Import);

    let err = world
        .orchestrator(IdpConfig::default())
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(Step::ImportImage));
    assert!(!world.exists(&ResourceRef::namespace("eth-app")));
}

#[tokio::test]
async fn test_push_failure_is_fatal() {
    let world = World::new();
    world.fail(Fault::Push);

    let err = world
        .orchestrator(IdpConfig::default())
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(Step::CommitAndPush));
    assert!(world.position("dashboards apply").is_none());
}

#[tokio::test]
async fn test_dashboard_failure_only_warns() {
    let world = World::new();
    world.fail(Fault::DashboardApply);

    let report = world
        .orchestrator(IdpConfig::default())
        .create_service("eth-collector", "eth", ServiceType::Collector)
        .await
        .unwrap();

    assert_eq!(report.terminal, Some(TerminalState::Provisioned));
    let warnings: Vec<Step> = report.warnings().map(|record| record.step).collect();
    assert_eq!(warnings, vec![Step::ProvisionObservability]);
}

#[tokio::test]
async fn test_invalid_name_is_rejected_before_any_step() {
    let world = World::new();

    let err = world
        .orchestrator(IdpConfig::default())
        .create_service("Eth_Collector", "eth", ServiceType::Collector)
        .await
        .unwrap_err();

    assert!(matches!(err, orchestrator::OrchestratorError::Descriptor(_)));
    assert!(world.log().is_empty());
}
