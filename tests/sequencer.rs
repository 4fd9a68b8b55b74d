mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use edgeprov::sequencer::{RunOptions, Sequencer, Step};
use edgeprov::service::ServiceCall;
use edgeprov::{Backoff, ContainerService, EdgeError, ReservationId, SimulatedTestbed};

use common::{alice_spec, assert_every_address_released, assert_nothing_runs_before_active, PUBLIC_KEY};

fn options(bundle: &std::path::Path) -> RunOptions {
    RunOptions::new(
        "alice-edge-cpu",
        ReservationId::new("8e2f1c34-lease").unwrap(),
        PUBLIC_KEY,
        bundle,
    )
}

fn bundle() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    common::write_bundle(dir.path());
    dir
}

#[tokio::test(start_paused = true)]
async fn test_full_walkthrough() {
    let testbed = Arc::new(SimulatedTestbed::new());
    let bundle = bundle();
    let mut sequencer = Sequencer::new(testbed.clone(), options(bundle.path()));

    let report = sequencer.run().await.unwrap();

    let steps: Vec<Step> = report.steps.iter().map(|s| s.step).collect();
    assert_eq!(
        steps,
        vec![
            Step::CreateContainer,
            Step::WaitUntilActive,
            Step::AttachAddress,
            Step::SetupSsh,
            Step::UploadBundle,
            Step::InstallDependencies,
            Step::RunInference,
            Step::Teardown,
        ]
    );
    assert_eq!(report.container_name, "alice-edge-cpu");
    assert_eq!(report.endpoint.as_deref(), Some("ssh root@192.5.87.10"));
    assert!(!report.kept);

    let inference = report.inference.unwrap();
    assert_eq!(inference.label, "tabby cat");
    assert!((inference.score - 0.878431).abs() < 1e-9);
    assert!((inference.elapsed.as_secs_f64() - 0.0421).abs() < 1e-6);

    assert_eq!(testbed.live_containers(), 0);
    assert_eq!(testbed.allocated_addresses(), 0);
    let trace = testbed.trace();
    assert_nothing_runs_before_active(&trace);
    assert_every_address_released(&trace);
}

#[tokio::test(start_paused = true)]
async fn test_failed_dependency_install_still_cleans_up() {
    let testbed = Arc::new(SimulatedTestbed::builder().fail_command("pip install", 1).build());
    let bundle = bundle();
    let mut sequencer = Sequencer::new(testbed.clone(), options(bundle.path()));

    let err = sequencer.run().await.unwrap_err();
    match err {
        EdgeError::CommandFailed {
            command, exit_status, ..
        } => {
            assert!(command.starts_with("pip install"));
            assert_eq!(exit_status, 1);
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(testbed.live_containers(), 0);
    assert_eq!(testbed.allocated_addresses(), 0);
    assert_every_address_released(&testbed.trace());
}

#[tokio::test(start_paused = true)]
async fn test_failed_upload_still_cleans_up() {
    let testbed = Arc::new(SimulatedTestbed::builder().fail_uploads().build());
    let bundle = bundle();
    let mut sequencer = Sequencer::new(testbed.clone(), options(bundle.path()));

    let err = sequencer.run().await.unwrap_err();
    assert!(matches!(err, EdgeError::Transfer(_)));
    assert_eq!(testbed.live_containers(), 0);
    assert_eq!(testbed.allocated_addresses(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ssh_that_never_starts() {
    let testbed = Arc::new(SimulatedTestbed::builder().fail_command("service ssh start", 1).build());
    let bundle = bundle();
    let mut sequencer = Sequencer::new(testbed.clone(), options(bundle.path()));

    let err = sequencer.run().await.unwrap_err();
    assert!(matches!(err, EdgeError::CommandFailed { .. }));
    assert!(sequencer.session().container().is_none());
    // nothing was uploaded
    assert!(!testbed
        .trace()
        .iter()
        .any(|c| matches!(c, ServiceCall::Upload { .. })));
    assert_eq!(testbed.live_containers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_keep_leaves_resources() {
    let testbed = Arc::new(SimulatedTestbed::new());
    let bundle = bundle();
    let mut opts = options(bundle.path());
    opts.keep = true;
    let mut sequencer = Sequencer::new(testbed.clone(), opts);

    let report = sequencer.run().await.unwrap();
    assert!(report.kept);
    assert_eq!(report.steps.last().map(|s| s.step), Some(Step::RunInference));
    assert_eq!(testbed.live_containers(), 1);
    assert_eq!(testbed.allocated_addresses(), 1);
    assert!(!testbed
        .trace()
        .iter()
        .any(|c| matches!(c, ServiceCall::Destroy { .. } | ServiceCall::ReleaseIp { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_conflict_tears_nothing_down() {
    let testbed = Arc::new(SimulatedTestbed::new());
    let existing = testbed.create_container(&alice_spec()).await.unwrap();
    let bundle = bundle();
    let mut sequencer = Sequencer::new(testbed.clone(), options(bundle.path()));

    let err = sequencer.run().await.unwrap_err();
    assert!(matches!(err, EdgeError::Conflict { .. }));
    assert_eq!(testbed.live_containers(), 1);
    assert!(testbed.get_container(&existing.id).await.is_ok());
    assert!(!testbed
        .trace()
        .iter()
        .any(|c| matches!(c, ServiceCall::Destroy { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_bundle_makes_no_calls() {
    let testbed = Arc::new(SimulatedTestbed::new());
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("model.py"), "print()\n").unwrap();
    let mut sequencer = Sequencer::new(testbed.clone(), options(dir.path()));

    let err = sequencer.run().await.unwrap_err();
    match err {
        EdgeError::Config(msg) => {
            assert!(msg.contains("model.tflite"));
            assert!(msg.contains("parrot.jpg"));
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert!(testbed.trace().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_destroys_container() {
    let testbed = Arc::new(SimulatedTestbed::builder().never_activate().build());
    let bundle = bundle();
    let mut opts = options(bundle.path());
    opts.backoff = Backoff::default().with_deadline(Duration::from_secs(30));
    let mut sequencer = Sequencer::new(testbed.clone(), opts);

    let err = sequencer.run().await.unwrap_err();
    match err {
        EdgeError::ProvisioningTimeout { waited, .. } => assert_eq!(waited, Duration::from_secs(30)),
        other => panic!("unexpected: {:?}", other),
    }

    let trace = testbed.trace();
    assert!(trace.iter().any(|c| matches!(c, ServiceCall::Destroy { ok: true, .. })));
    assert!(!trace.iter().any(|c| matches!(c, ServiceCall::AttachIp { .. })));
    assert_eq!(testbed.live_containers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_error_is_reported() {
    let testbed = Arc::new(SimulatedTestbed::builder().fail_start("image pull failed").build());
    let bundle = bundle();
    let mut sequencer = Sequencer::new(testbed.clone(), options(bundle.path()));

    match sequencer.run().await.unwrap_err() {
        EdgeError::ProvisioningFailed { reason, .. } => assert_eq!(reason, "image pull failed"),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(testbed.live_containers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_each_step() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let bundle = bundle();
    let sink = seen.clone();
    let mut sequencer = Sequencer::new(SimulatedTestbed::new(), options(bundle.path()))
        .on_step(move |step| sink.lock().push(step.step));

    let report = sequencer.run().await.unwrap();
    let seen = seen.lock().clone();
    assert_eq!(seen.len(), report.steps.len());
    assert_eq!(seen.first(), Some(&Step::CreateContainer));
    assert_eq!(seen.last(), Some(&Step::Teardown));
}

#[tokio::test(start_paused = true)]
async fn test_quoted_names_reach_the_script_intact() {
    let testbed = Arc::new(SimulatedTestbed::new());
    let bundle = bundle();
    std::fs::write(bundle.path().join("my cat.jpg"), [0xffu8, 0xd8]).unwrap();
    let mut opts = options(bundle.path());
    opts.job.image = "my cat.jpg".to_string();
    opts.public_key = "ssh-ed25519 AAAAC3Nz o'brien@laptop".to_string();
    opts.keep = true;
    let mut sequencer = Sequencer::new(testbed.clone(), opts);

    let report = sequencer.run().await.unwrap();
    assert_eq!(report.inference.unwrap().label, "tabby cat");

    let id = report.container_id.unwrap();
    assert_eq!(
        testbed.authorized_keys(&id),
        vec!["ssh-ed25519 AAAAC3Nz o'brien@laptop".to_string()]
    );
    assert!(testbed.file(&id, "/root/image_model/my cat.jpg").is_some());
}
