//! End-to-end tests of the image pipeline against a scripted remote API.

use super::{ImageBuilder, RunOutcome, StepRunner};
use crate::cancellation::CancellationToken;
use crate::client::{ImageId, InstanceId, InstanceStatus};
use crate::config::PipelineConfig;
use crate::context::StateBag;
use crate::errors::{ErrorKind, RemoteError};
use crate::events::CollectingProgressSink;
use crate::testing::{
    assert_error_contains, assert_error_kind, test_config, ApiCall, HangingProvisioner,
    MockProvisioner, Operation, ScriptedComputeApi,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn builder(api: &Arc<ScriptedComputeApi>) -> ImageBuilder {
    builder_with(api, test_config(), MockProvisioner::succeeding())
}

fn builder_with(
    api: &Arc<ScriptedComputeApi>,
    config: PipelineConfig,
    provisioner: MockProvisioner,
) -> ImageBuilder {
    ImageBuilder::new(config, api.clone(), Arc::new(provisioner)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_produces_artifact() {
    let api = Arc::new(ScriptedComputeApi::new());
    let sink = Arc::new(CollectingProgressSink::new());
    let builder = builder(&api).with_sink(sink.clone());

    let artifact = builder.run().await.unwrap();

    assert_eq!(artifact.image_id(), ImageId(99));
    assert_eq!(artifact.image_label(), "golden");
    assert_eq!(
        api.mutations(),
        vec![
            Operation::CreateInstance,
            Operation::CreateDisk,
            Operation::CreateBootConfig,
            Operation::Boot,
            Operation::ListAddresses,
            Operation::Imagize,
            Operation::Shutdown,
            Operation::DeleteBootConfig,
            Operation::DeleteDisk,
            Operation::DeleteInstance,
        ]
    );
    assert!(sink.errors().is_empty());
    assert!(!sink.contains("Cleaning up..."));
    assert!(sink.contains("Establishing connection @ 10.0.0.5..."));
    assert!(!builder.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_disk_failure_deletes_instance() {
    let api = Arc::new(
        ScriptedComputeApi::new()
            .with_instance_id(InstanceId(42))
            .fail(Operation::CreateDisk, RemoteError::api(400, "disk too large")),
    );
    let builder = builder(&api);

    let report = StepRunner::new(builder.steps())
        .run(StateBag::new(Arc::new(test_config())))
        .await;

    assert_eq!(report.completed, vec!["create_instance"]);
    assert_eq!(report.compensated, vec!["create_instance"]);
    assert_eq!(report.state.image_id(), None);
    assert!(api.calls().contains(&ApiCall::DeleteInstance {
        instance_id: InstanceId(42)
    }));
    let RunOutcome::Halted(err) = report.outcome else {
        panic!("expected a halted run");
    };
    assert_error_contains(&err, "disk too large");
    assert_error_kind(&err, ErrorKind::RemoteRequest);
}

#[tokio::test(start_paused = true)]
async fn test_disk_job_failure_message_is_verbatim() {
    let api = Arc::new(
        ScriptedComputeApi::new()
            .job_pending_polls(2)
            .fail_job(Operation::CreateDisk, "Disk image is too small for the requested size"),
    );

    let err = builder(&api).run().await.unwrap_err();

    assert_eq!(
        err.root().to_string(),
        "Disk image is too small for the requested size"
    );
    assert_error_kind(&err, ErrorKind::RemoteJob);
    assert_eq!(
        api.mutations(),
        vec![
            Operation::CreateInstance,
            Operation::CreateDisk,
            Operation::DeleteInstance
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_status_poll_unwinds_in_reverse() {
    let token = Arc::new(CancellationToken::new());
    let api = Arc::new(
        ScriptedComputeApi::new()
            .instance_statuses([InstanceStatus::Booting])
            .cancel_on_status_poll(3, token.clone()),
    );
    let builder = builder_with(&api, test_config(), MockProvisioner::new()).with_token(token);

    let err = builder.run().await.unwrap_err();

    assert_error_kind(&err, ErrorKind::Cancellation);
    assert_eq!(api.count(Operation::InstanceStatus), 3);
    assert_eq!(
        api.mutations(),
        vec![
            Operation::CreateInstance,
            Operation::CreateDisk,
            Operation::CreateBootConfig,
            Operation::Boot,
            Operation::Shutdown,
            Operation::DeleteBootConfig,
            Operation::DeleteDisk,
            Operation::DeleteInstance,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_job_poll_waits_for_unwind() {
    let api = Arc::new(ScriptedComputeApi::new().job_pending_polls(u32::MAX));
    let builder = Arc::new(builder(&api));

    let run = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.run().await })
    };
    while api.count(Operation::JobStatus) < 3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    builder.cancel().await;

    assert!(!builder.is_running());
    assert!(api.calls().contains(&ApiCall::DeleteInstance {
        instance_id: InstanceId(7)
    }));
    let polls = api.count(Operation::JobStatus);
    let err = run.await.unwrap().unwrap_err();
    assert_eq!(api.count(Operation::JobStatus), polls);
    assert_eq!(err.to_string(), "Build was cancelled.");
    assert_eq!(
        api.mutations(),
        vec![
            Operation::CreateInstance,
            Operation::CreateDisk,
            Operation::DeleteInstance
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_builder_creates_nothing() {
    let api = Arc::new(ScriptedComputeApi::new());
    let builder = builder(&api);
    builder.cancel().await;

    let err = builder.run().await.unwrap_err();

    assert!(err.is_cancellation());
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_provision_failure_unwinds_every_resource() {
    let mut provisioner = MockProvisioner::new();
    provisioner.expect_connect().returning(|_| Ok(()));
    provisioner
        .expect_provision()
        .returning(|_| Err(anyhow::anyhow!("apt-get exited with status 100")));
    let api = Arc::new(ScriptedComputeApi::new());
    let sink = Arc::new(CollectingProgressSink::new());
    let builder = builder_with(&api, test_config(), provisioner).with_sink(sink.clone());

    let err = builder.run().await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Error provisioning: apt-get exited with status 100"
    );
    assert_eq!(
        api.mutations(),
        vec![
            Operation::CreateInstance,
            Operation::CreateDisk,
            Operation::CreateBootConfig,
            Operation::Boot,
            Operation::ListAddresses,
            Operation::Shutdown,
            Operation::DeleteBootConfig,
            Operation::DeleteDisk,
            Operation::DeleteInstance,
        ]
    );
    assert_eq!(api.count(Operation::Imagize), 0);
    assert!(sink.contains("Cleaning up..."));
}

#[tokio::test(start_paused = true)]
async fn test_compensation_failures_follow_primary_error() {
    let api = Arc::new(
        ScriptedComputeApi::new()
            .fail(Operation::Imagize, RemoteError::api(500, "imagize unavailable"))
            .fail(Operation::DeleteInstance, RemoteError::transport("connection reset")),
    );

    let err = builder(&api).run().await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Error creating image: imagize unavailable; 1 compensation error(s): \
         create_instance: Error cleaning up instance: connection reset"
    );
    assert_error_kind(&err, ErrorKind::RemoteRequest);
    assert_eq!(err.compensation_errors().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_disk_job_times_out() {
    let api = Arc::new(ScriptedComputeApi::new().job_pending_polls(u32::MAX));
    let config = test_config().with_state_timeout(Duration::from_secs(30));

    let err = builder_with(&api, config, MockProvisioner::new())
        .run()
        .await
        .unwrap_err();

    assert_error_kind(&err, ErrorKind::Timeout);
    assert_error_contains(&err, "Timed out after 30s");
    assert_eq!(api.count(Operation::DeleteInstance), 1);
}

#[tokio::test(start_paused = true)]
async fn test_largest_state_timeout_still_completes() {
    let api = Arc::new(ScriptedComputeApi::new().job_pending_polls(2));
    let mut config = test_config();
    config.state_timeout_secs = u64::MAX;
    assert!(config.validate().is_ok());

    let artifact = builder_with(&api, config, MockProvisioner::succeeding())
        .run()
        .await
        .unwrap();

    assert_eq!(artifact.image_id(), ImageId(99));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_hung_connect_unwinds() {
    let api = Arc::new(ScriptedComputeApi::new());
    let builder = Arc::new(
        ImageBuilder::new(
            test_config(),
            api.clone(),
            Arc::new(HangingProvisioner::Connect),
        )
        .unwrap(),
    );

    let run = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.run().await })
    };
    while api.count(Operation::ListAddresses) == 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::timeout(Duration::from_secs(60), builder.cancel())
        .await
        .unwrap();

    let err = run.await.unwrap().unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(
        api.mutations(),
        vec![
            Operation::CreateInstance,
            Operation::CreateDisk,
            Operation::CreateBootConfig,
            Operation::Boot,
            Operation::ListAddresses,
            Operation::Shutdown,
            Operation::DeleteBootConfig,
            Operation::DeleteDisk,
            Operation::DeleteInstance,
        ]
    );
}
