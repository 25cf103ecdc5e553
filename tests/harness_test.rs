use pushdb_bench::error::{BenchError, PreconditionError};
use pushdb_bench::harness::{Harness, HarnessConfig, SUBSCRIPTIONS_PER_DEVICE, Workload};
use pushdb_bench::memory::InMemoryPushService;
use pushdb_bench::model::{
    CHANGE_SUBSCRIPTION, CREATE_DEVICE, CREATE_SUBSCRIPTION, PING_SUBSCRIPTION, PushDbModel,
};
use pushdb_bench::tuple::ResultCode;
use std::collections::HashSet;
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn harness(concurrency: usize, total: usize) -> (Harness, Arc<InMemoryPushService>) {
    let service = Arc::new(InMemoryPushService::new());
    let harness = Harness::new(
        PushDbModel::new(service.clone()),
        HarnessConfig {
            concurrency,
            total,
            key_len: 12,
            silent: true,
        },
    );
    (harness, service)
}

#[tokio::test]
async fn test_subs_fills_lists_device_major() {
    init_logger();
    let (harness, service) = harness(4, 100);
    let report = harness.run(Workload::Subs).await.unwrap();

    assert_eq!(report.requests, 100);
    assert_eq!(report.operations, 300);
    assert_eq!(harness.context().device_count(), 100);
    assert_eq!(harness.context().subscription_count(), 300);
    assert_eq!(service.device_count(), 100);
    assert_eq!(service.subscription_count(), 300);
    assert_eq!(service.call_count(CREATE_DEVICE), 100);
    assert_eq!(service.call_count(CREATE_SUBSCRIPTION), 300);

    let ids = harness.context().snapshot();
    for (index, subscription_id) in ids.subscriptions.iter().enumerate() {
        let stored = service.subscription(subscription_id).unwrap();
        assert_eq!(stored.device_id, ids.device_for(index));
        assert_eq!(stored.subscription_id.len(), 12);
    }
    let unique: HashSet<_> = ids.devices.iter().collect();
    assert_eq!(unique.len(), ids.devices.len());
}

#[tokio::test]
async fn test_uneven_split_drops_remainder() {
    init_logger();
    let (harness, _) = harness(3, 10);
    let report = harness.run(Workload::Subs).await.unwrap();
    assert_eq!(report.requests, 9);
    assert_eq!(harness.context().device_count(), 9);
    assert_eq!(harness.context().subscription_count(), 9 * SUBSCRIPTIONS_PER_DEVICE);
}

#[tokio::test]
async fn test_two_workers_five_requests_each() {
    init_logger();
    let (harness, service) = harness(2, 10);
    harness.run(Workload::Subs).await.unwrap();

    let report = harness.run(Workload::Ping).await.unwrap();
    assert_eq!(report.requests, 10);
    assert_eq!(report.operations, 10);
    assert_eq!(service.call_count(PING_SUBSCRIPTION), 10);
}

#[tokio::test]
async fn test_ping_before_subs_is_precondition_failure() {
    init_logger();
    let (harness, service) = harness(2, 10);
    let err = harness.run(Workload::Ping).await.unwrap_err();
    assert!(matches!(
        err,
        BenchError::Precondition(PreconditionError::SubsNotRun)
    ));
    assert_eq!(service.call_count(PING_SUBSCRIPTION), 0);

    let err = harness.run(Workload::Change).await.unwrap_err();
    assert!(matches!(
        err,
        BenchError::Precondition(PreconditionError::SubsNotRun)
    ));
}

#[tokio::test]
async fn test_change_wraps_over_subscription_list() {
    init_logger();
    let (harness, service) = harness(2, 4);
    harness.run(Workload::Subs).await.unwrap();
    assert_eq!(harness.context().subscription_count(), 12);

    // Each change must hit a subscription paired with its own device.
    let changer = Harness::new(
        PushDbModel::new(service.clone()),
        HarnessConfig {
            concurrency: 5,
            total: 40,
            key_len: 12,
            silent: true,
        },
    );
    changer
        .context()
        .append(
            harness.context().snapshot().devices.clone(),
            harness.context().snapshot().subscriptions.clone(),
        );
    let report = changer.run(Workload::Change).await.unwrap();
    assert_eq!(report.requests, 40);
    assert_eq!(service.call_count(CHANGE_SUBSCRIPTION), 40);

    let total_changes: i64 = harness
        .context()
        .snapshot()
        .devices
        .iter()
        .map(|id| service.device(id).unwrap().change_count)
        .sum();
    assert_eq!(total_changes, 40);
}

#[tokio::test]
async fn test_first_failure_stops_the_run() {
    init_logger();
    let (harness, service) = harness(4, 400);
    harness.run(Workload::Subs).await.unwrap();

    service.fail_function(PING_SUBSCRIPTION);
    let err = harness.run(Workload::Ping).await.unwrap_err();
    assert_eq!(err.operation(), Some(PING_SUBSCRIPTION));
    assert_eq!(err.result_code(), ResultCode::DatabaseError);
    assert!(err.to_string().starts_with("Error calling push_PingSub: "));
    // Workers stop at their next iteration once one of them failed.
    assert!(service.call_count(PING_SUBSCRIPTION) < 400);
}

#[tokio::test]
async fn test_invalid_parameters_rejected_before_any_call() {
    init_logger();
    let service = Arc::new(InMemoryPushService::new());
    let harness = Harness::new(
        PushDbModel::new(service.clone()),
        HarnessConfig {
            concurrency: 2,
            total: 10,
            key_len: 4,
            silent: true,
        },
    );
    let err = harness.run(Workload::Subs).await.unwrap_err();
    assert!(matches!(
        err,
        BenchError::Precondition(PreconditionError::InvalidParameter { .. })
    ));
    assert_eq!(service.call_count(CREATE_DEVICE), 0);
}

#[tokio::test]
async fn test_subs_twice_accumulates() {
    init_logger();
    let (harness, _) = harness(2, 6);
    harness.run(Workload::Subs).await.unwrap();
    harness.run(Workload::Subs).await.unwrap();
    assert_eq!(harness.context().device_count(), 12);
    assert_eq!(harness.context().subscription_count(), 36);
}
