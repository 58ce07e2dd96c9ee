mod common;

use common::*;
use cumulus_controller::workflow::{FINALIZER, remote_name};
use cumulus_controller::{FakeNetworkClient, Op, ProvisioningState};
use cumulus_engine::conditions::{
    CONDITION_ERROR, CONDITION_PROCESSING, CONDITION_READY, CONDITION_WARNING,
    REASON_UNAUTHORIZED, find_condition, is_condition_true,
};
use cumulus_engine::{ProviderError, ResultLabel, SchedulingInstruction, StatusState, StoreError};

fn terminal_count(network: &cumulus_controller::workflow::Network) -> usize {
    [CONDITION_READY, CONDITION_ERROR, CONDITION_WARNING]
        .iter()
        .filter(|t| find_condition(&network.status.conditions, t).is_some())
        .count()
}

#[tokio::test]
async fn test_create_then_ready() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.0/16").await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);

    let network = h.get(&key).await;
    assert_eq!(network.status.state, Some(StatusState::Ready));
    assert!(is_condition_true(&network.status.conditions, CONDITION_READY));
    assert_eq!(terminal_count(&network), 1);
    assert!(network.meta.has_finalizer(FINALIZER));
    let remote = h.client.network(&remote_name(&key)).await.unwrap();
    assert_eq!(network.status.ext.network_id.as_deref(), Some(remote.id.as_str()));
    assert_eq!(
        network.status.ext.provisioning_state,
        Some(ProvisioningState::Succeeded)
    );
    // Finalizer, Processing for the new generation, Ready.
    assert_eq!(h.store.write_count(), 3);
    assert_eq!(h.client.calls(Op::Create), 1);

    // Id set and remote succeeded: no create, no write.
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    assert_eq!(h.store.write_count(), 3);
    assert_eq!(h.client.calls(Op::Create), 1);
    assert_eq!(h.get(&key).await, network);
}

#[tokio::test]
async fn test_rate_limited_during_create() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.0/16").await;
    h.client
        .fail_next(Op::Create, ProviderError::too_many_requests("quota exceeded"))
        .await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::After(SHORT));

    let network = h.get(&key).await;
    assert!(find_condition(&network.status.conditions, CONDITION_ERROR).is_none());
    assert_eq!(network.status.conditions.len(), 1);
    assert!(is_condition_true(&network.status.conditions, CONDITION_PROCESSING));
    assert_eq!(network.status.state, None);

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    assert!(is_condition_true(&h.get(&key).await.status.conditions, CONDITION_READY));
}

#[tokio::test]
async fn test_deletion_waits_for_remote_cleanup() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.0/16").await;
    h.invoke(&key).await;

    h.store.request_delete(&key).await.unwrap();
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::After(SHORT));

    let network = h.get(&key).await;
    assert!(network.meta.has_finalizer(FINALIZER));
    assert_eq!(network.status.state, Some(StatusState::Deleting));
    let remote = h.client.network(&remote_name(&key)).await.unwrap();
    assert_eq!(remote.state, ProvisioningState::Deleting);

    // Still deleting remotely: no second delete call.
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::After(SHORT));
    assert_eq!(h.client.calls(Op::Delete), 1);
    assert!(h.store.contains(&key).await);

    assert!(h.client.complete_deletion(&remote_name(&key)).await);
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    assert!(!h.store.contains(&key).await);
}

#[tokio::test]
async fn test_provisioning_then_ready() {
    let h = Harness::new();
    h.client.set_create_state(ProvisioningState::Creating).await;
    let key = h.create("vnet", "10.0.0.0/16").await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::After(SHORT));
    let network = h.get(&key).await;
    assert_eq!(network.status.state, Some(StatusState::Creating));
    assert!(is_condition_true(&network.status.conditions, CONDITION_PROCESSING));
    assert!(network.status.ext.network_id.is_some());

    h.client
        .set_state(&remote_name(&key), ProvisioningState::Succeeded)
        .await;
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);

    let network = h.get(&key).await;
    assert_eq!(network.status.conditions.len(), 1);
    assert!(is_condition_true(&network.status.conditions, CONDITION_READY));
    assert_eq!(h.client.calls(Op::Create), 1);
}

#[tokio::test]
async fn test_provisioning_failed() {
    let h = Harness::new();
    h.client.set_create_state(ProvisioningState::Failed).await;
    let key = h.create("vnet", "10.0.0.0/16").await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    let network = h.get(&key).await;
    assert_eq!(network.status.state, Some(StatusState::Error));
    assert!(is_condition_true(&network.status.conditions, CONDITION_ERROR));
    assert_eq!(terminal_count(&network), 1);
}

#[tokio::test]
async fn test_invalid_cidr_is_a_logic_failure() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.300/16").await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    let network = h.get(&key).await;
    assert_eq!(network.status.state, Some(StatusState::Error));
    let cond = find_condition(&network.status.conditions, CONDITION_ERROR).unwrap();
    assert_eq!(cond.reason, "InvalidCidr");
    assert_eq!(h.client.calls(Op::Create), 0);

    let key = h.create("vnet-host-bits", "10.0.0.1/16").await;
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    assert_eq!(h.get(&key).await.status.state, Some(StatusState::Error));
}

#[tokio::test]
async fn test_unauthorized_then_recovered() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.0/16").await;
    h.client
        .fail_next(Op::Create, ProviderError::unauthorized("missing role"))
        .await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::After(LONG));
    let network = h.get(&key).await;
    assert_eq!(network.status.state, Some(StatusState::Warning));
    let cond = find_condition(&network.status.conditions, CONDITION_WARNING).unwrap();
    assert_eq!(cond.reason, REASON_UNAUTHORIZED);
    assert_eq!(cond.message, "missing role");

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    let network = h.get(&key).await;
    assert_eq!(terminal_count(&network), 1);
    assert!(is_condition_true(&network.status.conditions, CONDITION_READY));
}

#[tokio::test]
async fn test_unknown_load_error_records_error_condition() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.0/16").await;
    h.client
        .fail_next(Op::Get, ProviderError::with_status(500, "internal server error"))
        .await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::After(LONG));
    let network = h.get(&key).await;
    let cond = find_condition(&network.status.conditions, CONDITION_ERROR).unwrap();
    assert_eq!(cond.reason, "NetworkLoadFailed");
    assert_eq!(cond.message, "Failed to load network");
    assert_eq!(h.counters.get(ResultLabel::RequeueAfter), 1);
}

#[tokio::test]
async fn test_store_conflict_requeues_short() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.0/16").await;
    h.store
        .fail_next_write(StoreError::VersionMismatch {
            expected: 1,
            actual: 2,
        })
        .await;

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::After(SHORT));
    assert_eq!(h.client.calls(Op::Create), 0);
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
}

#[tokio::test]
async fn test_instant_delete_finishes_in_one_invocation() {
    let h = Harness::with_client(FakeNetworkClient::instant());
    let key = h.create("vnet", "10.0.0.0/16").await;
    h.invoke(&key).await;
    h.store.request_delete(&key).await.unwrap();

    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    assert!(!h.store.contains(&key).await);
    assert!(h.client.network(&remote_name(&key)).await.is_none());
    assert_eq!(h.client.calls(Op::Delete), 1);
}

#[tokio::test]
async fn test_spec_change_marks_processing_once() {
    let h = Harness::new();
    let key = h.create("vnet", "10.0.0.0/16").await;
    h.invoke(&key).await;
    let writes = h.store.write_count();

    h.store
        .update_spec(&key, |n| n.spec.location = "northeurope".to_string())
        .await
        .unwrap();

    // New generation: Processing then Ready again.
    assert_eq!(h.invoke(&key).await, SchedulingInstruction::None);
    assert_eq!(h.store.write_count(), writes + 2);
    let network = h.get(&key).await;
    assert_eq!(network.status.observed_generation, network.meta.generation);
    assert_eq!(network.status.conditions.len(), 1);
    assert!(is_condition_true(&network.status.conditions, CONDITION_READY));
}
