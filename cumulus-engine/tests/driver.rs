mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use cumulus_engine::conditions::{CONDITION_READY, is_condition_true};
use cumulus_engine::{
    Action, ObjectState, ObjectStore, Outcome, Pipeline, ProviderError, Reconcile, ReconcileCounters,
    Reconciler, ResultLabel, SchedulingInstruction, UpdateStatus, add_finalizer,
    marked_for_deletion, ready, remove_finalizer, step, stop_and_forget,
};
use tokio_util::sync::CancellationToken;

fn widget_pipeline() -> cumulus_engine::ActionRef<WidgetState> {
    let create = Pipeline::new("create")
        .then(step("assign-id", |_ctx, s: &mut WidgetState| {
            if s.obj().status.ext.widget_id.is_none() {
                s.obj_mut().status.ext.widget_id = Some(format!("w-{}", s.obj().meta.name));
            }
            Outcome::Continue
        }))
        .finish(ready::<WidgetState>("widget ready").into_action());

    let delete = Pipeline::new("delete")
        .then(
            UpdateStatus::new("deleting")
                .state(cumulus_engine::StatusState::Deleting)
                .on_success(Outcome::Continue)
                .into_action(),
        )
        .then(remove_finalizer(FINALIZER))
        .finish(stop_and_forget());

    Pipeline::new("widget")
        .then(add_finalizer(FINALIZER))
        .branch("deleting", marked_for_deletion(), delete, create)
        .build()
}

#[tokio::test]
async fn test_missing_object_is_not_rescheduled() {
    let store = store_with(&[]).await;
    let counters = Arc::new(ReconcileCounters::new());
    let reconciler = Reconciler::builder("widget", store, widget_pipeline(), |_| ())
        .observer(counters.clone())
        .build();

    let instruction = reconciler.invoke(CancellationToken::new(), &key("ghost")).await;
    assert_eq!(instruction, SchedulingInstruction::None);
    assert_eq!(counters.get(ResultLabel::Success), 1);
}

#[tokio::test]
async fn test_reinvocation_is_idempotent() {
    let store = store_with(&["w1"]).await;
    let reconciler = Reconciler::builder("widget", store.clone(), widget_pipeline(), |_| ())
        .backoff(backoff())
        .build();

    let first = reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    assert_eq!(first, SchedulingInstruction::None);
    // finalizer + status
    assert_eq!(store.write_count(), 2);

    let persisted = store.get(&key("w1")).await.unwrap();
    assert!(is_condition_true(&persisted.status.conditions, CONDITION_READY));
    assert_eq!(persisted.status.ext.widget_id.as_deref(), Some("w-w1"));

    let second = reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    assert_eq!(second, first);
    assert_eq!(store.write_count(), 2);
}

#[tokio::test]
async fn test_spec_change_updates_observed_generation() {
    let store = store_with(&["w1"]).await;
    let reconciler = Reconciler::builder("widget", store.clone(), widget_pipeline(), |_| ()).build();

    reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    store.update_spec(&key("w1"), |w| w.spec.size = 2).await.unwrap();
    reconciler.invoke(CancellationToken::new(), &key("w1")).await;

    let persisted = store.get(&key("w1")).await.unwrap();
    assert_eq!(persisted.status.observed_generation, 2);
    assert_eq!(persisted.status.conditions[0].observed_generation, 2);
    assert_eq!(store.write_count(), 3);
}

#[tokio::test]
async fn test_deletion_removes_object() {
    let store = store_with(&["w1"]).await;
    let reconciler = Reconciler::builder("widget", store.clone(), widget_pipeline(), |_| ()).build();

    reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    store.request_delete(&key("w1")).await.unwrap();
    assert!(store.contains(&key("w1")).await);

    let instruction = reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    assert_eq!(instruction, SchedulingInstruction::None);
    assert!(!store.contains(&key("w1")).await);
}

#[tokio::test]
async fn test_unconverted_error_requeues_after_long_delay() {
    let store = store_with(&["w1"]).await;
    let failing = step("explode", |_ctx, _s: &mut WidgetState| {
        Outcome::error(ProviderError::with_status(500, "boom"))
    });
    let counters = Arc::new(ReconcileCounters::new());
    let reconciler = Reconciler::builder("widget", store, failing, |_| ())
        .backoff(backoff())
        .observer(counters.clone())
        .build();

    let instruction = reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    assert_eq!(instruction, SchedulingInstruction::After(Duration::from_secs(300)));
    assert_eq!(counters.get(ResultLabel::Error), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_not_retried() {
    let store = store_with(&["w1"]).await;
    let counters = Arc::new(ReconcileCounters::new());
    let reconciler = Reconciler::builder("widget", store, slow(Duration::from_secs(60)), |_| ())
        .timeout(Duration::from_secs(5))
        .observer(counters.clone())
        .build();

    let instruction = reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    assert_eq!(instruction, SchedulingInstruction::None);
    assert_eq!(counters.get(ResultLabel::Deadline), 1);
}

#[tokio::test]
async fn test_cancellation_aborts_invocation() {
    let store = store_with(&["w1"]).await;
    let counters = Arc::new(ReconcileCounters::new());
    let reconciler = Arc::new(
        Reconciler::builder("widget", store, slow(Duration::from_secs(3600)), |_| ())
            .observer(counters.clone())
            .build(),
    );

    let token = CancellationToken::new();
    let handle = {
        let reconciler = reconciler.clone();
        let token = token.clone();
        tokio::spawn(async move { reconciler.invoke(token, &key("w1")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let instruction = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(instruction, SchedulingInstruction::None);
    assert_eq!(counters.get(ResultLabel::Canceled), 1);
}

#[test]
fn test_describe_pipeline() {
    let tree = widget_pipeline().describe();
    assert!(tree.starts_with("widget\n  add-finalizer\n  deleting\n"));
    assert!(tree.contains("    delete\n      deleting\n      remove-finalizer\n"));
}

#[tokio::test]
async fn test_list_keys_includes_deleting_objects() {
    let store = store_with(&["w2", "w1"]).await;
    let reconciler = Reconciler::builder("widget", store.clone(), widget_pipeline(), |_| ()).build();
    reconciler.invoke(CancellationToken::new(), &key("w1")).await;
    store.request_delete(&key("w1")).await.unwrap();

    let keys = reconciler.list_keys().await.unwrap();
    assert_eq!(keys, vec![key("w1"), key("w2")]);
}
