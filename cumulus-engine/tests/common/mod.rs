#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_engine::{
    Action, ActionRef, BackoffPolicy, Context, MemoryStore, Object, ObjectKey, Outcome,
    ProviderError, Spec, State,
};

pub const FINALIZER: &str = "cumulus.io/widget";

#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub size: u32,
}

impl Spec for Widget {
    const KIND: &'static str = "Widget";
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WidgetStatus {
    pub widget_id: Option<String>,
}

pub type WidgetObj = Object<Widget, WidgetStatus>;
pub type WidgetState = State<WidgetObj, ()>;

pub fn backoff() -> Arc<BackoffPolicy> {
    Arc::new(BackoffPolicy::new(
        Duration::from_secs(10),
        Duration::from_secs(300),
    ))
}

pub async fn store_with(names: &[&str]) -> Arc<MemoryStore<WidgetObj>> {
    let store = Arc::new(MemoryStore::new());
    for name in names {
        store
            .create(Object::new("default", *name, Widget { size: 1 }))
            .await
            .unwrap();
    }
    store
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

/// Sleeps inside a collaborator call, honoring cancellation.
pub struct SlowCall(pub Duration);

#[async_trait]
impl Action<WidgetState> for SlowCall {
    fn name(&self) -> &str {
        "slow-call"
    }

    async fn run(&self, ctx: &mut Context, _state: &mut WidgetState) -> Outcome {
        let delay = self.0;
        let res = ctx
            .call(async move {
                tokio::time::sleep(delay).await;
                Ok::<_, ProviderError>(())
            })
            .await;
        match res {
            Ok(()) => Outcome::Continue,
            Err(e) => Outcome::Error(e),
        }
    }
}

pub fn slow(delay: Duration) -> ActionRef<WidgetState> {
    Arc::new(SlowCall(delay))
}
