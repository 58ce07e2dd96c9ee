//! Resource workflows built from engine parts.

pub mod network;

use std::sync::Arc;
use std::time::Duration;

use cumulus_engine::{BackoffPolicy, ObjectStore, ReconcileObserver, Reconciler};

use crate::provider::NetworkClient;

pub use network::{
    FINALIZER, HasNetworkClient, Network, NetworkExt, NetworkSpec, NetworkState, NetworkStatus,
    network_pipeline, remote_name,
};

/// Wire the network workflow into a reconciler.
pub fn network_reconciler(
    store: Arc<dyn ObjectStore<Network>>,
    client: Arc<dyn NetworkClient>,
    backoff: Arc<BackoffPolicy>,
    observer: Arc<dyn ReconcileObserver>,
    timeout: Option<Duration>,
) -> Reconciler<Network, NetworkExt> {
    let builder = Reconciler::builder(
        "network",
        store,
        network_pipeline::<NetworkState>(),
        move |_key| NetworkExt::new(Arc::clone(&client)),
    )
    .backoff(backoff)
    .observer(observer);

    match timeout {
        Some(limit) => builder.timeout(limit).build(),
        None => builder.build(),
    }
}
