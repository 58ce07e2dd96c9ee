#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cumulus_controller::workflow::{Network, NetworkExt, NetworkSpec, network_reconciler};
use cumulus_controller::FakeNetworkClient;
use cumulus_engine::{
    BackoffPolicy, MemoryStore, ObjectKey, ObjectStore, Reconcile, ReconcileCounters, Reconciler,
    Resource, SchedulingInstruction,
};
use tokio_util::sync::CancellationToken;

pub const SHORT: Duration = Duration::from_secs(10);
pub const LONG: Duration = Duration::from_secs(300);

pub struct Harness {
    pub store: Arc<MemoryStore<Network>>,
    pub client: Arc<FakeNetworkClient>,
    pub counters: Arc<ReconcileCounters>,
    pub reconciler: Reconciler<Network, NetworkExt>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_client(FakeNetworkClient::new())
    }

    pub fn with_client(client: FakeNetworkClient) -> Self {
        let store: Arc<MemoryStore<Network>> = Arc::new(MemoryStore::new());
        let client = Arc::new(client);
        let counters = Arc::new(ReconcileCounters::new());
        let reconciler = network_reconciler(
            store.clone(),
            client.clone(),
            Arc::new(BackoffPolicy::new(SHORT, LONG)),
            counters.clone(),
            None,
        );
        Self {
            store,
            client,
            counters,
            reconciler,
        }
    }

    pub async fn create(&self, name: &str, cidr: &str) -> ObjectKey {
        let network = Network::new(
            "default",
            name,
            NetworkSpec {
                cidr: cidr.to_string(),
                location: "westeurope".to_string(),
            },
        );
        self.store.create(network).await.unwrap().key()
    }

    pub async fn invoke(&self, key: &ObjectKey) -> SchedulingInstruction {
        self.reconciler.invoke(CancellationToken::new(), key).await
    }

    pub async fn get(&self, key: &ObjectKey) -> Network {
        self.store.get(key).await.unwrap()
    }
}
