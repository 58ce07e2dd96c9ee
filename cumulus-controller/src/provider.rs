//! Cloud-provider boundary for virtual networks, plus an in-memory fake.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cumulus_engine::ProviderError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Provisioning state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningState {
    Creating,
    Updating,
    Succeeded,
    Failed,
    Deleting,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisioningState::Creating => "Creating",
            ProvisioningState::Updating => "Updating",
            ProvisioningState::Succeeded => "Succeeded",
            ProvisioningState::Failed => "Failed",
            ProvisioningState::Deleting => "Deleting",
        };
        f.write_str(s)
    }
}

/// A network as the provider sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNetwork {
    pub id: String,
    pub name: String,
    pub cidr: String,
    pub location: String,
    pub state: ProvisioningState,
}

/// Virtual network CRUD against a cloud provider.
///
/// Networks are addressed by name. A missing network is reported as a
/// not-found [`ProviderError`].
#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn get_network(&self, name: &str) -> Result<RemoteNetwork, ProviderError>;

    async fn create_network(
        &self,
        name: &str,
        cidr: &str,
        location: &str,
    ) -> Result<RemoteNetwork, ProviderError>;

    /// Start deleting a network. Completion is observed through `get_network`.
    async fn delete_network(&self, name: &str) -> Result<(), ProviderError>;
}

/// Provider operation, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Create,
    Delete,
}

/// In-memory provider.
///
/// Deletes are asynchronous unless built with [`FakeNetworkClient::instant`]:
/// a deleted network stays in `Deleting` until [`complete_deletion`] is
/// called.
///
/// [`complete_deletion`]: FakeNetworkClient::complete_deletion
pub struct FakeNetworkClient {
    networks: Mutex<HashMap<String, RemoteNetwork>>,
    faults: Mutex<HashMap<Op, VecDeque<ProviderError>>>,
    create_state: Mutex<ProvisioningState>,
    instant: bool,
    gets: AtomicU64,
    creates: AtomicU64,
    deletes: AtomicU64,
}

impl Default for FakeNetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeNetworkClient {
    pub fn new() -> Self {
        Self {
            networks: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            create_state: Mutex::new(ProvisioningState::Succeeded),
            instant: false,
            gets: AtomicU64::new(0),
            creates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Provider whose deletes complete immediately.
    pub fn instant() -> Self {
        Self {
            instant: true,
            ..Self::new()
        }
    }

    /// State assigned to newly created networks.
    pub async fn set_create_state(&self, state: ProvisioningState) {
        *self.create_state.lock().await = state;
    }

    /// Queue an error for the next call of `op`.
    pub async fn fail_next(&self, op: Op, err: ProviderError) {
        self.faults.lock().await.entry(op).or_default().push_back(err);
    }

    pub async fn set_state(&self, name: &str, state: ProvisioningState) -> bool {
        match self.networks.lock().await.get_mut(name) {
            Some(n) => {
                n.state = state;
                true
            }
            None => false,
        }
    }

    /// Finish an asynchronous delete.
    pub async fn complete_deletion(&self, name: &str) -> bool {
        let mut networks = self.networks.lock().await;
        match networks.get(name) {
            Some(n) if n.state == ProvisioningState::Deleting => {
                networks.remove(name);
                true
            }
            _ => false,
        }
    }

    pub async fn network(&self, name: &str) -> Option<RemoteNetwork> {
        self.networks.lock().await.get(name).cloned()
    }

    pub fn calls(&self, op: Op) -> u64 {
        match op {
            Op::Get => self.gets.load(Ordering::SeqCst),
            Op::Create => self.creates.load(Ordering::SeqCst),
            Op::Delete => self.deletes.load(Ordering::SeqCst),
        }
    }

    async fn enter(&self, op: Op) -> Result<(), ProviderError> {
        let counter = match op {
            Op::Get => &self.gets,
            Op::Create => &self.creates,
            Op::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        match self.faults.lock().await.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NetworkClient for FakeNetworkClient {
    async fn get_network(&self, name: &str) -> Result<RemoteNetwork, ProviderError> {
        self.enter(Op::Get).await?;
        self.networks
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("network {name} not found")))
    }

    async fn create_network(
        &self,
        name: &str,
        cidr: &str,
        location: &str,
    ) -> Result<RemoteNetwork, ProviderError> {
        self.enter(Op::Create).await?;
        let mut networks = self.networks.lock().await;
        if let Some(existing) = networks.get(name) {
            return Err(ProviderError::conflict(format!(
                "network {} already exists ({})",
                name, existing.id
            )));
        }

        let network = RemoteNetwork {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            cidr: cidr.to_string(),
            location: location.to_string(),
            state: *self.create_state.lock().await,
        };
        debug!("Created network {} ({}) in {}", name, network.id, location);
        networks.insert(name.to_string(), network.clone());
        Ok(network)
    }

    async fn delete_network(&self, name: &str) -> Result<(), ProviderError> {
        self.enter(Op::Delete).await?;
        let mut networks = self.networks.lock().await;
        if self.instant {
            return match networks.remove(name) {
                Some(_) => Ok(()),
                None => Err(ProviderError::not_found(format!("network {name} not found"))),
            };
        }
        match networks.get_mut(name) {
            Some(n) => {
                debug!("Deleting network {} ({})", name, n.id);
                n.state = ProvisioningState::Deleting;
                Ok(())
            }
            None => Err(ProviderError::not_found(format!("network {name} not found"))),
        }
    }
}
