//! Virtual network workflow.
//!
//! ```text
//! network
//!   add-finalizer
//!   load-network
//!   deleting?
//!     delete: status-deleting, delete-network, wait-network-deleted,
//!             remove-finalizer, stop-and-forget
//!     create: validate-cidr, stale? status-generation-processing,
//!             create-network, provisioning-state switch
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use cumulus_engine::conditions::{
    CONDITION_ERROR, CONDITION_PROCESSING, CONDITION_READY, REASON_PROCESSING, REASON_READY,
};
use cumulus_engine::{
    Action, ActionRef, Classify, Condition, Context, ErrorHandler, ErrorKind, Object, ObjectKey,
    ObjectState, Outcome, Pipeline, Predicate, Spec, State, StatusState, UpdateStatus,
    add_finalizer, case, is_stale, logic_failure, marked_for_deletion, remove_finalizer, requeue,
    stop_and_forget, switch,
};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::provider::{NetworkClient, ProvisioningState, RemoteNetwork};

pub const FINALIZER: &str = "cumulus.io/network";

pub const REASON_INVALID_CIDR: &str = "InvalidCidr";
pub const REASON_PROVISIONING_FAILED: &str = "ProvisioningFailed";

/// Desired state of a virtual network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub cidr: String,
    pub location: String,
}

impl Spec for NetworkSpec {
    const KIND: &'static str = "Network";
}

/// Network specific status fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub network_id: Option<String>,
    pub provisioning_state: Option<ProvisioningState>,
}

pub type Network = Object<NetworkSpec, NetworkStatus>;

/// Workflow extension of the invocation state.
pub struct NetworkExt {
    pub client: Arc<dyn NetworkClient>,
    /// Remote network as loaded in this invocation.
    pub remote: Option<RemoteNetwork>,
}

impl NetworkExt {
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self {
            client,
            remote: None,
        }
    }
}

pub type NetworkState = State<Network, NetworkExt>;

/// What network actions need besides the object itself.
pub trait HasNetworkClient {
    fn client(&self) -> Arc<dyn NetworkClient>;
    fn remote(&self) -> Option<&RemoteNetwork>;
    fn set_remote(&mut self, remote: Option<RemoteNetwork>);
}

impl HasNetworkClient for NetworkState {
    fn client(&self) -> Arc<dyn NetworkClient> {
        Arc::clone(&self.ext.client)
    }

    fn remote(&self) -> Option<&RemoteNetwork> {
        self.ext.remote.as_ref()
    }

    fn set_remote(&mut self, remote: Option<RemoteNetwork>) {
        self.ext.remote = remote;
    }
}

/// Name of the remote network for an object.
///
/// Derived from the key so a network created by a crashed invocation is
/// found again even though its id never made it into the status.
pub fn remote_name(key: &ObjectKey) -> String {
    format!("{}--{}", key.namespace, key.name)
}

/// Bounds of every network action.
pub trait NetworkWorkflowState: ObjectState<Resource = Network> + HasNetworkClient {}

impl<S> NetworkWorkflowState for S where S: ObjectState<Resource = Network> + HasNetworkClient {}

struct LoadNetwork;

#[async_trait]
impl<S: NetworkWorkflowState> Action<S> for LoadNetwork {
    fn name(&self) -> &str {
        "load-network"
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        let name = remote_name(&state.key());
        let client = state.client();
        match ctx.call(client.get_network(&name)).await {
            Ok(remote) => {
                debug!("Loaded network {} ({}): {}", name, remote.id, remote.state);
                state.set_remote(Some(remote));
                Outcome::Continue
            }
            Err(err) => {
                state.set_remote(None);
                ErrorHandler::new()
                    .with_default_reason("NetworkLoadFailed")
                    .with_default_message("Failed to load network")
                    .with_not_found_message("Network does not exist")
                    .handle(ctx, state, err)
                    .await
            }
        }
    }
}

struct ValidateCidr;

#[async_trait]
impl<S: NetworkWorkflowState> Action<S> for ValidateCidr {
    fn name(&self) -> &str {
        "validate-cidr"
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        let cidr = state.obj().spec.cidr.clone();
        match cidr.parse::<IpNet>() {
            Ok(net) if net.trunc() == net => Outcome::Continue,
            Ok(net) => {
                logic_failure(
                    REASON_INVALID_CIDR,
                    format!("CIDR {} has host bits set, expected {}", cidr, net.trunc()),
                )
                .apply(ctx, state)
                .await
            }
            Err(e) => {
                logic_failure(REASON_INVALID_CIDR, format!("Invalid CIDR {}: {}", cidr, e))
                    .apply(ctx, state)
                    .await
            }
        }
    }
}

struct CreateNetwork;

#[async_trait]
impl<S: NetworkWorkflowState> Action<S> for CreateNetwork {
    fn name(&self) -> &str {
        "create-network"
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        if state.remote().is_some() {
            return Outcome::Continue;
        }

        let name = remote_name(&state.key());
        let spec = state.obj().spec.clone();
        let client = state.client();
        match ctx
            .call(client.create_network(&name, &spec.cidr, &spec.location))
            .await
        {
            Ok(remote) => {
                info!("Created network {} ({}) in {}", name, remote.id, spec.location);
                ctx.label("network_id", &remote.id);
                state.set_remote(Some(remote));
                Outcome::Continue
            }
            Err(err) => {
                ErrorHandler::new()
                    .with_default_reason("NetworkCreateFailed")
                    .with_default_message("Failed to create network")
                    .with_too_many_requests_message("Rate limited while creating network")
                    .handle(ctx, state, err)
                    .await
            }
        }
    }
}

struct DeleteNetwork;

#[async_trait]
impl<S: NetworkWorkflowState> Action<S> for DeleteNetwork {
    fn name(&self) -> &str {
        "delete-network"
    }

    async fn run(&self, ctx: &mut Context, state: &mut S) -> Outcome {
        let Some(remote) = state.remote().cloned() else {
            return Outcome::Continue;
        };
        if remote.state == ProvisioningState::Deleting {
            return Outcome::Continue;
        }

        let client = state.client();
        let handler = ErrorHandler::new()
            .with_default_reason("NetworkDeleteFailed")
            .with_default_message("Failed to delete network");
        match ctx.call(client.delete_network(&remote.name)).await {
            Ok(()) => info!("Deleting network {} ({})", remote.name, remote.id),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                state.set_remote(None);
                return Outcome::Continue;
            }
            Err(err) => return handler.handle(ctx, state, err).await,
        }

        // Providers that delete synchronously report the network gone right away.
        match ctx.call(client.get_network(&remote.name)).await {
            Ok(current) => {
                state.set_remote(Some(current));
                Outcome::Continue
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                state.set_remote(None);
                Outcome::Continue
            }
            Err(err) => handler.handle(ctx, state, err).await,
        }
    }
}

/// Requeues until the remote network is gone.
struct WaitNetworkDeleted;

#[async_trait]
impl<S: NetworkWorkflowState> Action<S> for WaitNetworkDeleted {
    fn name(&self) -> &str {
        "wait-network-deleted"
    }

    async fn run(&self, _ctx: &mut Context, state: &mut S) -> Outcome {
        match state.remote() {
            Some(remote) => {
                debug!("Waiting for network {} to be deleted", remote.name);
                Outcome::StopRequeueAfter(state.backoff().short)
            }
            None => Outcome::Continue,
        }
    }
}

/// Requeues after the short backoff tier.
struct WaitProvisioning;

#[async_trait]
impl<S: NetworkWorkflowState> Action<S> for WaitProvisioning {
    fn name(&self) -> &str {
        "wait-provisioning"
    }

    async fn run(&self, _ctx: &mut Context, state: &mut S) -> Outcome {
        Outcome::StopRequeueAfter(state.backoff().short)
    }
}

fn remote_state_is<S: NetworkWorkflowState>(states: &'static [ProvisioningState]) -> Predicate<S> {
    Arc::new(move |_ctx: &Context, state: &S| {
        state.remote().is_some_and(|r| states.contains(&r.state))
    })
}

/// Copy id and provisioning state of the loaded remote network into the status.
fn copy_remote<S: NetworkWorkflowState>(state: &mut S) {
    let (id, provisioning) = match state.remote() {
        Some(r) => (Some(r.id.clone()), Some(r.state)),
        None => (None, None),
    };
    let ext = &mut state.obj_mut().status.ext;
    ext.network_id = id;
    ext.provisioning_state = provisioning;
}

fn create_pipeline<S: NetworkWorkflowState>() -> ActionRef<S> {
    let ready = UpdateStatus::new("status-ready")
        .mutate(copy_remote::<S>)
        .exclusive(vec![Condition::active(
            CONDITION_READY,
            REASON_READY,
            "Network is provisioned",
        )])
        .state(StatusState::Ready)
        .success_log("Network is ready")
        .into_action();

    let failed = UpdateStatus::new("status-failed")
        .mutate(copy_remote::<S>)
        .exclusive(vec![Condition::active(
            CONDITION_ERROR,
            REASON_PROVISIONING_FAILED,
            "Provider failed to provision the network",
        )])
        .state(StatusState::Error)
        .into_action();

    let provisioning = Pipeline::new("provisioning")
        .then(
            UpdateStatus::new("status-processing")
                .mutate(copy_remote::<S>)
                .set_condition(Condition::active(
                    CONDITION_PROCESSING,
                    REASON_PROCESSING,
                    "Network is being provisioned",
                ))
                .state(StatusState::Creating)
                .on_success(Outcome::Continue)
                .into_action(),
        )
        .finish(Arc::new(WaitProvisioning));

    let mark_processing = UpdateStatus::new("status-generation-processing")
        .set_condition(Condition::active(
            CONDITION_PROCESSING,
            REASON_PROCESSING,
            "Reconciling network",
        ))
        .on_success(Outcome::Continue)
        .into_action();

    Pipeline::new("create")
        .then(Arc::new(ValidateCidr))
        .when("stale", is_stale(), mark_processing)
        .then(Arc::new(CreateNetwork))
        .then(switch(
            "provisioning-state",
            Some(requeue()),
            vec![
                case(remote_state_is(&[ProvisioningState::Succeeded]), ready),
                case(remote_state_is(&[ProvisioningState::Failed]), failed),
                case(
                    remote_state_is(&[ProvisioningState::Creating, ProvisioningState::Updating]),
                    provisioning,
                ),
            ],
        ))
        .build()
}

fn delete_pipeline<S: NetworkWorkflowState>() -> ActionRef<S> {
    Pipeline::new("delete")
        .then(
            UpdateStatus::new("status-deleting")
                .state(StatusState::Deleting)
                .on_success(Outcome::Continue)
                .into_action(),
        )
        .then(Arc::new(DeleteNetwork))
        .then(Arc::new(WaitNetworkDeleted))
        .then(remove_finalizer(FINALIZER))
        .finish(stop_and_forget())
}

/// The complete network workflow.
pub fn network_pipeline<S: NetworkWorkflowState>() -> ActionRef<S> {
    Pipeline::new("network")
        .then(add_finalizer(FINALIZER))
        .then(Arc::new(LoadNetwork))
        .branch(
            "deleting",
            marked_for_deletion(),
            delete_pipeline(),
            create_pipeline(),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_name() {
        assert_eq!(remote_name(&ObjectKey::new("team-a", "vnet")), "team-a--vnet");
    }

    #[test]
    fn test_pipeline_shape() {
        let tree = network_pipeline::<NetworkState>().describe();
        let top: Vec<&str> = tree
            .lines()
            .filter(|l| l.starts_with("  ") && !l.starts_with("    "))
            .map(str::trim)
            .collect();
        assert_eq!(top, vec!["add-finalizer", "load-network", "deleting"]);
        assert!(tree.contains("      remove-finalizer\n      stop-and-forget\n"));
    }
}
