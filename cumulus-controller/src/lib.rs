//! Host side of the cumulus engine: work queue, requeue backoff, controller
//! loop and the virtual network workflow.

pub mod config;
pub mod controller;
pub mod provider;
pub mod queue;
pub mod rate;
pub mod workflow;

pub use config::{ControllerConfig, SeedNetwork};
pub use controller::Controller;
pub use provider::{FakeNetworkClient, NetworkClient, Op, ProvisioningState, RemoteNetwork};
pub use queue::WorkQueue;
pub use rate::ItemBackoff;
