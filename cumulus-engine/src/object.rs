//! Desired-state objects, their metadata and observed status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a reconciled object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Object metadata maintained by the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Assigned by the store on create.
    pub uid: String,
    /// Incremented by the store on every spec change.
    pub generation: i64,
    /// Incremented by the store on every write; used for optimistic concurrency.
    pub resource_version: u64,
    pub finalizers: Vec<String>,
    /// Set once deletion was requested while finalizers blocked removal.
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers.iter().any(|f| f == token)
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// Tri-state value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A typed status signal. Identified by `condition_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation: 0,
            last_transition_time: Utc::now(),
        }
    }

    /// Condition with `status: True`.
    pub fn active(
        condition_type: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(condition_type, ConditionStatus::True, reason, message)
    }
}

/// Coarse summary of the object's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusState {
    Creating,
    Updating,
    Ready,
    Warning,
    Error,
    Deleting,
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusState::Creating => "Creating",
            StatusState::Updating => "Updating",
            StatusState::Ready => "Ready",
            StatusState::Warning => "Warning",
            StatusState::Error => "Error",
            StatusState::Deleting => "Deleting",
        };
        f.write_str(s)
    }
}

/// Observed status with resource specific fields in `ext`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Status<X> {
    pub state: Option<StatusState>,
    pub conditions: Vec<Condition>,
    pub observed_generation: i64,
    #[serde(flatten)]
    pub ext: X,
}

/// Bounds required of resource specific status fields.
pub trait StatusExt: Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static {}

impl<T> StatusExt for T where T: Clone + PartialEq + fmt::Debug + Default + Send + Sync + 'static {}

/// Resource specific desired state.
pub trait Spec: Clone + fmt::Debug + Send + Sync + 'static {
    /// Kind name used in logs and events.
    const KIND: &'static str;
}

/// An object the engine can reconcile.
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    type Ext: StatusExt;

    fn kind(&self) -> &'static str;
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn status(&self) -> &Status<Self::Ext>;
    fn status_mut(&mut self) -> &mut Status<Self::Ext>;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// Generic desired-state object: metadata, spec and observed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object<S, X = ()> {
    pub meta: ObjectMeta,
    pub spec: S,
    pub status: Status<X>,
}

impl<S: Spec, X: StatusExt> Object<S, X> {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: S) -> Self {
        Self {
            meta: ObjectMeta::new(namespace, name),
            spec,
            status: Status::default(),
        }
    }
}

impl<S: Spec, X: StatusExt> Resource for Object<S, X> {
    type Ext = X;

    fn kind(&self) -> &'static str {
        S::KIND
    }

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn status(&self) -> &Status<X> {
        &self.status
    }

    fn status_mut(&mut self) -> &mut Status<X> {
        &mut self.status
    }
}
