//! Per-invocation execution context.

use std::collections::BTreeMap;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::ReconcileError;

/// Cancellation, tracing span and log labels of one invocation.
///
/// Created by the driver for every invocation and dropped at its end.
#[derive(Debug)]
pub struct Context {
    cancel: CancellationToken,
    span: Span,
    labels: BTreeMap<String, String>,
}

impl Context {
    pub fn new(cancel: CancellationToken, span: Span) -> Self {
        Self {
            cancel,
            span,
            labels: BTreeMap::new(),
        }
    }

    /// Context that is never cancelled and logs nowhere special.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), Span::none())
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Attach a label that is reported with the invocation result.
    pub fn label(&mut self, key: impl Into<String>, value: impl ToString) {
        self.labels.insert(key.into(), value.to_string());
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Run a collaborator call, aborting it if the invocation is cancelled.
    pub async fn call<T, E, F>(&self, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ReconcileError>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            res = fut => res.map_err(Into::into),
        }
    }
}
