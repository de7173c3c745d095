//! Order routers: the order-routing collaborator behind the sink.

use std::fmt;

use thiserror::Error;

use crate::domain::OrderRequest;

/// Refusal returned by a router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct RouterRejection {
    pub reason: String,
}

impl RouterRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Submit one order. Fire-and-forget: `Ok` means accepted and, for the
/// engine's purposes, filled.
pub trait OrderRouter: Send {
    fn submit(&mut self, order: &OrderRequest) -> Result<(), RouterRejection>;
}

type RejectFn = dyn Fn(&OrderRequest) -> Option<String> + Send;

/// In-memory router for backtests and tests. Records every accepted order;
/// an optional predicate can refuse orders.
#[derive(Default)]
pub struct RecordingRouter {
    accepted: Vec<OrderRequest>,
    reject: Option<Box<RejectFn>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every order for which `predicate` returns a reason.
    pub fn rejecting<F>(predicate: F) -> Self
    where
        F: Fn(&OrderRequest) -> Option<String> + Send + 'static,
    {
        Self {
            accepted: Vec::new(),
            reject: Some(Box::new(predicate)),
        }
    }

    pub fn accepted(&self) -> &[OrderRequest] {
        &self.accepted
    }
}

impl fmt::Debug for RecordingRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRouter")
            .field("accepted", &self.accepted.len())
            .field("rejecting", &self.reject.is_some())
            .finish()
    }
}

impl OrderRouter for RecordingRouter {
    fn submit(&mut self, order: &OrderRequest) -> Result<(), RouterRejection> {
        if let Some(reason) = self.reject.as_ref().and_then(|f| f(order)) {
            return Err(RouterRejection { reason });
        }
        self.accepted.push(order.clone());
        Ok(())
    }
}
