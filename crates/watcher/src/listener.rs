//! Subscribers notified about newly observed signatures.

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use metrics::counter;
use thiserror::Error;
use tracing::warn;

use watchline_domain::TransactionNotice;

/// Failure reported by a listener. Logged by the watcher and otherwise
/// ignored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub trait TransactionListener: Send + Sync {
    fn on_transaction(&self, notice: &TransactionNotice) -> Result<(), ListenerError>;
}

/// Adapts a closure into a [`TransactionListener`].
pub struct FnListener<F>(F);

pub fn listener_fn<F>(f: F) -> FnListener<F>
where
    F: Fn(&TransactionNotice) -> Result<(), ListenerError> + Send + Sync,
{
    FnListener(f)
}

impl<F> TransactionListener for FnListener<F>
where
    F: Fn(&TransactionNotice) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_transaction(&self, notice: &TransactionNotice) -> Result<(), ListenerError> {
        (self.0)(notice)
    }
}

/// Ordered set of listeners keyed by allocation identity.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn TransactionListener>>,
}

impl ListenerRegistry {
    /// Returns `false` when the same listener is already registered.
    pub fn register(&mut self, listener: Arc<dyn TransactionListener>) -> bool {
        if self.position(&listener).is_some() {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    pub fn unregister(&mut self, listener: &Arc<dyn TransactionListener>) -> bool {
        match self.position(listener) {
            Some(idx) => {
                self.listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn snapshot(&self) -> Vec<Arc<dyn TransactionListener>> {
        self.listeners.clone()
    }

    // Vtable pointers are not stable across codegen units; compare data
    // pointers only.
    fn position(&self, listener: &Arc<dyn TransactionListener>) -> Option<usize> {
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners
            .iter()
            .position(|existing| Arc::as_ptr(existing) as *const () == target)
    }
}

/// Hands `notice` to every listener in order. Errors and panics are contained
/// per listener. Returns how many listeners accepted the notice.
pub fn dispatch(listeners: &[Arc<dyn TransactionListener>], notice: &TransactionNotice) -> usize {
    let mut accepted = 0;
    for listener in listeners {
        let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_transaction(notice)));
        match outcome {
            Ok(Ok(())) => accepted += 1,
            Ok(Err(err)) => {
                counter!("watcher_listener_failures_total", "kind" => "error").increment(1);
                warn!(
                    address = %notice.address,
                    signature = %notice.signature.signature,
                    %err,
                    "transaction listener failed"
                );
            }
            Err(payload) => {
                counter!("watcher_listener_failures_total", "kind" => "panic").increment(1);
                warn!(
                    address = %notice.address,
                    signature = %notice.signature.signature,
                    panic = panic_message(payload.as_ref()),
                    "transaction listener panicked"
                );
            }
        }
    }
    accepted
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
