//! Polling watcher for ledger addresses.
//!
//! [`AddressWatcher`] keeps a set of addresses, periodically asks a
//! [`SignatureSource`] for each one's most recent transaction signatures and
//! hands every signature it has not reported before to the registered
//! [`TransactionListener`]s, oldest first. The `watchline` binary wraps it in
//! a small terminal tool.

pub mod listener;
pub mod pipeline;
pub mod rpc;
pub mod watcher;

pub use listener::{listener_fn, ListenerError, TransactionListener};
pub use rpc::{RpcSignatureSource, SignatureSource};
pub use watcher::{AddressWatcher, PollReport, WatchEntry, WatcherError, WatcherOptions};
