use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use watchline_domain::{
    config::{ConfigError, WatcherConfig, DEFAULT_FETCH_LIMIT},
    services::telemetry::TelemetryError,
    AddressFormatError, Commitment, OverlapPolicy, TransactionNotice, WatchedAddress,
};

use crate::{
    listener::{dispatch, ListenerRegistry, TransactionListener},
    pipeline::{select_new_signatures, CursorMatch},
    rpc::{RpcSignatureSource, SignatureSource},
};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressFormatError),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("poll interval must be greater than zero")]
    InvalidInterval,
    #[error("no tokio runtime available to drive the poll loop")]
    NoRuntime,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for WatcherError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// Knobs fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    pub commitment: Commitment,
    pub fetch_limit: usize,
    pub overlap: OverlapPolicy,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            commitment: Commitment::default(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            overlap: OverlapPolicy::default(),
        }
    }
}

impl From<&WatcherConfig> for WatcherOptions {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            commitment: config.commitment(),
            fetch_limit: config.fetch_limit(),
            overlap: config.overlap(),
        }
    }
}

/// Outcome of a single poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Addresses whose page was fetched and applied.
    pub polled: usize,
    /// Addresses whose fetch failed.
    pub failed: usize,
    /// Pages discarded because the address was removed mid-fetch or the page
    /// is older than the stored cursor.
    pub dropped: usize,
    /// Notices produced (one per new signature, independent of listener count).
    pub delivered: usize,
}

/// Read-only view of one watched address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub address: WatchedAddress,
    pub last_seen: Option<String>,
    /// Slot of `last_seen`; the cursor never moves to an older slot.
    pub last_seen_slot: Option<u64>,
}

#[derive(Default)]
struct WatchState {
    entries: BTreeMap<String, WatchEntry>,
    listeners: ListenerRegistry,
}

struct Inner {
    source: Arc<dyn SignatureSource>,
    options: WatcherOptions,
    state: Mutex<WatchState>,
    ticker: Mutex<Option<Ticker>>,
    cycle_in_progress: AtomicBool,
}

struct Ticker {
    handle: JoinHandle<()>,
    period: Duration,
}

/// Polls the signature feed of every watched address and notifies listeners
/// about signatures it has not reported before.
///
/// Clones share the same watch set, listeners and poll loop.
#[derive(Clone)]
pub struct AddressWatcher {
    inner: Arc<Inner>,
}

impl AddressWatcher {
    pub fn new<S>(source: S, options: WatcherOptions) -> Self
    where
        S: SignatureSource + 'static,
    {
        Self::with_shared_source(Arc::new(source), options)
    }

    pub fn with_shared_source(source: Arc<dyn SignatureSource>, options: WatcherOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                options: WatcherOptions {
                    fetch_limit: options.fetch_limit.max(1),
                    ..options
                },
                state: Mutex::new(WatchState::default()),
                ticker: Mutex::new(None),
                cycle_in_progress: AtomicBool::new(false),
            }),
        }
    }

    /// Builds a watcher talking JSON-RPC to the configured endpoint.
    pub fn connect(config: &WatcherConfig) -> Result<Self, WatcherError> {
        let source = RpcSignatureSource::new(config.rpc_url(), config.rpc_timeout())?;
        info!(endpoint = source.endpoint(), "signature source ready");
        Ok(Self::new(source, WatcherOptions::from(config)))
    }

    pub fn options(&self) -> WatcherOptions {
        self.inner.options
    }

    /// Validates and adds `address`. Returns `false` if it was already
    /// watched; its cursor is left untouched in that case.
    pub fn add_address(&self, address: &str) -> Result<bool, WatcherError> {
        let address = WatchedAddress::parse(address)?;
        Ok(self.watch(address))
    }

    pub fn watch(&self, address: WatchedAddress) -> bool {
        let mut state = self.state();
        if state.entries.contains_key(address.as_str()) {
            return false;
        }
        debug!(address = %address, "watching address");
        state.entries.insert(
            address.as_str().to_string(),
            WatchEntry {
                address,
                last_seen: None,
                last_seen_slot: None,
            },
        );
        gauge!("watcher_watched_addresses").set(state.entries.len() as f64);
        true
    }

    /// Drops `address` and its cursor. Returns `false` if it was not watched.
    pub fn remove_address(&self, address: &str) -> bool {
        let mut state = self.state();
        let removed = state.entries.remove(address.trim()).is_some();
        if removed {
            debug!(address = address.trim(), "stopped watching address");
            gauge!("watcher_watched_addresses").set(state.entries.len() as f64);
        }
        removed
    }

    /// Returns `false` if this listener is already registered.
    pub fn on_transaction(&self, listener: Arc<dyn TransactionListener>) -> bool {
        self.state().listeners.register(listener)
    }

    pub fn off_transaction(&self, listener: &Arc<dyn TransactionListener>) -> bool {
        self.state().listeners.unregister(listener)
    }

    /// Starts the poll loop on the current Tokio runtime. The first cycle runs
    /// one `period` after this call. Returns `false` when already running.
    pub fn start(&self, period: Duration) -> Result<bool, WatcherError> {
        if period.is_zero() {
            return Err(WatcherError::InvalidInterval);
        }
        let runtime = Handle::try_current().map_err(|_| WatcherError::NoRuntime)?;

        let mut ticker = self.ticker();
        if ticker.as_ref().is_some_and(Ticker::is_alive) {
            return Ok(false);
        }

        let weak = Arc::downgrade(&self.inner);
        *ticker = Some(Ticker {
            handle: runtime.spawn(run_ticker(weak, period)),
            period,
        });
        info!(
            period_ms = period.as_millis() as u64,
            overlap = %self.inner.options.overlap,
            "address watcher started"
        );
        Ok(true)
    }

    /// Cancels the poll loop. A cycle already in flight still completes.
    /// Returns `false` when it was not running.
    pub fn stop(&self) -> bool {
        match self.ticker().take() {
            Some(ticker) => {
                ticker.handle.abort();
                info!("address watcher stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker().as_ref().is_some_and(Ticker::is_alive)
    }

    /// Period of the running poll loop, if any.
    pub fn period(&self) -> Option<Duration> {
        self.ticker()
            .as_ref()
            .filter(|ticker| ticker.is_alive())
            .map(|ticker| ticker.period)
    }

    /// Stops polling and forgets every address, cursor and listener.
    pub fn clear(&self) {
        self.stop();
        let mut state = self.state();
        state.entries.clear();
        state.listeners.clear();
        gauge!("watcher_watched_addresses").set(0.0);
    }

    pub fn addresses(&self) -> Vec<WatchedAddress> {
        self.state()
            .entries
            .values()
            .map(|entry| entry.address.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<WatchEntry> {
        self.state().entries.values().cloned().collect()
    }

    pub fn last_seen(&self, address: &str) -> Option<String> {
        self.state()
            .entries
            .get(address.trim())
            .and_then(|entry| entry.last_seen.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Runs one poll cycle right away. Fetches run concurrently; results are
    /// applied and delivered address by address once all fetches settle.
    pub async fn poll_once(&self) -> PollReport {
        self.inner.poll_once().await
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.inner.state()
    }

    fn ticker(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.inner.ticker.lock().expect("mutex poisoned")
    }
}

impl Ticker {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().expect("mutex poisoned")
    }

    async fn poll_once(&self) -> PollReport {
        let targets: Vec<WatchedAddress> = self
            .state()
            .entries
            .values()
            .map(|entry| entry.address.clone())
            .collect();
        let mut report = PollReport::default();
        if targets.is_empty() {
            return report;
        }

        let options = self.options;
        let fetches = targets.into_iter().map(|address| async move {
            let page = self
                .source
                .recent_signatures(&address, options.fetch_limit, options.commitment)
                .await;
            (address, page)
        });

        for (address, page) in join_all(fetches).await {
            let page = match page {
                Ok(page) => {
                    counter!("watcher_rpc_calls_total", "result" => "ok").increment(1);
                    page
                }
                Err(err) => {
                    counter!("watcher_rpc_calls_total", "result" => "error").increment(1);
                    error!(address = %address, %err, "signature fetch failed");
                    report.failed += 1;
                    continue;
                }
            };
            histogram!("watcher_page_size").record(page.len() as f64);

            let (fresh, listeners) = {
                let mut state = self.state();
                let listeners = state.listeners.snapshot();
                let Some(entry) = state.entries.get_mut(address.as_str()) else {
                    debug!(address = %address, "address removed during fetch; dropping page");
                    report.dropped += 1;
                    continue;
                };
                let page_slot = page.first().map(|info| info.slot);
                if let (Some(page_slot), Some(cursor_slot)) = (page_slot, entry.last_seen_slot) {
                    if page_slot < cursor_slot {
                        counter!("watcher_stale_pages_total").increment(1);
                        debug!(
                            address = %address,
                            page_slot,
                            cursor_slot,
                            "page older than last seen signature; dropping page"
                        );
                        report.dropped += 1;
                        continue;
                    }
                }
                let selection = select_new_signatures(&page, entry.last_seen.as_deref());
                if selection.cursor == CursorMatch::Missing && !page.is_empty() {
                    counter!("watcher_cursor_misses_total").increment(1);
                    debug!(
                        address = %address,
                        cursor = entry.last_seen.as_deref().unwrap_or_default(),
                        page = page.len(),
                        "last seen signature not in page; reporting whole page"
                    );
                }
                if let Some(newest) = selection.newest {
                    entry.last_seen = Some(newest);
                    entry.last_seen_slot = page_slot;
                }
                (selection.fresh, listeners)
            };
            report.polled += 1;

            for signature in fresh {
                let notice = TransactionNotice::new(address.clone(), signature);
                dispatch(&listeners, &notice);
                report.delivered += 1;
            }
        }

        counter!("watcher_signatures_delivered_total").increment(report.delivered as u64);
        debug!(
            polled = report.polled,
            failed = report.failed,
            dropped = report.dropped,
            delivered = report.delivered,
            "poll cycle finished"
        );
        report
    }
}

async fn run_ticker(inner: Weak<Inner>, period: Duration) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let Some(strong) = inner.upgrade() else {
            debug!("watcher dropped; poll loop exiting");
            return;
        };

        match strong.options.overlap {
            OverlapPolicy::Allow => {
                tokio::spawn(async move {
                    strong.poll_once().await;
                });
            }
            OverlapPolicy::Skip => {
                if strong.cycle_in_progress.swap(true, Ordering::AcqRel) {
                    counter!("watcher_ticks_skipped_total").increment(1);
                    debug!("previous poll cycle still running; skipping tick");
                    continue;
                }
                tokio::spawn(async move {
                    let _guard = CycleGuard(&strong.cycle_in_progress);
                    strong.poll_once().await;
                });
            }
        }
    }
}

/// Clears the in-progress flag even if the cycle task is cancelled.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use watchline_domain::SignatureInfo;

    use crate::listener::{listener_fn, ListenerError};

    const ALICE: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
    const BOB: &str = "So11111111111111111111111111111111111111112";

    type Scripted = Result<Vec<SignatureInfo>, WatcherError>;

    /// Replays queued pages per address; an exhausted queue repeats the last
    /// successful page.
    #[derive(Default)]
    struct ScriptedSource {
        pages: Mutex<HashMap<String, VecDeque<Scripted>>>,
        last: Mutex<HashMap<String, Vec<SignatureInfo>>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        /// Held only by the first call, after it has taken its page.
        hold_first: Option<Arc<Notify>>,
        delay: Option<Duration>,
    }

    impl ScriptedSource {
        fn push(&self, address: &str, page: &[&str]) {
            self.pages
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default()
                .push_back(Ok(signatures(page)));
        }

        fn push_slots(&self, address: &str, page: &[(&str, u64)]) {
            let page = page
                .iter()
                .map(|(name, slot)| SignatureInfo::new(*name, *slot))
                .collect();
            self.pages
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default()
                .push_back(Ok(page));
        }

        fn push_err(&self, address: &str) {
            self.pages
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default()
                .push_back(Err(WatcherError::Rpc("node unavailable".into())));
        }
    }

    #[async_trait]
    impl SignatureSource for Arc<ScriptedSource> {
        async fn recent_signatures(
            &self,
            address: &WatchedAddress,
            limit: usize,
            _commitment: Commitment,
        ) -> Result<Vec<SignatureInfo>, WatcherError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .pages
                .lock()
                .unwrap()
                .get_mut(address.as_str())
                .and_then(VecDeque::pop_front);
            let result = match next {
                Some(Ok(page)) => {
                    let page: Vec<_> = page.into_iter().take(limit).collect();
                    self.last
                        .lock()
                        .unwrap()
                        .insert(address.as_str().to_string(), page.clone());
                    Ok(page)
                }
                Some(Err(err)) => Err(err),
                None => Ok(self
                    .last
                    .lock()
                    .unwrap()
                    .get(address.as_str())
                    .cloned()
                    .unwrap_or_default()),
            };

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let (0, Some(hold)) = (call, &self.hold_first) {
                hold.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }

    fn signatures(names: &[&str]) -> Vec<SignatureInfo> {
        names
            .iter()
            .enumerate()
            .map(|(idx, name)| SignatureInfo::new(*name, 1_000 - idx as u64))
            .collect()
    }

    type Seen = Arc<Mutex<Vec<(String, String)>>>;

    fn recorder() -> (Seen, Arc<dyn TransactionListener>) {
        let seen: Seen = Arc::default();
        let sink = seen.clone();
        let listener: Arc<dyn TransactionListener> = Arc::new(listener_fn(move |notice| {
            sink.lock().unwrap().push((
                notice.address.to_string(),
                notice.signature.signature.clone(),
            ));
            Ok(())
        }));
        (seen, listener)
    }

    fn signatures_for(seen: &Seen, address: &str) -> Vec<String> {
        seen.lock()
            .unwrap()
            .iter()
            .filter(|(addr, _)| addr == address)
            .map(|(_, sig)| sig.clone())
            .collect()
    }

    fn watcher_with(source: &Arc<ScriptedSource>, overlap: OverlapPolicy) -> AddressWatcher {
        AddressWatcher::new(
            source.clone(),
            WatcherOptions {
                overlap,
                ..WatcherOptions::default()
            },
        )
    }

    fn watcher(source: &Arc<ScriptedSource>) -> AddressWatcher {
        watcher_with(source, OverlapPolicy::Skip)
    }

    #[test]
    fn repeated_adds_keep_a_single_entry() {
        let watcher = watcher(&Arc::default());
        assert!(watcher.add_address(ALICE).unwrap());
        assert!(!watcher.add_address(ALICE).unwrap());
        assert!(!watcher.add_address(&format!(" {ALICE} ")).unwrap());
        assert_eq!(watcher.addresses().len(), 1);
        assert_eq!(watcher.last_seen(ALICE), None);
    }

    #[test]
    fn rejects_invalid_addresses_synchronously() {
        let watcher = watcher(&Arc::default());
        let err = watcher.add_address("definitely-not-base58!").unwrap_err();
        assert!(matches!(err, WatcherError::InvalidAddress(_)));
        assert!(watcher.addresses().is_empty());
    }

    #[test]
    fn remove_is_a_no_op_for_unknown_addresses() {
        let watcher = watcher(&Arc::default());
        watcher.add_address(ALICE).unwrap();
        assert!(!watcher.remove_address(BOB));
        assert!(watcher.remove_address(ALICE));
        assert!(!watcher.remove_address(ALICE));
        assert!(watcher.addresses().is_empty());
    }

    #[tokio::test]
    async fn delivers_new_signatures_oldest_first_across_cycles() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["s3", "s2", "s1"]);
        source.push(ALICE, &["s5", "s4", "s3"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        let first = watcher.poll_once().await;
        assert_eq!(first.delivered, 3);
        assert_eq!(signatures_for(&seen, ALICE), ["s1", "s2", "s3"]);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("s3"));

        let second = watcher.poll_once().await;
        assert_eq!(second.delivered, 2);
        assert_eq!(signatures_for(&seen, ALICE), ["s1", "s2", "s3", "s4", "s5"]);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("s5"));

        // feed unchanged
        let third = watcher.poll_once().await;
        assert_eq!(third.delivered, 0);
        assert_eq!(third.polled, 1);
    }

    #[tokio::test]
    async fn missing_cursor_delivers_the_whole_page() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["s1"]);
        source.push(ALICE, &["s9", "s8"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        watcher.poll_once().await;
        watcher.poll_once().await;

        assert_eq!(signatures_for(&seen, ALICE), ["s1", "s8", "s9"]);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("s9"));
    }

    #[tokio::test]
    async fn empty_page_keeps_the_cursor() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["s1"]);
        source.push(ALICE, &[]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();

        watcher.poll_once().await;
        let report = watcher.poll_once().await;

        assert_eq!(report.delivered, 0);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn failing_listener_does_not_starve_siblings() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["s2", "s1"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        watcher.on_transaction(Arc::new(listener_fn(|_| Err(ListenerError::new("nope")))));
        watcher.on_transaction(Arc::new(listener_fn(|_| panic!("listener bug"))));
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        let report = watcher.poll_once().await;

        assert_eq!(report.delivered, 2);
        assert_eq!(signatures_for(&seen, ALICE), ["s1", "s2"]);
    }

    #[tokio::test]
    async fn fetch_failure_is_isolated_per_address() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["a1"]);
        source.push_err(ALICE);
        source.push(ALICE, &["a2", "a1"]);
        source.push(BOB, &["b1"]);
        source.push(BOB, &["b2", "b1"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        watcher.add_address(BOB).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        watcher.poll_once().await;
        let report = watcher.poll_once().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.polled, 1);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("a1"));
        assert_eq!(signatures_for(&seen, BOB), ["b1", "b2"]);

        // the next cycle is the retry
        watcher.poll_once().await;
        assert_eq!(signatures_for(&seen, ALICE), ["a1", "a2"]);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("a2"));
    }

    #[tokio::test]
    async fn page_for_address_removed_mid_fetch_is_dropped() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource {
            gate: Some(gate.clone()),
            ..ScriptedSource::default()
        });
        source.push(ALICE, &["s1"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        let polling = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.poll_once().await })
        };
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(watcher.remove_address(ALICE));
        gate.notify_one();

        let report = polling.await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.delivered, 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(watcher.last_seen(ALICE), None);
    }

    #[tokio::test]
    async fn slow_cycle_with_an_older_page_never_rewinds_the_cursor() {
        let hold = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource {
            hold_first: Some(hold.clone()),
            ..ScriptedSource::default()
        });
        source.push_slots(ALICE, &[("s1", 10)]);
        source.push_slots(ALICE, &[("s2", 20), ("s1", 10)]);
        let watcher = watcher_with(&source, OverlapPolicy::Allow);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        let slow = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.poll_once().await })
        };
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let fast = watcher.poll_once().await;
        assert_eq!(fast.delivered, 2);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("s2"));

        hold.notify_one();
        let stale = slow.await.unwrap();
        assert_eq!(stale.dropped, 1);
        assert_eq!(stale.delivered, 0);
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("s2"));
        assert_eq!(watcher.snapshot()[0].last_seen_slot, Some(20));

        let next = watcher.poll_once().await;
        assert_eq!(next.delivered, 0);
        assert_eq!(signatures_for(&seen, ALICE), ["s1", "s2"]);
    }

    #[tokio::test]
    async fn older_page_after_newer_one_is_dropped() {
        let source = Arc::new(ScriptedSource::default());
        source.push_slots(ALICE, &[("s3", 30), ("s2", 20)]);
        source.push_slots(ALICE, &[("s1", 10)]);
        source.push_slots(ALICE, &[("s4", 40), ("s3", 30)]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        watcher.poll_once().await;
        let stale = watcher.poll_once().await;
        assert_eq!((stale.polled, stale.dropped, stale.delivered), (0, 1, 0));
        assert_eq!(watcher.last_seen(ALICE).as_deref(), Some("s3"));

        watcher.poll_once().await;
        assert_eq!(signatures_for(&seen, ALICE), ["s2", "s3", "s4"]);
    }

    #[test]
    fn listener_registration_is_idempotent() {
        let watcher = watcher(&Arc::default());
        let (_, listener) = recorder();
        assert!(watcher.on_transaction(listener.clone()));
        assert!(!watcher.on_transaction(listener.clone()));
        assert_eq!(watcher.listener_count(), 1);
        assert!(watcher.off_transaction(&listener));
        assert!(!watcher.off_transaction(&listener));
        assert_eq!(watcher.listener_count(), 0);
    }

    #[tokio::test]
    async fn unregistered_listener_stops_receiving() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["s1"]);
        source.push(ALICE, &["s2", "s1"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener.clone());

        watcher.poll_once().await;
        watcher.off_transaction(&listener);
        watcher.poll_once().await;

        assert_eq!(signatures_for(&seen, ALICE), ["s1"]);
    }

    #[test]
    fn start_requires_a_runtime_and_a_positive_period() {
        let watcher = watcher(&Arc::default());
        assert!(matches!(
            watcher.start(Duration::ZERO),
            Err(WatcherError::InvalidInterval)
        ));
        assert!(matches!(
            watcher.start(Duration::from_secs(1)),
            Err(WatcherError::NoRuntime)
        ));
        assert!(!watcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_halts_polling() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["s1"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);

        assert!(watcher.start(Duration::from_millis(100)).unwrap());
        assert!(!watcher.start(Duration::from_millis(250)).unwrap());
        assert!(watcher.is_running());
        assert_eq!(watcher.period(), Some(Duration::from_millis(100)));

        // nothing fires before the first period elapses
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let polled = source.calls.load(Ordering::SeqCst);
        assert_eq!(polled, 3);
        assert_eq!(signatures_for(&seen, ALICE), ["s1"]);

        assert!(watcher.stop());
        assert!(!watcher.stop());
        assert!(!watcher.is_running());
        assert_eq!(watcher.period(), None);
        source.push(ALICE, &["s2", "s1"]);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), polled);
        assert_eq!(signatures_for(&seen, ALICE), ["s1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_policy_never_overlaps_cycles() {
        let source = Arc::new(ScriptedSource {
            delay: Some(Duration::from_millis(350)),
            ..ScriptedSource::default()
        });
        let watcher = watcher_with(&source, OverlapPolicy::Skip);
        watcher.add_address(ALICE).unwrap();

        watcher.start(Duration::from_millis(100)).unwrap();
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        watcher.stop();

        // cycles start at 100, 500 and 900
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn allow_policy_starts_a_cycle_on_every_tick() {
        let source = Arc::new(ScriptedSource {
            delay: Some(Duration::from_millis(350)),
            ..ScriptedSource::default()
        });
        let watcher = watcher_with(&source, OverlapPolicy::Allow);
        watcher.add_address(ALICE).unwrap();

        watcher.start(Duration::from_millis(100)).unwrap();
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        watcher.stop();

        assert_eq!(source.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn clear_returns_to_the_constructed_state() {
        let source = Arc::new(ScriptedSource::default());
        source.push(ALICE, &["s1"]);
        let watcher = watcher(&source);
        watcher.add_address(ALICE).unwrap();
        let (seen, listener) = recorder();
        watcher.on_transaction(listener);
        watcher.start(Duration::from_secs(60)).unwrap();
        watcher.poll_once().await;

        watcher.clear();

        assert!(!watcher.is_running());
        assert!(watcher.addresses().is_empty());
        assert!(watcher.snapshot().is_empty());
        assert_eq!(watcher.listener_count(), 0);
        assert_eq!(watcher.last_seen(ALICE), None);
        assert_eq!(watcher.poll_once().await, PollReport::default());
        assert_eq!(signatures_for(&seen, ALICE), ["s1"]);
    }
}
