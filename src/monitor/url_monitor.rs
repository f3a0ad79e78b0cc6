//! # URL Monitor
//!
//! Periodically probes every registered long URL and reports links whose
//! accessibility flipped since the previous sweep.
//!
//! Per link state machine:
//!
//! ```text
//!   Unknown ──first probe──▶ Accessible ◀──────▶ Inaccessible
//!      │                                 notify
//!      └─────first probe──▶ Inaccessible
//! ```
//!
//! The first observation of a link only records a baseline. Observed states
//! live in memory and are lost on restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::prober::{Accessibility, LivenessProber, DEFAULT_PROBE_TIMEOUT};
use crate::{
    database::LinkStore,
    error::{AppError, Result},
    models::Link,
};

/// Buffered notifications per subscriber before the slowest one lags.
const NOTIFICATION_CAPACITY: usize = 256;

// =====================================
// Types
// =====================================
/// What the monitor currently knows about a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    /// Never probed since the monitor started
    Unknown,
    Accessible,
    Inaccessible,
}

impl From<Accessibility> for LinkState {
    fn from(value: Accessibility) -> Self {
        match value {
            Accessibility::Accessible => Self::Accessible,
            Accessibility::Inaccessible => Self::Inaccessible,
        }
    }
}

/// A link whose accessibility changed between two sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkTransition {
    pub link_id: i64,
    pub short_code: String,
    pub long_url: String,
    pub previous: Accessibility,
    pub current: Accessibility,
    pub observed_at: DateTime<Utc>,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Links probed
    pub checked: usize,
    /// Links seen for the first time
    pub baselined: usize,
    pub transitions: Vec<LinkTransition>,
}

enum Observation {
    Baseline,
    Unchanged,
    Changed(LinkTransition),
}

// =====================================
// URL Monitor
// =====================================
pub struct UrlMonitor {
    store: Arc<dyn LinkStore>,
    prober: Arc<dyn LivenessProber>,
    probe_timeout: Duration,
    known_states: Mutex<HashMap<i64, Accessibility>>,
    notifications: broadcast::Sender<LinkTransition>,
}

impl std::fmt::Debug for UrlMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlMonitor")
            .field("probe_timeout", &self.probe_timeout)
            .field("tracked_links", &self.tracked_links())
            .finish_non_exhaustive()
    }
}

impl UrlMonitor {
    /// Monitor with the default 5 second probe timeout and no known states.
    #[must_use]
    pub fn new(store: Arc<dyn LinkStore>, prober: Arc<dyn LivenessProber>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            store,
            prober,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            known_states: Mutex::new(HashMap::new()),
            notifications,
        }
    }

    /// Overrides the hard timeout applied to every probe.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Receives every transition emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LinkTransition> {
        self.notifications.subscribe()
    }

    /// Last observed state of `link_id`, `Unknown` before its first probe.
    #[must_use]
    pub fn state_of(&self, link_id: i64) -> LinkState {
        self.known_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&link_id)
            .map_or(LinkState::Unknown, |state| LinkState::from(*state))
    }

    /// Number of links with a recorded state.
    #[must_use]
    pub fn tracked_links(&self) -> usize {
        self.known_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Probes every link once.
    ///
    /// # Errors
    /// Fails only if the link list cannot be read; individual probe
    /// failures are folded into [`Accessibility::Inaccessible`].
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let links = self.store.list_all().await?;
        debug!(count = links.len(), "Checking link availability");

        let mut report = SweepReport::default();
        for link in &links {
            let current = self.probe(link).await;
            report.checked += 1;

            match self.record(link, current) {
                Observation::Baseline => report.baselined += 1,
                Observation::Unchanged => {}
                Observation::Changed(transition) => report.transitions.push(transition),
            }
        }

        info!(
            checked = report.checked,
            baselined = report.baselined,
            transitions = report.transitions.len(),
            "Link availability check finished"
        );
        Ok(report)
    }

    /// Probes `link`, bounded by the probe timeout whatever the prober does.
    async fn probe(&self, link: &Link) -> Accessibility {
        let probe = self.prober.probe(&link.long_url, self.probe_timeout);
        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(state) => state,
            Err(_) => {
                debug!(
                    link_id = link.id,
                    url = %link.long_url,
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Probe timed out"
                );
                Accessibility::Inaccessible
            }
        }
    }

    /// Stores `current` for `link` and compares it with the value it replaced.
    fn record(&self, link: &Link, current: Accessibility) -> Observation {
        // read previous and write current in one critical section;
        // compare against the replaced value afterwards
        let previous = self
            .known_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(link.id, current);

        let Some(previous) = previous else {
            info!(
                short_code = %link.short_code,
                url = %link.long_url,
                state = %current,
                "Initial state recorded"
            );
            return Observation::Baseline;
        };

        if previous == current {
            return Observation::Unchanged;
        }

        let transition = LinkTransition {
            link_id: link.id,
            short_code: link.short_code.clone(),
            long_url: link.long_url.clone(),
            previous,
            current,
            observed_at: Utc::now(),
        };

        warn!(
            target: "link_shortener::notification",
            link_id = link.id,
            short_code = %link.short_code,
            url = %link.long_url,
            previous = %previous,
            current = %current,
            "Link changed from {} to {}",
            previous,
            current
        );
        // no subscribers is fine
        let _ = self.notifications.send(transition.clone());

        Observation::Changed(transition)
    }

    /// Runs one sweep now and one per `interval` until the returned handle
    /// is stopped or dropped.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] if `interval` is zero; nothing is spawned.
    pub fn start(self: Arc<Self>, interval: Duration) -> Result<MonitorHandle> {
        if interval.is_zero() {
            return Err(AppError::Config("monitor interval cannot be 0".to_string()));
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);

        info!(interval_secs = interval.as_secs(), "Starting URL monitor");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    result = self.sweep() => {
                        if let Err(err) = result {
                            error!(error = %err, "Could not load links, skipping this check");
                        }
                    }
                }
            }

            info!("URL monitor stopped");
        });

        Ok(MonitorHandle { stop_tx, task })
    }
}

// =====================================
// Monitor Handle
// =====================================
/// Stop signal and task of a running monitor. Dropping it also stops the
/// monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signals the loop and waits for it; an in-flight sweep is cancelled.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "URL monitor task ended abnormally");
        }
    }

    /// Whether the monitor task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// =====================================
// Tests
// =====================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{LinkStore, MemoryLinkStore, MockLinkStore};
    use crate::error::StoreError;
    use crate::models::NewLink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a mutable url → state table; unknown urls hang forever.
    #[derive(Default)]
    struct ScriptedProber {
        answers: Mutex<HashMap<String, Accessibility>>,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn set(&self, url: &str, state: Accessibility) {
            self.answers.lock().unwrap().insert(url.to_string(), state);
        }
    }

    #[async_trait]
    impl LivenessProber for ScriptedProber {
        async fn probe(&self, url: &str, _timeout: Duration) -> Accessibility {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answers.lock().unwrap().get(url).copied();
            match answer {
                Some(state) => state,
                None => std::future::pending().await,
            }
        }
    }

    async fn store_with(urls: &[&str]) -> Arc<MemoryLinkStore> {
        let store = Arc::new(MemoryLinkStore::new());
        for (i, url) in urls.iter().enumerate() {
            store
                .insert(NewLink::new(format!("code{i:02}"), *url))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_first_sweep_only_records_baseline() {
        let store = store_with(&["https://a.example"]).await;
        let prober = Arc::new(ScriptedProber::default());
        prober.set("https://a.example", Accessibility::Accessible);

        let monitor = UrlMonitor::new(store, prober);
        assert_eq!(monitor.state_of(1), LinkState::Unknown);

        let report = monitor.sweep().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.baselined, 1);
        assert!(report.transitions.is_empty());
        assert_eq!(monitor.state_of(1), LinkState::Accessible);
    }

    #[tokio::test]
    async fn test_change_emits_exactly_one_transition() {
        let store = store_with(&["https://a.example"]).await;
        let prober = Arc::new(ScriptedProber::default());
        prober.set("https://a.example", Accessibility::Accessible);

        let monitor = UrlMonitor::new(store, prober.clone());
        let mut notifications = monitor.subscribe();

        monitor.sweep().await.unwrap();

        prober.set("https://a.example", Accessibility::Inaccessible);
        let second = monitor.sweep().await.unwrap();
        assert_eq!(second.transitions.len(), 1);
        let transition = &second.transitions[0];
        assert_eq!(transition.link_id, 1);
        assert_eq!(transition.short_code, "code00");
        assert_eq!(transition.long_url, "https://a.example");
        assert_eq!(transition.previous, Accessibility::Accessible);
        assert_eq!(transition.current, Accessibility::Inaccessible);

        let third = monitor.sweep().await.unwrap();
        assert!(third.transitions.is_empty());
        assert_eq!(third.baselined, 0);

        let received = notifications.try_recv().unwrap();
        assert_eq!(&received, transition);
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_exceeding_timeout_is_inaccessible() {
        // no scripted answer: the prober never returns
        let store = store_with(&["https://slow.example"]).await;
        let monitor = UrlMonitor::new(store, Arc::new(ScriptedProber::default()))
            .with_probe_timeout(Duration::from_secs(5));

        monitor.sweep().await.unwrap();

        assert_eq!(monitor.state_of(1), LinkState::Inaccessible);
    }

    #[tokio::test]
    async fn test_store_failure_fails_the_sweep_only() {
        let mut store = MockLinkStore::new();
        store
            .expect_list_all()
            .times(1)
            .returning(|| Err(StoreError::Unavailable("database is locked".to_string())));

        let monitor = UrlMonitor::new(Arc::new(store), Arc::new(ScriptedProber::default()));
        assert!(monitor.sweep().await.is_err());
        assert_eq!(monitor.tracked_links(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_sweeps_immediately_then_every_interval() {
        let store = store_with(&["https://a.example"]).await;
        let prober = Arc::new(ScriptedProber::default());
        prober.set("https://a.example", Accessibility::Accessible);

        let monitor = Arc::new(UrlMonitor::new(store, prober.clone()));
        let handle = monitor.clone().start(Duration::from_secs(60)).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_listing_skips_one_tick_and_keeps_running() {
        let listings = Arc::new(AtomicUsize::new(0));
        let counter = listings.clone();

        let mut store = MockLinkStore::new();
        store.expect_list_all().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Unavailable("database is locked".to_string()))
            } else {
                Ok(vec![NewLink::new("code00", "https://a.example").into_link(1)])
            }
        });

        let prober = Arc::new(ScriptedProber::default());
        prober.set("https://a.example", Accessibility::Accessible);

        let monitor = Arc::new(UrlMonitor::new(Arc::new(store), prober.clone()));
        let handle = monitor.clone().start(Duration::from_secs(10)).unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert!(!handle.is_finished());
        assert_eq!(listings.load(Ordering::SeqCst), 3);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.state_of(1), LinkState::Accessible);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let monitor = Arc::new(UrlMonitor::new(
            Arc::new(MemoryLinkStore::new()),
            Arc::new(ScriptedProber::default()),
        ));

        assert!(matches!(monitor.start(Duration::ZERO), Err(AppError::Config(_))));
    }
}
