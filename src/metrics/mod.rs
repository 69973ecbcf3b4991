mod types;

pub use types::{compute_delta, MetricSnapshot, SyncDelta};

use std::sync::Arc;
use std::time::Instant;

use log::warn;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::InputKind;
use crate::idle::IdleClassifier;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::log_info;

/// Dedup sets stop growing past this many entries; the counters keep
/// counting. First rejected insert is logged (once per set per shift).
const MAX_SET_ENTRIES: usize = 1024;

struct TrackerState {
    snapshot: MetricSnapshot,
    paused: bool,
    apps_cap_warned: bool,
    urls_cap_warned: bool,
}

impl TrackerState {
    fn new() -> Self {
        Self {
            snapshot: MetricSnapshot::default(),
            paused: false,
            apps_cap_warned: false,
            urls_cap_warned: false,
        }
    }

    fn advance(&mut self, elapsed_secs: f64, is_active: bool) {
        self.snapshot.screen_time += elapsed_secs;
        if is_active {
            self.snapshot.active_time += elapsed_secs;
        }
        // Idle time is deliberately NOT advanced here; the classifier
        // credits whole spans through add_idle_time on the idle -> active
        // edge, so the two paths can never double count.
        self.snapshot.productivity_score = self.snapshot.compute_productivity_score();
    }
}

/// Owns the cumulative counters and timers for the current shift. All
/// mutation happens here; the sync engine only ever receives deep copies
/// through `snapshot()`.
pub struct MetricsTracker {
    inner: Arc<Mutex<TrackerState>>,
    ticker: Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerState::new())),
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    /// Begin periodic ticking. No-op if the loop is already running; the
    /// caller is responsible for not starting tracking in an ineligible
    /// portal context.
    pub async fn start(
        &self,
        classifier: IdleClassifier,
        inactivity_tx: mpsc::Sender<()>,
        tick_interval: Duration,
    ) {
        let mut ticker_guard = self.ticker.lock().await;
        if ticker_guard.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let state = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_tick = Instant::now();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = Instant::now();
                        let elapsed = now.duration_since(last_tick).as_secs_f64();
                        last_tick = now;

                        let mut guard = state.lock().await;
                        if guard.paused {
                            continue;
                        }

                        let observation = classifier.observe();
                        guard.advance(elapsed, observation.is_active);
                        if let Some(span) = observation.completed_idle_span {
                            guard.snapshot.idle_time += span.max(0.0);
                        }
                        drop(guard);

                        if observation.inactivity_trigger {
                            // Scheduler not listening (stopped) is fine.
                            let _ = inactivity_tx.try_send(());
                        }
                    }
                    _ = token.cancelled() => {
                        log_info!("metrics tick loop shutting down");
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some((handle, cancel));
    }

    pub async fn stop(&self) {
        if let Some((handle, cancel)) = self.ticker.lock().await.take() {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.ticker.lock().await.is_some()
    }

    /// Single tick step, exposed for the loop above and for tests that
    /// drive time by hand.
    pub async fn advance(&self, elapsed_secs: f64, is_active: bool) {
        let mut guard = self.inner.lock().await;
        if guard.paused {
            return;
        }
        guard.advance(elapsed_secs, is_active);
    }

    pub async fn record_input(&self, kind: InputKind) {
        let mut guard = self.inner.lock().await;
        match kind {
            InputKind::Key => guard.snapshot.keystrokes += 1,
            InputKind::MouseClick => guard.snapshot.mouse_clicks += 1,
            InputKind::MouseMove => guard.snapshot.mouse_movements += 1,
        }
    }

    pub async fn record_clipboard_change(&self) {
        self.inner.lock().await.snapshot.clipboard_actions += 1;
    }

    pub async fn record_app_switch(&self, name: &str) {
        let mut guard = self.inner.lock().await;
        if guard.snapshot.applications_used.len() < MAX_SET_ENTRIES
            || guard.snapshot.applications_used.contains(name)
        {
            guard.snapshot.applications_used.insert(name.to_string());
        } else if !guard.apps_cap_warned {
            guard.apps_cap_warned = true;
            warn!("applications_used set hit its {} entry cap", MAX_SET_ENTRIES);
        }
    }

    pub async fn record_url_visit(&self, url: &str) {
        let mut guard = self.inner.lock().await;
        guard.snapshot.urls_visited_count += 1;
        if guard.snapshot.visited_urls.len() < MAX_SET_ENTRIES
            || guard.snapshot.visited_urls.contains(url)
        {
            guard.snapshot.visited_urls.insert(url.to_string());
        } else if !guard.urls_cap_warned {
            guard.urls_cap_warned = true;
            warn!("visited_urls set hit its {} entry cap", MAX_SET_ENTRIES);
        }
    }

    pub async fn record_tab_switch(&self) {
        self.inner.lock().await.snapshot.tabs_switched += 1;
    }

    pub async fn record_file_access(&self) {
        self.inner.lock().await.snapshot.files_accessed += 1;
    }

    pub async fn record_download(&self) {
        self.inner.lock().await.snapshot.downloads += 1;
    }

    pub async fn record_upload(&self) {
        self.inner.lock().await.snapshot.uploads += 1;
    }

    pub async fn add_bandwidth_bytes(&self, bytes: u64) {
        self.inner.lock().await.snapshot.bandwidth_bytes += bytes;
    }

    /// External idle-credit path; additive and never negative.
    pub async fn add_idle_time(&self, seconds: f64) {
        if seconds <= 0.0 {
            return;
        }
        self.inner.lock().await.snapshot.idle_time += seconds;
    }

    pub async fn pause(&self) {
        self.inner.lock().await.paused = true;
    }

    pub async fn resume(&self) {
        self.inner.lock().await.paused = false;
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.lock().await.paused
    }

    /// Zero everything. Used on clock-in and at local-midnight rollover;
    /// callers pair this with discarding the sync baseline.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        guard.snapshot = MetricSnapshot::default();
        guard.apps_cap_warned = false;
        guard.urls_cap_warned = false;
    }

    /// Deep copy of the current snapshot.
    pub async fn snapshot(&self) -> MetricSnapshot {
        self.inner.lock().await.snapshot.clone()
    }
}

impl Clone for MetricsTracker {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ticker: Arc::clone(&self.ticker),
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
