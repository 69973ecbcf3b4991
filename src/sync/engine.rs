use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::{compute_delta, MetricSnapshot, MetricsTracker};
use crate::sync::RemoteApi;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub at: DateTime<Utc>,
    pub success: bool,
    pub attempts: u32,
}

struct EngineState {
    last_acked: Option<MetricSnapshot>,
    last_outcome: Option<SyncOutcome>,
}

/// Periodically diffs the tracker's cumulative snapshot against the last
/// snapshot the remote side acknowledged and transmits only the difference.
/// The remote side adds deltas to its own running totals, so local resets
/// (clock-in, midnight, restart) never corrupt them, provided every reset
/// is paired with discarding the baseline here.
pub struct SyncEngine {
    state: Arc<Mutex<EngineState>>,
    remote: Arc<dyn RemoteApi>,
    tracker: MetricsTracker,
    is_syncing: Arc<AtomicBool>,
    kick: Arc<Notify>,
    runner: Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>,
    interval: Duration,
    retry_delay: Duration,
    max_retry_attempts: u32,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        tracker: MetricsTracker,
        interval: Duration,
        retry_delay: Duration,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                last_acked: None,
                last_outcome: None,
            })),
            remote,
            tracker,
            is_syncing: Arc::new(AtomicBool::new(false)),
            kick: Arc::new(Notify::new()),
            runner: Arc::new(Mutex::new(None)),
            interval,
            retry_delay,
            max_retry_attempts,
        }
    }

    /// Sync immediately, then on the fixed interval. No-op if already
    /// running. `reset()` and `sync_now()` nudge the loop out of its wait.
    pub async fn start(&self) {
        let mut runner_guard = self.runner.lock().await;
        if runner_guard.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = self.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        engine.sync(&token).await;
                    }
                    _ = engine.kick.notified() => {
                        engine.sync(&token).await;
                    }
                    _ = token.cancelled() => {
                        log_info!("sync loop shutting down");
                        break;
                    }
                }
            }
        });

        *runner_guard = Some((handle, cancel));
    }

    /// Cancel the loop. An in-flight request is allowed to finish (or hit
    /// the client timeout) rather than be aborted, since a delta the server
    /// may have applied but never confirmed is unrecoverable.
    pub async fn stop(&self) {
        if let Some((handle, cancel)) = self.runner.lock().await.take() {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.runner.lock().await.is_some()
    }

    /// Request one prompt sync from the running loop.
    pub fn sync_now(&self) {
        self.kick.notify_one();
    }

    /// Clock-in path: discard the baseline so the next sync re-establishes
    /// it with absolute values, and kick that sync off promptly. Callers
    /// must invoke this before acting on any remote shift-started signal,
    /// or residual deltas from the prior shift leak into the new one.
    pub async fn reset(&self) {
        {
            let mut state = self.state.lock().await;
            state.last_acked = None;
        }
        self.kick.notify_one();
    }

    pub async fn last_acknowledged(&self) -> Option<MetricSnapshot> {
        self.state.lock().await.last_acked.clone()
    }

    pub async fn last_outcome(&self) -> Option<SyncOutcome> {
        self.state.lock().await.last_outcome.clone()
    }

    /// One sync round with linear-backoff retries. Skips outright if a
    /// round is already in flight.
    pub async fn sync(&self, cancel: &CancellationToken) {
        if self.is_syncing.swap(true, Ordering::SeqCst) {
            log_info!("sync already in flight; skipping this tick");
            return;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            // Single atomically-read copy: the delta must never see a
            // half-updated snapshot.
            let current = self.tracker.snapshot().await;
            let delta = {
                let state = self.state.lock().await;
                compute_delta(state.last_acked.as_ref(), &current)
            };

            match self.remote.push_metrics(&delta).await {
                Ok(()) => {
                    let mut state = self.state.lock().await;
                    state.last_acked = Some(current);
                    state.last_outcome = Some(SyncOutcome {
                        at: Utc::now(),
                        success: true,
                        attempts: attempt,
                    });
                    log_info!(
                        "sync ok (attempt {attempt}): +{}s screen, +{} keys",
                        delta.screen_time.round(),
                        delta.keystrokes
                    );
                    break;
                }
                Err(err) => {
                    if attempt > self.max_retry_attempts {
                        let mut state = self.state.lock().await;
                        state.last_outcome = Some(SyncOutcome {
                            at: Utc::now(),
                            success: false,
                            attempts: attempt,
                        });
                        log_error!(
                            "sync abandoned after {attempt} attempts (retrying next interval): {err:#}"
                        );
                        break;
                    }

                    let backoff = self.retry_delay * attempt;
                    log_warn!(
                        "sync attempt {attempt} failed, retrying in {}s: {err:#}",
                        backoff.as_secs()
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }

        self.is_syncing.store(false, Ordering::SeqCst);
    }
}

impl Clone for SyncEngine {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            remote: Arc::clone(&self.remote),
            tracker: self.tracker.clone(),
            is_syncing: Arc::clone(&self.is_syncing),
            kick: Arc::clone(&self.kick),
            runner: Arc::clone(&self.runner),
            interval: self.interval,
            retry_delay: self.retry_delay,
            max_retry_attempts: self.max_retry_attempts,
        }
    }
}
