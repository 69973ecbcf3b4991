use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::breaks::BreakCoordinator;
use crate::capture::screen::{encode_frame, DisplayFrame, ScreenSource};
use crate::capture::{CaptureReason, CaptureUpload};
use crate::identity::IdentityStore;
use crate::sync::RemoteApi;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const CAPTURE_TIMEOUT_SECS: u64 = 15;

/// Funnels the scheduled, inactivity, manual, and initial triggers into one
/// capture-and-upload routine guarded by a single in-flight flag. A trigger
/// arriving while a cycle is running is dropped (logged, not queued).
pub struct CaptureScheduler {
    source: Arc<dyn ScreenSource>,
    remote: Arc<dyn RemoteApi>,
    identity: IdentityStore,
    breaks: BreakCoordinator,
    is_processing: Arc<AtomicBool>,
    cycles_completed: Arc<AtomicU64>,
    runner: Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>,
    interval: Duration,
}

impl CaptureScheduler {
    pub fn new(
        source: Arc<dyn ScreenSource>,
        remote: Arc<dyn RemoteApi>,
        identity: IdentityStore,
        breaks: BreakCoordinator,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            remote,
            identity,
            breaks,
            is_processing: Arc::new(AtomicBool::new(false)),
            cycles_completed: Arc::new(AtomicU64::new(0)),
            runner: Arc::new(Mutex::new(None)),
            interval,
        }
    }

    /// Start the fixed-interval trigger and listen for inactivity triggers.
    /// No-op if already running.
    pub async fn start(&self, mut inactivity_rx: mpsc::Receiver<()>) {
        let mut runner_guard = self.runner.lock().await;
        if runner_guard.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Swallow the interval's immediate first tick; the initial
            // capture is its own trigger.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.spawn_cycle(CaptureReason::Scheduled);
                    }
                    received = inactivity_rx.recv() => {
                        if received.is_none() {
                            // Tick loop dropped its sender; interval trigger keeps going.
                            continue;
                        }
                        scheduler.spawn_cycle(CaptureReason::Inactivity);
                    }
                    _ = token.cancelled() => {
                        log_info!("capture scheduler shutting down");
                        break;
                    }
                }
            }
        });

        *runner_guard = Some((handle, cancel));
    }

    pub async fn stop(&self) {
        if let Some((handle, cancel)) = self.runner.lock().await.take() {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.runner.lock().await.is_some()
    }

    /// Completed capture cycles (all displays of one trigger count as one).
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::SeqCst)
    }

    /// On-demand capture. Returns false when the trigger was dropped
    /// (break in progress, or a cycle already in flight).
    pub async fn capture_now(&self, reason: CaptureReason) -> bool {
        self.run_cycle(reason).await
    }

    fn spawn_cycle(&self, reason: CaptureReason) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_cycle(reason).await;
        });
    }

    async fn run_cycle(&self, reason: CaptureReason) -> bool {
        if self.breaks.is_on_break().await {
            log_info!("capture ({}) suppressed during break", reason.as_str());
            return false;
        }

        if self.is_processing.swap(true, Ordering::SeqCst) {
            log_info!(
                "capture ({}) dropped; a cycle is already in flight",
                reason.as_str()
            );
            return false;
        }

        let outcome = self.capture_cycle(reason).await;
        self.is_processing.store(false, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                self.cycles_completed.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(err) => {
                log_warn!("capture cycle ({}) failed: {err:#}", reason.as_str());
                false
            }
        }
    }

    async fn capture_cycle(&self, reason: CaptureReason) -> Result<()> {
        let source = Arc::clone(&self.source);
        let frames = tokio::time::timeout(
            Duration::from_secs(CAPTURE_TIMEOUT_SECS),
            tokio::task::spawn_blocking(move || source.capture_all()),
        )
        .await
        .map_err(|_| anyhow!("display capture timed out (> {}s)", CAPTURE_TIMEOUT_SECS))?
        .context("capture worker join failed")??;

        if frames.is_empty() {
            log_info!("capture ({}): no displays available", reason.as_str());
            return Ok(());
        }

        let captured_at = Utc::now();
        let staff_id = self.identity.staff_id().await;

        // Upload each display independently; one failed display never
        // blocks or retries the others in the same cycle.
        let mut uploads = tokio::task::JoinSet::new();
        for frame in frames {
            let remote = Arc::clone(&self.remote);
            let staff_id = staff_id.clone();
            uploads.spawn(async move {
                let index = frame.index;
                let result = upload_frame(remote, frame, reason, captured_at, staff_id).await;
                (index, result)
            });
        }

        while let Some(joined) = uploads.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(err))) => {
                    // Dropped, not queued: screenshots have no retry path.
                    log_warn!("screenshot upload for display {index} lost: {err:#}");
                }
                Err(err) => log_warn!("screenshot upload task panicked: {err}"),
            }
        }

        Ok(())
    }
}

async fn upload_frame(
    remote: Arc<dyn RemoteApi>,
    frame: DisplayFrame,
    reason: CaptureReason,
    captured_at: chrono::DateTime<Utc>,
    staff_id: Option<String>,
) -> Result<()> {
    let display_index = frame.index;
    let display_label = frame.label.clone();

    let jpeg = tokio::task::spawn_blocking(move || encode_frame(&frame))
        .await
        .context("encode worker join failed")??;

    remote
        .upload_screenshot(CaptureUpload {
            display_index,
            display_label,
            jpeg,
            reason,
            captured_at,
            staff_id,
        })
        .await
}

impl Clone for CaptureScheduler {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            remote: Arc::clone(&self.remote),
            identity: self.identity.clone(),
            breaks: self.breaks.clone(),
            is_processing: Arc::clone(&self.is_processing),
            cycles_completed: Arc::clone(&self.cycles_completed),
            runner: Arc::clone(&self.runner),
            interval: self.interval,
        }
    }
}
