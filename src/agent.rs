use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::breaks::{BreakCoordinator, BreakSession, BreakType};
use crate::capture::{CaptureReason, CaptureScheduler, ScreenSource, XcapScreenSource};
use crate::events::{EventBus, ShellEvent};
use crate::gate::{ContextGate, GateTransition, PortalContext};
use crate::identity::IdentityStore;
use crate::idle::IdleClassifier;
use crate::metrics::{MetricSnapshot, MetricsTracker};
use crate::observers::{
    detect_idle_probe, BandwidthObserver, IdleProbe, NetworkProbe, SysinfoNetworkProbe,
};
use crate::settings::Settings;
use crate::sync::{HttpRemote, RemoteApi, SyncEngine, SyncOutcome};

const INACTIVITY_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub tracking: bool,
    pub paused: bool,
    pub portal: PortalContext,
    pub eligible: bool,
    pub on_break: bool,
    pub current_break: Option<BreakSession>,
    pub staff_id: Option<String>,
    pub last_sync: Option<SyncOutcome>,
}

/// The wired components, cheap to clone into spawned tasks.
#[derive(Clone)]
struct AgentCore {
    settings: Settings,
    tracker: MetricsTracker,
    classifier: IdleClassifier,
    breaks: BreakCoordinator,
    scheduler: CaptureScheduler,
    sync: SyncEngine,
    identity: IdentityStore,
    remote: Arc<dyn RemoteApi>,
    network_probe: Arc<std::sync::Mutex<dyn NetworkProbe>>,
    bandwidth_cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl AgentCore {
    /// Bring up the tick loop, capture scheduler, sync engine, and
    /// bandwidth observer. Each start is individually a no-op when already
    /// running, so re-entry is harmless.
    async fn start_services(&self) {
        let (inactivity_tx, inactivity_rx) = mpsc::channel(INACTIVITY_QUEUE_DEPTH);

        self.tracker
            .start(
                self.classifier.clone(),
                inactivity_tx,
                self.settings.tracking_interval(),
            )
            .await;
        self.scheduler.start(inactivity_rx).await;
        self.sync.start().await;

        {
            let mut guard = self.bandwidth_cancel.lock().await;
            if guard.is_none() {
                let cancel = CancellationToken::new();
                BandwidthObserver::new(Arc::clone(&self.network_probe))
                    .spawn(self.tracker.clone(), cancel.clone());
                *guard = Some(cancel);
            }
        }

        // First capture of the shift; failures are logged and dropped like
        // any other capture.
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            scheduler.capture_now(CaptureReason::Initial).await;
        });

        info!("tracking services started");
    }

    async fn stop_services(&self) {
        self.tracker.stop().await;
        self.scheduler.stop().await;
        self.sync.stop().await;
        if let Some(cancel) = self.bandwidth_cancel.lock().await.take() {
            cancel.cancel();
        }
        info!("tracking services stopped");
    }

    /// Local-midnight rollover: zero the shift counters and discard the
    /// sync baseline, in that order, so the first delta of the new day is
    /// absolute.
    async fn rollover(&self) {
        info!("local midnight rollover; resetting shift metrics");
        self.tracker.reset().await;
        self.sync.reset().await;
    }
}

/// Top-level handle owning the wired subsystem. The surrounding shell talks
/// to the agent exclusively through these methods and `report()`.
pub struct Agent {
    core: AgentCore,
    bus: EventBus,
    gate: Arc<Mutex<ContextGate>>,
    desired_tracking: Arc<AtomicBool>,
    root_cancel: CancellationToken,
}

impl Agent {
    /// Production wiring: HTTP remote, xcap screen source, platform probes.
    pub fn new(settings: Settings) -> Result<Self> {
        let identity = IdentityStore::new();
        let remote: Arc<dyn RemoteApi> = Arc::new(
            HttpRemote::new(settings.base_url.clone(), identity.clone())
                .context("failed to construct remote client")?,
        );

        Ok(Self::with_parts(
            settings,
            identity,
            remote,
            Arc::new(XcapScreenSource),
            detect_idle_probe(),
            Arc::new(std::sync::Mutex::new(SysinfoNetworkProbe::new())),
        ))
    }

    /// Explicit-construction wiring seam; tests inject fakes here.
    pub fn with_parts(
        settings: Settings,
        identity: IdentityStore,
        remote: Arc<dyn RemoteApi>,
        screen_source: Arc<dyn ScreenSource>,
        idle_probe: Arc<dyn IdleProbe>,
        network_probe: Arc<std::sync::Mutex<dyn NetworkProbe>>,
    ) -> Self {
        let classifier = IdleClassifier::new(
            idle_probe,
            settings.idle_threshold_secs_f64(),
            settings.inactivity_threshold_secs_f64(),
        );
        let tracker = MetricsTracker::new();
        let breaks = BreakCoordinator::new(tracker.clone(), classifier.clone());
        let scheduler = CaptureScheduler::new(
            screen_source,
            Arc::clone(&remote),
            identity.clone(),
            breaks.clone(),
            settings.screenshot_interval(),
        );
        let sync = SyncEngine::new(
            Arc::clone(&remote),
            tracker.clone(),
            settings.sync_interval(),
            settings.retry_delay(),
            settings.max_retry_attempts,
        );

        let core = AgentCore {
            settings,
            tracker,
            classifier,
            breaks,
            scheduler,
            sync,
            identity,
            remote,
            network_probe,
            bandwidth_cancel: Arc::new(Mutex::new(None)),
        };

        let agent = Self {
            core,
            bus: EventBus::new(),
            gate: Arc::new(Mutex::new(ContextGate::new())),
            desired_tracking: Arc::new(AtomicBool::new(true)),
            root_cancel: CancellationToken::new(),
        };

        agent.spawn_event_forwarder();
        agent.spawn_midnight_rollover();
        agent
    }

    /// Feed a shell-observed event into the bus.
    pub fn report(&self, event: ShellEvent) {
        self.bus.publish(event);
    }

    /// Enable tracking. Starts services immediately when the current portal
    /// context is eligible; otherwise they come up on the next eligible
    /// navigation. Idempotent.
    pub async fn start_tracking(&self) {
        self.desired_tracking.store(true, Ordering::SeqCst);
        let eligible = self.gate.lock().await.is_eligible();
        if eligible {
            self.core.start_services().await;
        } else {
            info!("start_tracking deferred; current portal is not trackable");
        }
    }

    /// Disable tracking and stop all services. Idempotent.
    pub async fn stop_tracking(&self) {
        self.desired_tracking.store(false, Ordering::SeqCst);
        self.core.stop_services().await;
    }

    pub async fn pause_tracking(&self) {
        self.core.tracker.pause().await;
    }

    pub async fn resume_tracking(&self) {
        self.core.tracker.resume().await;
    }

    pub async fn start_break(
        &self,
        break_type: BreakType,
        scheduled_start: Option<DateTime<Utc>>,
        scheduled_end: Option<DateTime<Utc>>,
        away_reason: Option<String>,
    ) -> BreakSession {
        self.core
            .breaks
            .start_break(break_type, scheduled_start, scheduled_end, away_reason)
            .await
    }

    pub async fn end_break(&self) -> Option<BreakSession> {
        self.core.breaks.end_break().await
    }

    /// Clock-in: zero the shift counters, then discard the sync baseline.
    /// This must complete before any shift-started signal is acted on, so
    /// residual deltas from the prior shift cannot leak into the new one.
    pub async fn clock_in(&self) {
        info!("clock-in; resetting shift metrics");
        self.core.tracker.reset().await;
        self.core.sync.reset().await;
    }

    pub fn sync_now(&self) {
        self.core.sync.sync_now();
    }

    pub async fn capture_now(&self) -> bool {
        self.core.scheduler.capture_now(CaptureReason::Manual).await
    }

    pub async fn snapshot(&self) -> MetricSnapshot {
        self.core.tracker.snapshot().await
    }

    pub async fn status(&self) -> AgentStatus {
        let (portal, eligible) = {
            let gate = self.gate.lock().await;
            (gate.context(), gate.is_eligible())
        };

        AgentStatus {
            tracking: self.core.tracker.is_running().await,
            paused: self.core.tracker.is_paused().await,
            portal,
            eligible,
            on_break: self.core.breaks.is_on_break().await,
            current_break: self.core.breaks.current_session().await,
            staff_id: self.core.identity.staff_id().await,
            last_sync: self.core.sync.last_outcome().await,
        }
    }

    /// Store the login-derived credential and resolve the staff identifier
    /// from it. Resolution failure is logged and left for the next bind or
    /// refresh; uploads fall back to the credential alone meanwhile.
    pub async fn bind_credential(&self, credential: String) -> Option<String> {
        self.core.identity.set_credential(credential).await;
        self.refresh_identity().await
    }

    pub async fn refresh_identity(&self) -> Option<String> {
        match self.core.remote.fetch_profile().await {
            Ok(profile) => {
                self.core
                    .identity
                    .set_staff_id(profile.staff_id.clone())
                    .await;
                info!("identity bound: staff {}", profile.staff_id);
                Some(profile.staff_id)
            }
            Err(err) => {
                warn!("identity resolution failed (will retry on next bind): {err:#}");
                None
            }
        }
    }

    /// Stop everything and cancel the background tasks. An in-flight sync
    /// is allowed to finish before the engine task joins.
    pub async fn shutdown(&self) {
        info!("agent shutting down");
        self.core.stop_services().await;
        self.root_cancel.cancel();
    }

    fn spawn_event_forwarder(&self) {
        let mut rx = self.bus.subscribe();
        let core = self.core.clone();
        let gate = Arc::clone(&self.gate);
        let desired = Arc::clone(&self.desired_tracking);
        let cancel = self.root_cancel.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    received = rx.recv() => match received {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("event forwarder lagged; {missed} events dropped");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = cancel.cancelled() => break,
                };

                match event {
                    ShellEvent::Navigated(context) => {
                        let transition = gate.lock().await.on_navigation(context);
                        match transition {
                            GateTransition::BecameEligible => {
                                if desired.load(Ordering::SeqCst) {
                                    core.start_services().await;
                                }
                            }
                            GateTransition::BecameIneligible => {
                                core.stop_services().await;
                            }
                            GateTransition::Unchanged => {}
                        }
                    }
                    // The activity anchor always moves; the counters only
                    // accrue while the tracker is actually running, so an
                    // ineligible portal records nothing.
                    ShellEvent::Input(kind) => {
                        core.classifier.record_activity();
                        if core.tracker.is_running().await {
                            core.tracker.record_input(kind).await;
                        }
                    }
                    ShellEvent::ClipboardChanged => {
                        core.classifier.record_activity();
                        if core.tracker.is_running().await {
                            core.tracker.record_clipboard_change().await;
                        }
                    }
                    ShellEvent::AppFocused(name) => {
                        core.classifier.record_activity();
                        if core.tracker.is_running().await {
                            core.tracker.record_app_switch(&name).await;
                        }
                    }
                    ShellEvent::UrlVisited(url) => {
                        core.classifier.record_activity();
                        if core.tracker.is_running().await {
                            core.tracker.record_url_visit(&url).await;
                        }
                    }
                    ShellEvent::TabSwitched => {
                        core.classifier.record_activity();
                        if core.tracker.is_running().await {
                            core.tracker.record_tab_switch().await;
                        }
                    }
                    ShellEvent::FileAccessed => {
                        if core.tracker.is_running().await {
                            core.tracker.record_file_access().await;
                        }
                    }
                    ShellEvent::DownloadStarted => {
                        if core.tracker.is_running().await {
                            core.tracker.record_download().await;
                        }
                    }
                    ShellEvent::UploadStarted => {
                        if core.tracker.is_running().await {
                            core.tracker.record_upload().await;
                        }
                    }
                    ShellEvent::PowerResumed => {
                        // Wake from sleep must not read as one giant input gap.
                        core.classifier.record_activity();
                    }
                }
            }
        });
    }

    fn spawn_midnight_rollover(&self) {
        let core = self.core.clone();
        let cancel = self.root_cancel.clone();

        tokio::spawn(async move {
            loop {
                let Some(wait) = duration_until_local_midnight() else {
                    // Calendar math failed; try again in an hour.
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_secs(3600)) => continue,
                        _ = cancel.cancelled() => break,
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        core.rollover().await;
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }
}

fn duration_until_local_midnight() -> Option<std::time::Duration> {
    let now = Local::now();
    let midnight = (now + ChronoDuration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)?;
    (midnight - now.naive_local()).to_std().ok()
}
