use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::RgbaImage;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Duration;

use workpulse::breaks::{BreakCoordinator, BreakType};
use workpulse::capture::{
    CaptureReason, CaptureScheduler, CaptureUpload, DisplayFrame, ScreenSource,
};
use workpulse::identity::IdentityStore;
use workpulse::idle::IdleClassifier;
use workpulse::metrics::{MetricsTracker, SyncDelta};
use workpulse::observers::NullIdleProbe;
use workpulse::sync::{RemoteApi, StaffProfile};

struct FakeScreens {
    displays: usize,
}

impl ScreenSource for FakeScreens {
    fn capture_all(&self) -> Result<Vec<DisplayFrame>> {
        Ok((0..self.displays)
            .map(|index| DisplayFrame {
                index,
                label: format!("display-{index}"),
                image: RgbaImage::new(8, 8),
            })
            .collect())
    }
}

/// Records accepted uploads. `gate` (when present) blocks each upload until
/// a permit arrives; `fail_display` rejects one display's uploads.
struct FakeRemote {
    uploads: Mutex<Vec<CaptureUpload>>,
    uploads_started: AtomicU32,
    gate: Option<Semaphore>,
    fail_display: Option<usize>,
}

impl FakeRemote {
    fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            uploads_started: AtomicU32::new(0),
            gate: None,
            fail_display: None,
        }
    }

    fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    fn failing_display(index: usize) -> Self {
        Self {
            fail_display: Some(index),
            ..Self::new()
        }
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn push_metrics(&self, _delta: &SyncDelta) -> Result<()> {
        Ok(())
    }

    async fn upload_screenshot(&self, upload: CaptureUpload) -> Result<()> {
        self.uploads_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        if self.fail_display == Some(upload.display_index) {
            bail!("simulated upload failure for display {}", upload.display_index);
        }
        self.uploads.lock().await.push(upload);
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<StaffProfile> {
        Ok(StaffProfile {
            staff_id: "staff-1".into(),
        })
    }
}

fn scheduler_with(
    remote: Arc<FakeRemote>,
    displays: usize,
) -> (CaptureScheduler, IdentityStore, BreakCoordinator) {
    let identity = IdentityStore::new();
    let tracker = MetricsTracker::new();
    let classifier = IdleClassifier::new(Arc::new(NullIdleProbe), 30.0, 30.0);
    let breaks = BreakCoordinator::new(tracker, classifier);
    let scheduler = CaptureScheduler::new(
        Arc::new(FakeScreens { displays }),
        remote,
        identity.clone(),
        breaks.clone(),
        Duration::from_secs(3600),
    );
    (scheduler, identity, breaks)
}

#[tokio::test]
async fn capture_uploads_one_request_per_display() {
    let remote = Arc::new(FakeRemote::new());
    let (scheduler, identity, _breaks) = scheduler_with(Arc::clone(&remote), 2);
    identity.set_staff_id("staff-9".into()).await;

    assert!(scheduler.capture_now(CaptureReason::Manual).await);

    let uploads = remote.uploads.lock().await;
    assert_eq!(uploads.len(), 2);
    for upload in uploads.iter() {
        assert_eq!(upload.reason, CaptureReason::Manual);
        assert_eq!(upload.staff_id.as_deref(), Some("staff-9"));
        assert!(!upload.jpeg.is_empty());
    }
    let mut labels: Vec<_> = uploads.iter().map(|u| u.display_label.clone()).collect();
    labels.sort();
    assert_eq!(labels, vec!["display-0", "display-1"]);
}

#[tokio::test]
async fn concurrent_trigger_is_dropped_not_queued() {
    let remote = Arc::new(FakeRemote::gated());
    let (scheduler, _identity, _breaks) = scheduler_with(Arc::clone(&remote), 2);

    let in_flight = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.capture_now(CaptureReason::Manual).await })
    };

    // Wait until the first cycle is provably mid-upload.
    while remote.uploads_started.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(!scheduler.capture_now(CaptureReason::Inactivity).await);
    assert_eq!(remote.uploads_started.load(Ordering::SeqCst), 2);

    remote.gate.as_ref().unwrap().add_permits(2);
    assert!(in_flight.await.expect("capture task panicked"));
    assert_eq!(scheduler.cycles_completed(), 1);

    // With the flag released, the next trigger goes through again.
    remote.gate.as_ref().unwrap().add_permits(2);
    assert!(scheduler.capture_now(CaptureReason::Manual).await);
    assert_eq!(scheduler.cycles_completed(), 2);
}

#[tokio::test]
async fn one_failed_display_does_not_block_the_others() {
    let remote = Arc::new(FakeRemote::failing_display(0));
    let (scheduler, _identity, _breaks) = scheduler_with(Arc::clone(&remote), 3);

    assert!(scheduler.capture_now(CaptureReason::Scheduled).await);

    let uploads = remote.uploads.lock().await;
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|u| u.display_index != 0));
}

#[tokio::test]
async fn captures_are_suppressed_during_breaks() {
    let remote = Arc::new(FakeRemote::new());
    let (scheduler, _identity, breaks) = scheduler_with(Arc::clone(&remote), 1);

    breaks
        .start_break(BreakType::Lunch, None, None, None)
        .await;

    assert!(!scheduler.capture_now(CaptureReason::Scheduled).await);
    assert_eq!(remote.uploads.lock().await.len(), 0);

    breaks.end_break().await;
    assert!(scheduler.capture_now(CaptureReason::Scheduled).await);
    assert_eq!(remote.uploads.lock().await.len(), 1);
}

#[tokio::test]
async fn a_host_without_displays_still_completes_the_cycle() {
    let remote = Arc::new(FakeRemote::new());
    let (scheduler, _identity, _breaks) = scheduler_with(Arc::clone(&remote), 0);

    assert!(scheduler.capture_now(CaptureReason::Initial).await);
    assert_eq!(remote.uploads.lock().await.len(), 0);
    assert_eq!(scheduler.cycles_completed(), 1);
}
