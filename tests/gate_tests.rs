use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use image::RgbaImage;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use workpulse::agent::Agent;
use workpulse::capture::{CaptureUpload, DisplayFrame, ScreenSource};
use workpulse::events::{InputKind, ShellEvent};
use workpulse::gate::{ContextGate, GateTransition, PortalContext};
use workpulse::identity::IdentityStore;
use workpulse::metrics::SyncDelta;
use workpulse::observers::{NullIdleProbe, NullNetworkProbe};
use workpulse::settings::Settings;
use workpulse::sync::{RemoteApi, StaffProfile};

#[test]
fn gate_starts_ineligible_and_follows_navigation() {
    let mut gate = ContextGate::new();
    assert!(!gate.is_eligible());

    assert_eq!(
        gate.on_navigation(PortalContext::Staff),
        GateTransition::BecameEligible
    );
    assert_eq!(
        gate.on_navigation(PortalContext::Staff),
        GateTransition::Unchanged
    );
    assert_eq!(
        gate.on_navigation(PortalContext::Admin),
        GateTransition::BecameIneligible
    );
    assert_eq!(
        gate.on_navigation(PortalContext::Login),
        GateTransition::Unchanged
    );
    assert_eq!(
        gate.on_navigation(PortalContext::Staff),
        GateTransition::BecameEligible
    );
}

struct QuietRemote {
    pushes: Mutex<Vec<SyncDelta>>,
}

#[async_trait]
impl RemoteApi for QuietRemote {
    async fn push_metrics(&self, delta: &SyncDelta) -> Result<()> {
        self.pushes.lock().await.push(delta.clone());
        Ok(())
    }

    async fn upload_screenshot(&self, _upload: CaptureUpload) -> Result<()> {
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<StaffProfile> {
        Ok(StaffProfile {
            staff_id: "staff-42".into(),
        })
    }
}

struct OneScreen;

impl ScreenSource for OneScreen {
    fn capture_all(&self) -> Result<Vec<DisplayFrame>> {
        Ok(vec![DisplayFrame {
            index: 0,
            label: "main".into(),
            image: RgbaImage::new(8, 8),
        }])
    }
}

fn test_agent() -> Agent {
    let settings = Settings {
        tracking_interval_secs: 1,
        sync_interval_secs: 3600,
        screenshot_interval_secs: 3600,
        ..Settings::default()
    };

    Agent::with_parts(
        settings,
        IdentityStore::new(),
        Arc::new(QuietRemote {
            pushes: Mutex::new(Vec::new()),
        }),
        Arc::new(OneScreen),
        Arc::new(NullIdleProbe),
        Arc::new(std::sync::Mutex::new(NullNetworkProbe)),
    )
}

async fn wait_for_tracking(agent: &Agent, expected: bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if agent.status().await.tracking == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "tracking never became {expected}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn navigating_to_the_staff_portal_starts_tracking() {
    let agent = test_agent();
    assert!(!agent.status().await.tracking);

    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    wait_for_tracking(&agent, true).await;

    let status = agent.status().await;
    assert!(status.eligible);
    assert_eq!(status.portal, PortalContext::Staff);

    agent.shutdown().await;
}

#[tokio::test]
async fn navigating_away_stops_tracking_and_back_restarts_it() {
    let agent = test_agent();
    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    wait_for_tracking(&agent, true).await;

    agent.report(ShellEvent::Navigated(PortalContext::Client));
    wait_for_tracking(&agent, false).await;
    assert!(!agent.status().await.eligible);

    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    wait_for_tracking(&agent, true).await;

    agent.shutdown().await;
}

#[tokio::test]
async fn start_tracking_defers_until_an_eligible_portal() {
    let agent = test_agent();

    agent.start_tracking().await;
    assert!(!agent.status().await.tracking);

    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    wait_for_tracking(&agent, true).await;

    agent.shutdown().await;
}

#[tokio::test]
async fn explicit_stop_survives_an_eligible_navigation() {
    let agent = test_agent();
    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    wait_for_tracking(&agent, true).await;

    agent.stop_tracking().await;
    wait_for_tracking(&agent, false).await;

    // Bouncing through ineligible and back must not resurrect tracking
    // the shell explicitly turned off.
    agent.report(ShellEvent::Navigated(PortalContext::Admin));
    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!agent.status().await.tracking);

    agent.shutdown().await;
}

#[tokio::test]
async fn shell_events_feed_the_counters_while_tracking() {
    let agent = test_agent();
    agent.report(ShellEvent::Navigated(PortalContext::Staff));
    wait_for_tracking(&agent, true).await;

    agent.report(ShellEvent::Input(InputKind::Key));
    agent.report(ShellEvent::Input(InputKind::MouseClick));
    agent.report(ShellEvent::ClipboardChanged);
    agent.report(ShellEvent::AppFocused("Terminal".into()));
    agent.report(ShellEvent::UrlVisited("https://example.com".into()));
    agent.report(ShellEvent::TabSwitched);
    agent.report(ShellEvent::FileAccessed);
    agent.report(ShellEvent::DownloadStarted);
    agent.report(ShellEvent::UploadStarted);

    // Broadcast delivery is asynchronous; give the forwarder a beat.
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let snapshot = agent.snapshot().await;
        if snapshot.uploads == 1 {
            assert_eq!(snapshot.keystrokes, 1);
            assert_eq!(snapshot.mouse_clicks, 1);
            assert_eq!(snapshot.clipboard_actions, 1);
            assert_eq!(snapshot.tabs_switched, 1);
            assert_eq!(snapshot.files_accessed, 1);
            assert_eq!(snapshot.downloads, 1);
            assert_eq!(snapshot.urls_visited_count, 1);
            assert!(snapshot.applications_used.contains("Terminal"));
            assert!(snapshot.visited_urls.contains("https://example.com"));
            break;
        }
        assert!(Instant::now() < deadline, "shell events never landed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    agent.shutdown().await;
}

#[tokio::test]
async fn shell_events_are_ignored_while_ineligible() {
    let agent = test_agent();

    agent.report(ShellEvent::Input(InputKind::Key));
    agent.report(ShellEvent::UrlVisited("https://example.com".into()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = agent.snapshot().await;
    assert_eq!(snapshot.keystrokes, 0);
    assert_eq!(snapshot.urls_visited_count, 0);

    agent.shutdown().await;
}

#[tokio::test]
async fn binding_a_credential_resolves_the_staff_id() {
    let agent = test_agent();

    let staff_id = agent.bind_credential("opaque-session-token".into()).await;
    assert_eq!(staff_id.as_deref(), Some("staff-42"));
    assert_eq!(agent.status().await.staff_id.as_deref(), Some("staff-42"));

    agent.shutdown().await;
}
