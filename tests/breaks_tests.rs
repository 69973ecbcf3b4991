use std::sync::Arc;

use workpulse::breaks::{BreakCoordinator, BreakType, WorkState};
use workpulse::idle::IdleClassifier;
use workpulse::metrics::MetricsTracker;
use workpulse::observers::NullIdleProbe;

fn coordinator() -> (BreakCoordinator, MetricsTracker, IdleClassifier) {
    let tracker = MetricsTracker::new();
    let classifier = IdleClassifier::new(Arc::new(NullIdleProbe), 30.0, 30.0);
    let coordinator = BreakCoordinator::new(tracker.clone(), classifier.clone());
    (coordinator, tracker, classifier)
}

#[tokio::test]
async fn starting_a_break_pauses_the_tracker() {
    let (coordinator, tracker, _) = coordinator();
    assert_eq!(coordinator.state().await, WorkState::Working);

    let session = coordinator
        .start_break(BreakType::Lunch, None, None, None)
        .await;

    assert_eq!(coordinator.state().await, WorkState::OnBreak);
    assert!(tracker.is_paused().await);
    assert!(session.actual_end.is_none());
    assert!(!session.late);
}

#[tokio::test]
async fn second_start_returns_the_open_session_unchanged() {
    let (coordinator, tracker, _) = coordinator();

    let first = coordinator
        .start_break(BreakType::ShortBreak, None, None, None)
        .await;

    // Un-pausing behind the coordinator's back: a genuine second pause
    // would re-set this flag, which must not happen.
    tracker.resume().await;

    let second = coordinator
        .start_break(BreakType::Lunch, None, None, None)
        .await;

    assert_eq!(first.id, second.id);
    assert_eq!(second.break_type, BreakType::ShortBreak);
    assert!(!tracker.is_paused().await);
}

#[tokio::test]
async fn ending_without_a_break_is_a_noop() {
    let (coordinator, tracker, _) = coordinator();
    assert!(coordinator.end_break().await.is_none());
    assert!(!tracker.is_paused().await);
}

#[tokio::test]
async fn lateness_is_measured_against_the_scheduled_start() {
    let (coordinator, _, _) = coordinator();

    let scheduled = chrono::Utc::now() - chrono::Duration::seconds(120);
    let session = coordinator
        .start_break(BreakType::Lunch, Some(scheduled), None, None)
        .await;

    assert!(session.late);
    assert!(session.late_by_secs >= 120);
}

#[tokio::test]
async fn early_break_is_not_late() {
    let (coordinator, _, _) = coordinator();

    let scheduled = chrono::Utc::now() + chrono::Duration::seconds(300);
    let session = coordinator
        .start_break(BreakType::Coffee, Some(scheduled), None, None)
        .await;

    assert!(!session.late);
    assert_eq!(session.late_by_secs, 0);
}

#[tokio::test]
async fn ticks_during_a_break_advance_nothing_and_resume_after() {
    let (coordinator, tracker, _) = coordinator();

    tracker.advance(1.0, true).await;
    assert!((tracker.snapshot().await.active_time - 1.0).abs() < f64::EPSILON);

    coordinator
        .start_break(BreakType::Lunch, None, None, None)
        .await;

    tracker.advance(5.0, true).await;
    tracker.advance(5.0, false).await;

    let during = tracker.snapshot().await;
    assert!((during.active_time - 1.0).abs() < f64::EPSILON);
    assert!((during.screen_time - 1.0).abs() < f64::EPSILON);
    assert_eq!(during.idle_time, 0.0);

    let closed = coordinator.end_break().await.expect("break should close");
    assert!(closed.actual_end.is_some());

    tracker.advance(2.0, true).await;
    let after = tracker.snapshot().await;
    assert!((after.active_time - 3.0).abs() < f64::EPSILON);
    assert!((after.screen_time - 3.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn break_suppresses_classifier_side_effects() {
    let (coordinator, _tracker, classifier) = coordinator();

    // No activity reported: the fallback says we are deep into an idle span.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    coordinator
        .start_break(BreakType::Away, None, None, Some("errand".into()))
        .await;

    let observation = classifier.observe();
    assert!(observation.completed_idle_span.is_none());
    assert!(!observation.inactivity_trigger);
}
