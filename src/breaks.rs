use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::idle::IdleClassifier;
use crate::metrics::MetricsTracker;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BreakType {
    Lunch,
    ShortBreak,
    Bathroom,
    Coffee,
    Away,
}

impl BreakType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakType::Lunch => "Lunch",
            BreakType::ShortBreak => "ShortBreak",
            BreakType::Bathroom => "Bathroom",
            BreakType::Coffee => "Coffee",
            BreakType::Away => "Away",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreakSession {
    pub id: String,
    pub break_type: BreakType,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub actual_start: DateTime<Utc>,
    pub actual_end: Option<DateTime<Utc>>,
    pub late: bool,
    pub late_by_secs: i64,
    pub away_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    Working,
    OnBreak,
}

/// Explicit pause/resume gate around rest periods, independent of organic
/// idle detection. Sole writer of break state; the tracker and the capture
/// scheduler consult it before acting. Holds at most one open BreakSession.
pub struct BreakCoordinator {
    inner: Arc<Mutex<Option<BreakSession>>>,
    tracker: MetricsTracker,
    classifier: IdleClassifier,
}

impl BreakCoordinator {
    pub fn new(tracker: MetricsTracker, classifier: IdleClassifier) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            tracker,
            classifier,
        }
    }

    pub async fn state(&self) -> WorkState {
        if self.inner.lock().await.is_some() {
            WorkState::OnBreak
        } else {
            WorkState::Working
        }
    }

    pub async fn is_on_break(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn current_session(&self) -> Option<BreakSession> {
        self.inner.lock().await.clone()
    }

    /// WORKING -> ON_BREAK. Starting a break while one is open returns the
    /// existing session without pausing a second time.
    pub async fn start_break(
        &self,
        break_type: BreakType,
        scheduled_start: Option<DateTime<Utc>>,
        scheduled_end: Option<DateTime<Utc>>,
        away_reason: Option<String>,
    ) -> BreakSession {
        let mut guard = self.inner.lock().await;
        if let Some(open) = guard.as_ref() {
            info!(
                "start_break({}) ignored; {} break already open",
                break_type.as_str(),
                open.break_type.as_str()
            );
            return open.clone();
        }

        let now = Utc::now();
        let late_by_secs = scheduled_start
            .map(|scheduled| (now - scheduled).num_seconds().max(0))
            .unwrap_or(0);

        let session = BreakSession {
            id: Uuid::new_v4().to_string(),
            break_type,
            scheduled_start,
            scheduled_end,
            actual_start: now,
            actual_end: None,
            late: late_by_secs > 0,
            late_by_secs,
            away_reason,
        };

        self.tracker.pause().await;
        self.classifier.set_side_effects_enabled(false);
        info!(
            "break started: {} (late by {}s)",
            break_type.as_str(),
            late_by_secs
        );

        *guard = Some(session.clone());
        session
    }

    /// ON_BREAK -> WORKING. Ending while working is a no-op returning None.
    pub async fn end_break(&self) -> Option<BreakSession> {
        let mut guard = self.inner.lock().await;
        let Some(mut session) = guard.take() else {
            info!("end_break ignored; no break open");
            return None;
        };

        session.actual_end = Some(Utc::now());
        self.classifier.set_side_effects_enabled(true);
        self.tracker.resume().await;
        info!("break ended: {}", session.break_type.as_str());

        Some(session)
    }
}

impl Clone for BreakCoordinator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            tracker: self.tracker.clone(),
            classifier: self.classifier.clone(),
        }
    }
}
