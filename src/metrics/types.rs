use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Cumulative in-process state for the current shift. Every counter and
/// duration is monotonically non-decreasing between resets; the sets are
/// deduplicated. The sync engine only ever sees deep copies of this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub mouse_movements: u64,
    pub mouse_clicks: u64,
    pub keystrokes: u64,
    pub clipboard_actions: u64,
    pub files_accessed: u64,
    pub downloads: u64,
    pub uploads: u64,
    pub bandwidth_bytes: u64,
    pub tabs_switched: u64,
    pub urls_visited_count: u64,
    /// Seconds. Accrues every tick regardless of activity state.
    pub screen_time: f64,
    /// Seconds. Accrues only on ticks where the classifier reports active.
    pub active_time: f64,
    /// Seconds. Credited in whole idle spans on the idle->active edge.
    pub idle_time: f64,
    /// Derived each tick, never accumulated.
    pub productivity_score: u32,
    pub applications_used: BTreeSet<String>,
    pub visited_urls: BTreeSet<String>,
}

impl Default for MetricSnapshot {
    fn default() -> Self {
        Self {
            mouse_movements: 0,
            mouse_clicks: 0,
            keystrokes: 0,
            clipboard_actions: 0,
            files_accessed: 0,
            downloads: 0,
            uploads: 0,
            bandwidth_bytes: 0,
            tabs_switched: 0,
            urls_visited_count: 0,
            screen_time: 0.0,
            active_time: 0.0,
            idle_time: 0.0,
            productivity_score: 0,
            applications_used: BTreeSet::new(),
            visited_urls: BTreeSet::new(),
        }
    }
}

impl MetricSnapshot {
    /// Weighted blend of activity ratio, keystroke volume, and click volume.
    /// Each term saturates at its cap: 40 + 30 + 30 = 100 max.
    pub fn compute_productivity_score(&self) -> u32 {
        let tracked = self.active_time + self.idle_time;
        let activity_term = if tracked > 0.0 {
            (40.0 * self.active_time / tracked).min(40.0)
        } else {
            0.0
        };
        let keystroke_term = (30.0 * self.keystrokes as f64 / 5000.0).min(30.0);
        let click_term = (30.0 * self.mouse_clicks as f64 / 1000.0).min(30.0);

        (activity_term + keystroke_term + click_term).round() as u32
    }
}

/// Wire payload for one sync round. Numeric fields are differences against
/// the last acknowledged snapshot; the sets ride along as full current
/// contents so the remote side can overwrite rather than merge them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncDelta {
    pub mouse_movements: u64,
    pub mouse_clicks: u64,
    pub keystrokes: u64,
    pub clipboard_actions: u64,
    pub files_accessed: u64,
    pub downloads: u64,
    pub uploads: u64,
    pub bandwidth_bytes: u64,
    pub tabs_switched: u64,
    pub urls_visited_count: u64,
    pub screen_time: f64,
    pub active_time: f64,
    pub idle_time: f64,
    pub productivity_score: u32,
    pub applications_used: Vec<String>,
    pub visited_urls: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Field-wise difference of two snapshots. A null baseline means this is the
/// first sync after a reset: the delta is the current snapshot verbatim.
/// Counters use saturating subtraction; within a shift the snapshot is
/// monotonic, so nothing ever actually saturates.
pub fn compute_delta(baseline: Option<&MetricSnapshot>, current: &MetricSnapshot) -> SyncDelta {
    let zero = MetricSnapshot::default();
    let base = baseline.unwrap_or(&zero);

    SyncDelta {
        mouse_movements: current.mouse_movements.saturating_sub(base.mouse_movements),
        mouse_clicks: current.mouse_clicks.saturating_sub(base.mouse_clicks),
        keystrokes: current.keystrokes.saturating_sub(base.keystrokes),
        clipboard_actions: current
            .clipboard_actions
            .saturating_sub(base.clipboard_actions),
        files_accessed: current.files_accessed.saturating_sub(base.files_accessed),
        downloads: current.downloads.saturating_sub(base.downloads),
        uploads: current.uploads.saturating_sub(base.uploads),
        bandwidth_bytes: current.bandwidth_bytes.saturating_sub(base.bandwidth_bytes),
        tabs_switched: current.tabs_switched.saturating_sub(base.tabs_switched),
        urls_visited_count: current
            .urls_visited_count
            .saturating_sub(base.urls_visited_count),
        screen_time: (current.screen_time - base.screen_time).max(0.0),
        active_time: (current.active_time - base.active_time).max(0.0),
        idle_time: (current.idle_time - base.idle_time).max(0.0),
        productivity_score: current.productivity_score,
        applications_used: current.applications_used.iter().cloned().collect(),
        visited_urls: current.visited_urls.iter().cloned().collect(),
        recorded_at: Utc::now(),
    }
}
