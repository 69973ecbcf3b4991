mod scheduler;
mod screen;

pub use scheduler::CaptureScheduler;
pub use screen::{DisplayFrame, NullScreenSource, ScreenSource, XcapScreenSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureReason {
    Scheduled,
    Inactivity,
    Manual,
    Initial,
}

impl CaptureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureReason::Scheduled => "scheduled",
            CaptureReason::Inactivity => "inactivity",
            CaptureReason::Manual => "manual",
            CaptureReason::Initial => "initial",
        }
    }
}

/// One display's encoded capture, ready for upload. Created, uploaded, and
/// discarded; never written to disk.
#[derive(Debug, Clone)]
pub struct CaptureUpload {
    pub display_index: usize,
    pub display_label: String,
    pub jpeg: Vec<u8>,
    pub reason: CaptureReason,
    pub captured_at: DateTime<Utc>,
    pub staff_id: Option<String>,
}
