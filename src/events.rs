use tokio::sync::broadcast;

use crate::gate::PortalContext;

/// Discrete events reported by the surrounding shell. The gate, tracker, and
/// capture scheduler each subscribe independently instead of being wired into
/// one orchestrator callback.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    /// The shell navigated to a different portal context.
    Navigated(PortalContext),
    Input(InputKind),
    ClipboardChanged,
    /// The foreground application changed; carries the application name.
    AppFocused(String),
    UrlVisited(String),
    TabSwitched,
    FileAccessed,
    DownloadStarted,
    UploadStarted,
    /// The workstation woke from sleep. Clears the idle fallback anchor so
    /// sleep time is not read as one long input gap.
    PowerResumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Key,
    MouseClick,
    MouseMove,
}

const BUS_CAPACITY: usize = 256;

/// Broadcast fan-out for shell events. Cheap to clone; subscribers that lag
/// behind simply miss events (acceptable: every event is an increment, none
/// carries state the system cannot live without).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ShellEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ShellEvent) {
        // Err means no live subscribers, which is fine during startup/shutdown.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShellEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
