pub mod agent;
pub mod breaks;
pub mod capture;
pub mod events;
pub mod gate;
pub mod identity;
pub mod idle;
pub mod metrics;
pub mod observers;
pub mod settings;
pub mod sync;
pub mod utils;

pub use agent::{Agent, AgentStatus};
pub use breaks::{BreakSession, BreakType};
pub use events::{InputKind, ShellEvent};
pub use gate::PortalContext;
pub use metrics::{MetricSnapshot, SyncDelta};
pub use settings::Settings;
