mod client;
mod engine;

pub use client::{HttpRemote, RemoteApi, StaffProfile};
pub use engine::{SyncEngine, SyncOutcome};
