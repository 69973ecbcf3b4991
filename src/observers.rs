use std::sync::{Arc, Mutex};

use log::{info, warn};
use sysinfo::Networks;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::MetricsTracker;

/// Best-effort system probe for seconds since the last global input event.
/// Returns `None` when the platform offers no such counter; the classifier
/// then degrades to its own last-observed-activity timestamp.
pub trait IdleProbe: Send + Sync {
    fn idle_seconds(&self) -> Option<f64>;
}

/// Null-object fallback used when no platform probe is available. The
/// classifier logs the degrade once and relies on shell-reported activity.
pub struct NullIdleProbe;

impl IdleProbe for NullIdleProbe {
    fn idle_seconds(&self) -> Option<f64> {
        None
    }
}

/// Pick the best idle probe for this platform. None of the supported
/// targets expose a portable global-input counter without extra system
/// libraries, so this currently always selects the null probe; the shell's
/// input reports keep the fallback accurate.
pub fn detect_idle_probe() -> Arc<dyn IdleProbe> {
    Arc::new(NullIdleProbe)
}

/// Cumulative received+transmitted bytes across all interfaces.
pub trait NetworkProbe: Send {
    fn total_bytes(&mut self) -> Option<u64>;
}

pub struct SysinfoNetworkProbe {
    networks: Networks,
}

impl SysinfoNetworkProbe {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoNetworkProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProbe for SysinfoNetworkProbe {
    fn total_bytes(&mut self) -> Option<u64> {
        self.networks.refresh();
        let total = self
            .networks
            .iter()
            .map(|(_, data)| data.total_received() + data.total_transmitted())
            .sum();
        Some(total)
    }
}

pub struct NullNetworkProbe;

impl NetworkProbe for NullNetworkProbe {
    fn total_bytes(&mut self) -> Option<u64> {
        None
    }
}

const BANDWIDTH_POLL_SECS: u64 = 10;

/// Periodically polls the network probe and feeds positive byte deltas into
/// the tracker's bandwidth counter. A probe returning `None` parks the
/// observer permanently (logged once); the counter then just stays at zero.
pub struct BandwidthObserver {
    probe: Arc<Mutex<dyn NetworkProbe>>,
}

impl BandwidthObserver {
    pub fn new(probe: Arc<Mutex<dyn NetworkProbe>>) -> Self {
        Self { probe }
    }

    pub fn spawn(self, tracker: MetricsTracker, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(BANDWIDTH_POLL_SECS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut last_total: Option<u64> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let total = self.probe.lock().unwrap().total_bytes();
                        let Some(total) = total else {
                            info!("network probe unavailable; bandwidth counter stays at zero");
                            return;
                        };

                        if let Some(previous) = last_total {
                            // Counter resets (interface down/up) show as a drop;
                            // skip the sample rather than credit garbage.
                            if total >= previous {
                                let delta = total - previous;
                                if delta > 0 {
                                    tracker.add_bandwidth_bytes(delta).await;
                                }
                            } else {
                                warn!("network byte counter went backwards ({} -> {}); skipping sample", previous, total);
                            }
                        }
                        last_total = Some(total);
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }
}
