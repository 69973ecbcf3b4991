use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, info};

use crate::observers::IdleProbe;

/// Report produced once per tick. `completed_idle_span` and
/// `inactivity_trigger` are only ever set while side effects are enabled
/// (they are suppressed for the whole duration of a break).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleObservation {
    pub idle_seconds: f64,
    pub is_active: bool,
    /// Length of the idle span that just ended, reported exactly once on the
    /// idle -> active transition. This is the only path that credits idle
    /// time, so tick-loop active crediting can never double count it.
    pub completed_idle_span: Option<f64>,
    /// Set once per idle span, when idle duration first crosses the
    /// inactivity capture threshold.
    pub inactivity_trigger: bool,
}

struct ClassifierState {
    last_activity: Instant,
    was_idle: bool,
    last_idle_seconds: f64,
    inactivity_fired: bool,
    side_effects_enabled: bool,
    degrade_logged: bool,
}

/// Classifies the user as active or idle from a platform idle probe, falling
/// back to the timestamp of the last shell-reported input when no probe
/// exists. Owns idle-time accounting: spans are credited on the
/// idle -> active edge via the tracker's additive path.
#[derive(Clone)]
pub struct IdleClassifier {
    probe: Arc<dyn IdleProbe>,
    inner: Arc<Mutex<ClassifierState>>,
    idle_threshold_secs: f64,
    inactivity_threshold_secs: f64,
}

impl IdleClassifier {
    pub fn new(
        probe: Arc<dyn IdleProbe>,
        idle_threshold_secs: f64,
        inactivity_threshold_secs: f64,
    ) -> Self {
        Self {
            probe,
            inner: Arc::new(Mutex::new(ClassifierState {
                last_activity: Instant::now(),
                was_idle: false,
                last_idle_seconds: 0.0,
                inactivity_fired: false,
                side_effects_enabled: true,
                degrade_logged: false,
            })),
            idle_threshold_secs,
            inactivity_threshold_secs,
        }
    }

    /// Seconds since the last global input. Pure read, no side effects.
    pub fn idle_seconds(&self) -> f64 {
        let mut state = self.inner.lock().unwrap();
        match self.probe.idle_seconds() {
            Some(seconds) => seconds,
            None => {
                if !state.degrade_logged {
                    info!("no platform idle probe; using last-observed-activity fallback");
                    state.degrade_logged = true;
                }
                state.last_activity.elapsed().as_secs_f64()
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle_seconds() >= self.idle_threshold_secs
    }

    /// Refresh the fallback anchor. Called for every input-type shell event
    /// and on power resume, so sleep is never read as one long input gap.
    pub fn record_activity(&self) {
        let mut state = self.inner.lock().unwrap();
        state.last_activity = Instant::now();
    }

    /// Gate for the classifier's side effects (idle spans, inactivity
    /// triggers). The break coordinator turns this off for the duration of a
    /// break; toggling in either direction discards the span in progress so
    /// break time is never credited as idle work time.
    pub fn set_side_effects_enabled(&self, enabled: bool) {
        let mut state = self.inner.lock().unwrap();
        state.side_effects_enabled = enabled;
        state.was_idle = false;
        state.last_idle_seconds = 0.0;
        state.inactivity_fired = false;
        // Break end counts as an activity signal for the fallback.
        state.last_activity = Instant::now();
    }

    /// One classification step. Invoked by the tracker's tick loop.
    pub fn observe(&self) -> IdleObservation {
        let idle_seconds = self.idle_seconds();
        let mut state = self.inner.lock().unwrap();
        let is_active = idle_seconds < self.idle_threshold_secs;

        if !state.side_effects_enabled {
            return IdleObservation {
                idle_seconds,
                is_active,
                completed_idle_span: None,
                inactivity_trigger: false,
            };
        }

        let mut completed_idle_span = None;
        let mut inactivity_trigger = false;

        if is_active {
            if state.was_idle {
                // The last reading taken while still idle is the best
                // estimate of the full gap (the probe has already reset).
                completed_idle_span = Some(state.last_idle_seconds);
                debug!(
                    "idle span ended after {:.1}s",
                    state.last_idle_seconds
                );
            }
            state.was_idle = false;
            state.last_idle_seconds = 0.0;
            state.inactivity_fired = false;
        } else {
            state.was_idle = true;
            state.last_idle_seconds = idle_seconds;
            if idle_seconds >= self.inactivity_threshold_secs && !state.inactivity_fired {
                state.inactivity_fired = true;
                inactivity_trigger = true;
            }
        }

        IdleObservation {
            idle_seconds,
            is_active,
            completed_idle_span,
            inactivity_trigger,
        }
    }
}
