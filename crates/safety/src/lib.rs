//! Multi-sensor emergency-stop decision.
//!
//! Per-sensor verdicts are debounced into stable triggers, the three triggers
//! are OR-ed into one emergency stop, and the [`Monitor`] drives the fail-safe
//! relays from the result once per cycle.

use detector::SensorId;
use serde::Serialize;

mod config;
mod events;
mod monitor;
mod status;

pub use config::{ConfigError, DebounceParams, MonitorConfig};
pub use events::{EventLog, EventSink, SafetyEvent, TracingSink};
pub use monitor::{Clock, CycleReport, FrameSource, Monitor, MonotonicClock, SensorCycle};
pub use status::{SensorStatus, StatusReport};

/// Consecutive-detection tracking for one sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SensorDebounceState {
    pub consecutive_detections: u8,
    pub triggered: bool,
}

impl SensorDebounceState {
    /// Fold one cycle's verdict in. A detection counts up (saturating at 255);
    /// anything else clears the counter and the trigger at once.
    pub fn record(&mut self, detected: bool, required: u8) {
        self.consecutive_detections = if detected {
            self.consecutive_detections.saturating_add(1)
        } else {
            0
        };
        // A zero requirement would leave a cleared sensor triggered.
        self.triggered = self.consecutive_detections >= required.max(1);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyMode {
    Clear,
    Emergency,
}

/// Edge of the emergency-stop state produced by one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Tripped,
    Cleared,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SafetyState {
    pub top: SensorDebounceState,
    pub left: SensorDebounceState,
    pub right: SensorDebounceState,
    pub emergency_stop: bool,
    /// Time of the last CLEAR -> EMERGENCY edge, 0 before the first one.
    pub last_trigger_ms: u64,
}

impl SafetyState {
    pub fn sensor(&self, id: SensorId) -> &SensorDebounceState {
        match id {
            SensorId::Top => &self.top,
            SensorId::Left => &self.left,
            SensorId::Right => &self.right,
        }
    }

    pub fn sensor_mut(&mut self, id: SensorId) -> &mut SensorDebounceState {
        match id {
            SensorId::Top => &mut self.top,
            SensorId::Left => &mut self.left,
            SensorId::Right => &mut self.right,
        }
    }

    pub fn triggered(&self, id: SensorId) -> bool {
        self.sensor(id).triggered
    }

    pub fn consecutive_detections(&self, id: SensorId) -> u8 {
        self.sensor(id).consecutive_detections
    }

    pub fn any_triggered(&self) -> bool {
        self.top.triggered || self.left.triggered || self.right.triggered
    }

    /// Sensors currently holding a trigger, in `[top, left, right]` order.
    pub fn triggered_sensors(&self) -> Vec<SensorId> {
        SensorId::ALL
            .into_iter()
            .filter(|&id| self.triggered(id))
            .collect()
    }

    pub fn mode(&self) -> SafetyMode {
        if self.emergency_stop {
            SafetyMode::Emergency
        } else {
            SafetyMode::Clear
        }
    }
}

/// Recompute the emergency stop from the three triggers.
///
/// Only the CLEAR -> EMERGENCY edge stamps `last_trigger_ms`; clearing keeps
/// the previous stamp for diagnostics.
pub fn aggregate(state: &mut SafetyState, now_ms: u64) -> Option<Transition> {
    let previous = state.emergency_stop;
    state.emergency_stop = state.any_triggered();

    match (previous, state.emergency_stop) {
        (false, true) => {
            state.last_trigger_ms = now_ms;
            Some(Transition::Tripped)
        }
        (true, false) => Some(Transition::Cleared),
        _ => None,
    }
}
