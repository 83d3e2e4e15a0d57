use detector::{SensorId, Thresholds, Verdict, ZoneAnalysis};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Something the monitor wants the outside world to know about.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SafetyEvent {
    SensorAnalyzed {
        sensor: SensorId,
        analysis: ZoneAnalysis,
        verdict: Verdict,
    },
    SensorUnavailable {
        sensor: SensorId,
    },
    EmergencyTriggered {
        at_ms: u64,
        sensors: Vec<SensorId>,
    },
    AllClear {
        at_ms: u64,
    },
    ThresholdsUpdated {
        thresholds: Thresholds,
    },
    StateReset,
    RelayOverride {
        emergency_stop: bool,
    },
    RelayOverrideReleased,
}

/// Receiver for [`SafetyEvent`]s, injected into the monitor.
pub trait EventSink {
    fn record(&mut self, event: &SafetyEvent);
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, event: &SafetyEvent) {
        match event {
            SafetyEvent::SensorAnalyzed {
                sensor,
                analysis,
                verdict,
            } => debug!(
                sensor = %sensor,
                valid = analysis.valid_readings,
                below = analysis.below_threshold,
                closest_mm = analysis.closest_mm,
                average_mm = analysis.average_mm,
                confidence_pct = analysis.confidence_pct,
                verdict = ?verdict,
                "zone analysis"
            ),
            SafetyEvent::SensorUnavailable { sensor } => {
                debug!(sensor = %sensor, "no frame this cycle, keeping previous trigger")
            }
            SafetyEvent::EmergencyTriggered { at_ms, sensors } => {
                warn!(at_ms, sensors = ?sensors, "object detected, emergency stop triggered")
            }
            SafetyEvent::AllClear { at_ms } => {
                info!(at_ms, "all clear, emergency stop released")
            }
            SafetyEvent::ThresholdsUpdated { thresholds } => info!(
                top_mm = thresholds.top_mm,
                left_mm = thresholds.left_mm,
                right_mm = thresholds.right_mm,
                "detection thresholds updated"
            ),
            SafetyEvent::StateReset => info!("safety state reset"),
            SafetyEvent::RelayOverride { emergency_stop } => {
                warn!(emergency_stop, "relay state forced by manual override")
            }
            SafetyEvent::RelayOverrideReleased => warn!("manual override released"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    pub events: Vec<SafetyEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events other than the per-sensor analysis chatter.
    pub fn transitions(&self) -> impl Iterator<Item = &SafetyEvent> {
        self.events.iter().filter(|e| {
            !matches!(
                e,
                SafetyEvent::SensorAnalyzed { .. } | SafetyEvent::SensorUnavailable { .. }
            )
        })
    }
}

impl EventSink for EventLog {
    fn record(&mut self, event: &SafetyEvent) {
        self.events.push(event.clone());
    }
}
