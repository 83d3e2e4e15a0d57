use std::fmt;

use detector::{SensorId, Thresholds};
use relay::{RelayActuator, RelayOutputs, RelayPosition};
use serde::Serialize;

use crate::{SafetyMode, SafetyState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SensorStatus {
    pub sensor: SensorId,
    pub triggered: bool,
    pub consecutive_detections: u8,
    pub threshold_mm: u16,
}

/// Human-facing summary of a monitor at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub mode: SafetyMode,
    pub sensors: [SensorStatus; 3],
    /// How long the current emergency has lasted. `None` while clear.
    pub trigger_duration_ms: Option<u64>,
    pub relay: RelayPosition,
    pub relay_overridden: bool,
    pub relay_fault: Option<String>,
}

impl StatusReport {
    pub fn new<R: RelayOutputs>(
        state: &SafetyState,
        thresholds: &Thresholds,
        relay: &RelayActuator<R>,
        now_ms: u64,
    ) -> Self {
        let sensors = SensorId::ALL.map(|id| SensorStatus {
            sensor: id,
            triggered: state.triggered(id),
            consecutive_detections: state.consecutive_detections(id),
            threshold_mm: thresholds.get(id),
        });

        Self {
            mode: state.mode(),
            sensors,
            trigger_duration_ms: state
                .emergency_stop
                .then(|| now_ms.saturating_sub(state.last_trigger_ms)),
            relay: relay.position(),
            relay_overridden: relay.is_overridden(),
            relay_fault: relay.fault().map(|e| e.to_string()),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SAFETY STATUS")?;
        let stop = match self.mode {
            SafetyMode::Emergency => "ACTIVE",
            SafetyMode::Clear => "inactive",
        };
        writeln!(f, "  emergency stop: {stop}")?;
        for s in &self.sensors {
            writeln!(
                f,
                "  {:<5} {:<9} ({} consecutive, threshold {}mm)",
                s.sensor.name(),
                if s.triggered { "TRIGGERED" } else { "clear" },
                s.consecutive_detections,
                s.threshold_mm,
            )?;
        }
        if let Some(ms) = self.trigger_duration_ms {
            writeln!(f, "  trigger duration: {ms}ms")?;
        }
        write!(f, "  relays: {:?}", self.relay)?;
        if self.relay_overridden {
            write!(f, " (manual override)")?;
        }
        if let Some(fault) = &self.relay_fault {
            write!(f, " FAULT: {fault}")?;
        }
        Ok(())
    }
}
