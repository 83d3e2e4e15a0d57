use std::time::Instant;

use detector::{analyze, consensus, Frame, SensorId, Thresholds, Verdict, ZoneAnalysis};
use relay::{RelayActuator, RelayOutputs};
use serde::Serialize;

use crate::events::{EventSink, SafetyEvent, TracingSink};
use crate::status::StatusReport;
use crate::{aggregate, MonitorConfig, SafetyState, Transition};

/// Monotonic millisecond time source.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<F: Fn() -> u64> Clock for F {
    fn now_ms(&self) -> u64 {
        self()
    }
}

/// Milliseconds since construction.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Where frames come from. Bus or driver failures must come back as `None`.
pub trait FrameSource {
    fn get_frame(&mut self, sensor: SensorId) -> Option<Frame>;
}

/// What one sensor contributed to a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SensorCycle {
    pub analysis: ZoneAnalysis,
    pub verdict: Verdict,
}

/// Outcome of one [`Monitor::process_cycle_detailed`] call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CycleReport {
    pub now_ms: u64,
    /// Indexed by [`SensorId::index`]; `None` for sensors without a frame.
    pub sensors: [Option<SensorCycle>; 3],
    pub transition: Option<Transition>,
    pub emergency_stop: bool,
}

impl CycleReport {
    pub fn sensor(&self, id: SensorId) -> Option<&SensorCycle> {
        self.sensors[id.index()].as_ref()
    }
}

/// Owns everything one protected platform needs: thresholds, detection
/// tuning, the safety state and the relays.
///
/// Nothing here is shared or global; construct one per device.
pub struct Monitor<R: RelayOutputs, C: Clock, S: EventSink = TracingSink> {
    config: MonitorConfig,
    state: SafetyState,
    relay: RelayActuator<R>,
    clock: C,
    sink: S,
    /// Sensors that have delivered at least one analysed frame since start
    /// or the last reset. Relays stay open until all three have.
    reported: [bool; 3],
}

impl<R: RelayOutputs, C: Clock> Monitor<R, C, TracingSink> {
    /// Build a monitor that logs through `tracing`. The relays are opened
    /// before this returns.
    pub fn new(config: MonitorConfig, outputs: R, clock: C) -> Self {
        Self::with_sink(config, outputs, clock, TracingSink)
    }
}

impl<R: RelayOutputs, C: Clock, S: EventSink> Monitor<R, C, S> {
    pub fn with_sink(config: MonitorConfig, outputs: R, clock: C, sink: S) -> Self {
        Self {
            config,
            state: SafetyState::default(),
            relay: RelayActuator::new(outputs),
            clock,
            sink,
            reported: [false; 3],
        }
    }

    /// Run one full cycle and return the emergency-stop decision.
    ///
    /// A `None` frame means the sensor had nothing this cycle; its counter
    /// and trigger are carried over untouched.
    pub fn process_cycle(
        &mut self,
        top: Option<&Frame>,
        left: Option<&Frame>,
        right: Option<&Frame>,
    ) -> bool {
        self.process_cycle_detailed(top, left, right).emergency_stop
    }

    /// Pull one frame per sensor from `source` and run a cycle.
    pub fn poll<F: FrameSource>(&mut self, source: &mut F) -> CycleReport {
        let top = source.get_frame(SensorId::Top);
        let left = source.get_frame(SensorId::Left);
        let right = source.get_frame(SensorId::Right);
        self.process_cycle_detailed(top.as_ref(), left.as_ref(), right.as_ref())
    }

    pub fn process_cycle_detailed(
        &mut self,
        top: Option<&Frame>,
        left: Option<&Frame>,
        right: Option<&Frame>,
    ) -> CycleReport {
        let now_ms = self.clock.now_ms();
        // One threshold snapshot for the whole cycle.
        let thresholds = self.config.thresholds;
        let required = self.config.debounce.consecutive_detections;

        let mut sensors = [None; 3];
        for (id, frame) in SensorId::ALL.into_iter().zip([top, left, right]) {
            let Some(frame) = frame else {
                self.sink.record(&SafetyEvent::SensorUnavailable { sensor: id });
                continue;
            };

            let analysis = analyze(frame, thresholds.get(id), &self.config.detection, now_ms);
            let verdict = consensus(&analysis, &self.config.detection);
            self.sink.record(&SafetyEvent::SensorAnalyzed {
                sensor: id,
                analysis,
                verdict,
            });

            self.state
                .sensor_mut(id)
                .record(verdict.is_detected(), required);
            self.reported[id.index()] = true;
            sensors[id.index()] = Some(SensorCycle { analysis, verdict });
        }

        let transition = aggregate(&mut self.state, now_ms);
        match transition {
            Some(Transition::Tripped) => self.sink.record(&SafetyEvent::EmergencyTriggered {
                at_ms: now_ms,
                sensors: self.state.triggered_sensors(),
            }),
            Some(Transition::Cleared) => {
                self.sink.record(&SafetyEvent::AllClear { at_ms: now_ms })
            }
            None => {}
        }

        self.relay.apply(self.relays_must_open());

        CycleReport {
            now_ms,
            sensors,
            transition,
            emergency_stop: self.state.emergency_stop,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.config.thresholds
    }

    /// Takes effect from the next cycle. Not validated.
    pub fn set_thresholds(&mut self, top_mm: u16, left_mm: u16, right_mm: u16) {
        let thresholds = Thresholds::new(top_mm, left_mm, right_mm);
        self.config.thresholds = thresholds;
        self.sink
            .record(&SafetyEvent::ThresholdsUpdated { thresholds });
    }

    /// Snapshot of the current state.
    pub fn safety_state(&self) -> SafetyState {
        self.state.clone()
    }

    pub fn is_emergency_stop_active(&self) -> bool {
        self.state.emergency_stop
    }

    /// True once every sensor has delivered an analysed frame since start or
    /// the last reset. Until then the relays are held open.
    pub fn all_sensors_reported(&self) -> bool {
        self.reported.iter().all(|&r| r)
    }

    fn relays_must_open(&self) -> bool {
        self.state.emergency_stop || !self.all_sensors_reported()
    }

    /// Back to the power-up state: counters and flags cleared, no trigger time,
    /// and every sensor has to report again before the relays may close.
    /// The relays keep their position until the next cycle decides.
    pub fn reset_safety_state(&mut self) {
        self.state = SafetyState::default();
        self.reported = [false; 3];
        self.sink.record(&SafetyEvent::StateReset);
    }

    /// Force the relays until [`release_relay_override`](Self::release_relay_override).
    /// Expiring the override is the caller's job.
    pub fn force_relay_state(&mut self, emergency_stop: bool) {
        self.relay.force(emergency_stop);
        self.sink
            .record(&SafetyEvent::RelayOverride { emergency_stop });
    }

    /// Drop the override and put the relays back on the current decision.
    pub fn release_relay_override(&mut self) {
        self.relay.release(self.relays_must_open());
        self.sink.record(&SafetyEvent::RelayOverrideReleased);
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport::new(
            &self.state,
            &self.config.thresholds,
            &self.relay,
            self.clock.now_ms(),
        )
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn relay(&self) -> &RelayActuator<R> {
        &self.relay
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
