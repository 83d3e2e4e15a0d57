//! Fail-safe motor relays.
//!
//! Both outputs are wired so that the de-energised (open) position cuts motor
//! power. The actuator opens them the moment it is constructed and only
//! closes them when explicitly told that the emergency stop is clear.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

mod override_timer;

pub use override_timer::OverrideTimer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayPosition {
    /// De-energised, motor power cut.
    Open,
    /// Energised, motor power allowed.
    Closed,
}

impl RelayPosition {
    pub fn for_emergency_stop(emergency_stop: bool) -> Self {
        if emergency_stop {
            RelayPosition::Open
        } else {
            RelayPosition::Closed
        }
    }

    pub fn is_open(self) -> bool {
        self == RelayPosition::Open
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay driver fault on {output}: {details}")]
    DriverFault { output: String, details: String },

    #[error("relay outputs are not connected")]
    Disconnected,
}

/// Hardware side of the two safety relays.
pub trait RelayOutputs {
    /// Drive both relays. `true` means open (de-energised).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the driver cannot apply the command.
    fn set_outputs(&mut self, open_top: bool, open_side: bool) -> Result<(), RelayError>;
}

/// In-memory outputs: remembers the last command.
///
/// Starts open, like de-energised hardware at power-up.
#[derive(Clone, Debug)]
pub struct MemoryOutputs {
    pub open_top: bool,
    pub open_side: bool,
    pub writes: u64,
}

impl Default for MemoryOutputs {
    fn default() -> Self {
        Self {
            open_top: true,
            open_side: true,
            writes: 0,
        }
    }
}

impl RelayOutputs for MemoryOutputs {
    fn set_outputs(&mut self, open_top: bool, open_side: bool) -> Result<(), RelayError> {
        self.open_top = open_top;
        self.open_side = open_side;
        self.writes += 1;
        Ok(())
    }
}

/// Maps the emergency-stop decision onto the relay outputs.
#[derive(Debug)]
pub struct RelayActuator<R: RelayOutputs> {
    outputs: R,
    position: RelayPosition,
    overridden: bool,
    fault: Option<RelayError>,
}

impl<R: RelayOutputs> RelayActuator<R> {
    /// Take ownership of the outputs and open them immediately.
    pub fn new(outputs: R) -> Self {
        let mut actuator = Self {
            outputs,
            position: RelayPosition::Open,
            overridden: false,
            fault: None,
        };
        actuator.drive(RelayPosition::Open);
        actuator
    }

    /// Follow the monitor's decision. Ignored while a manual override holds.
    pub fn apply(&mut self, emergency_stop: bool) {
        if self.overridden {
            debug!(emergency_stop, position = ?self.position, "relay override active, decision not applied");
            return;
        }
        self.drive(RelayPosition::for_emergency_stop(emergency_stop));
    }

    /// Force a position regardless of detections until [`release`](Self::release).
    ///
    /// The caller owns the timeout (see [`OverrideTimer`]).
    pub fn force(&mut self, emergency_stop: bool) {
        let target = RelayPosition::for_emergency_stop(emergency_stop);
        warn!(position = ?target, "manual relay override engaged");
        self.overridden = true;
        self.drive(target);
    }

    /// End a manual override and go back to following `emergency_stop`.
    pub fn release(&mut self, emergency_stop: bool) {
        if self.overridden {
            warn!("manual relay override released");
        }
        self.overridden = false;
        self.drive(RelayPosition::for_emergency_stop(emergency_stop));
    }

    /// Last commanded position.
    pub fn position(&self) -> RelayPosition {
        self.position
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    /// Error from the most recent write, if it failed.
    pub fn fault(&self) -> Option<&RelayError> {
        self.fault.as_ref()
    }

    pub fn outputs(&self) -> &R {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut R {
        &mut self.outputs
    }

    fn drive(&mut self, target: RelayPosition) {
        let open = target.is_open();
        self.position = target;
        match self.outputs.set_outputs(open, open) {
            Ok(()) => {
                if self.fault.take().is_some() {
                    warn!(position = ?target, "relay outputs recovered");
                }
            }
            Err(e) => {
                error!(error = %e, position = ?target, "relay write failed");
                self.fault = Some(e);
            }
        }
    }
}
