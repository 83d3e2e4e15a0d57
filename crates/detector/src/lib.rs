//! Per-sensor detection: 8x8 distance frames, zone statistics and the
//! consensus verdict that says whether an object is inside the threshold.

use serde::{Deserialize, Serialize};
use std::fmt;

mod analysis;

pub use analysis::{analyze, consensus, is_object_present, Verdict, ZoneAnalysis};

/// Zones per row (and rows per frame).
pub const GRID_WIDTH: usize = 8;
/// Zones per frame.
pub const ZONE_COUNT: usize = GRID_WIDTH * GRID_WIDTH;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorId {
    Top,
    Left,
    Right,
}

impl SensorId {
    pub const ALL: [SensorId; 3] = [SensorId::Top, SensorId::Left, SensorId::Right];

    /// Position in `[top, left, right]` ordered arrays.
    pub fn index(self) -> usize {
        match self {
            SensorId::Top => 0,
            SensorId::Left => 1,
            SensorId::Right => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SensorId::Top => "TOP",
            SensorId::Left => "LEFT",
            SensorId::Right => "RIGHT",
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Row-major index of zone `(x, y)`.
pub fn zone_index(x: usize, y: usize) -> usize {
    y * GRID_WIDTH + x
}

/// `(x, y)` of a row-major zone index.
pub fn zone_coords(index: usize) -> (usize, usize) {
    (index % GRID_WIDTH, index / GRID_WIDTH)
}

/// One ranging cycle of a single sensor: 64 distances in millimetres.
/// Zero (or anything outside the trusted range) means "no return".
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    zones: [u16; ZONE_COUNT],
}

impl Frame {
    pub fn new(zones: [u16; ZONE_COUNT]) -> Self {
        Self { zones }
    }

    /// Every zone reports `distance_mm`.
    pub fn filled(distance_mm: u16) -> Self {
        Self::new([distance_mm; ZONE_COUNT])
    }

    /// A frame in which no zone returned anything.
    pub fn blank() -> Self {
        Self::filled(0)
    }

    pub fn zones(&self) -> &[u16; ZONE_COUNT] {
        &self.zones
    }

    pub fn at(&self, x: usize, y: usize) -> u16 {
        self.zones[zone_index(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, distance_mm: u16) {
        self.zones[zone_index(x, y)] = distance_mm;
    }
}

impl From<[u16; ZONE_COUNT]> for Frame {
    fn from(zones: [u16; ZONE_COUNT]) -> Self {
        Self::new(zones)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frame [")?;
        for row in self.zones.chunks(GRID_WIDTH) {
            write!(f, "  ")?;
            for d in row {
                write!(f, "{d:>5}")?;
            }
            writeln!(f)?;
        }
        write!(f, "]")
    }
}

/// Per-sensor detection distances in millimetres.
///
/// Any `u16` is accepted. Values that make detection impossible (0) or
/// hypersensitive (`u16::MAX`) are the operator's call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub top_mm: u16,
    pub left_mm: u16,
    pub right_mm: u16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            top_mm: 1500,
            left_mm: 1000,
            right_mm: 1000,
        }
    }
}

impl Thresholds {
    pub fn new(top_mm: u16, left_mm: u16, right_mm: u16) -> Self {
        Self {
            top_mm,
            left_mm,
            right_mm,
        }
    }

    pub fn get(&self, sensor: SensorId) -> u16 {
        match sensor {
            SensorId::Top => self.top_mm,
            SensorId::Left => self.left_mm,
            SensorId::Right => self.right_mm,
        }
    }

    pub fn set(&mut self, sensor: SensorId, mm: u16) {
        match sensor {
            SensorId::Top => self.top_mm = mm,
            SensorId::Left => self.left_mm = mm,
            SensorId::Right => self.right_mm = mm,
        }
    }
}

/// Tuning of the zone analyzer and the consensus filter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Readings below this are sensor noise.
    pub min_range_mm: u16,
    /// Readings above this are beyond the sensor's trusted range.
    pub max_range_mm: u16,
    /// Fewer valid zones than this and the frame is not trusted at all.
    pub min_valid_readings: u8,
    /// Share of valid zones (percent) that must be below the threshold.
    pub consensus_pct: f32,
    /// How far the closest reading must sit below the average to count as a
    /// distinct object.
    pub hysteresis_mm: u16,
    /// Share of valid zones (percent) above which a broad intrusion is assumed.
    pub high_confidence_pct: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_range_mm: 50,
            max_range_mm: 4000,
            min_valid_readings: 5,
            consensus_pct: 10.0,
            hysteresis_mm: 100,
            high_confidence_pct: 50.0,
        }
    }
}

impl DetectionParams {
    pub fn is_valid_reading(&self, distance_mm: u16) -> bool {
        distance_mm >= self.min_range_mm && distance_mm <= self.max_range_mm
    }
}
