//! Synthetic multizone time-of-flight frames for bench runs without hardware.

use detector::{Frame, SensorId, GRID_WIDTH, ZONE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use safety::FrameSource;

/// Something standing in front of one sensor for a while.
#[derive(Clone, Copy, Debug)]
pub struct Obstacle {
    pub sensor: SensorId,
    /// Zone rectangle covered, inclusive: `(x0, y0, x1, y1)`.
    pub zones: (usize, usize, usize, usize),
    pub appear_s: f64,
    pub leave_s: f64,
    /// Distance when it appears and when it leaves; linear in between.
    pub from_mm: f64,
    pub to_mm: f64,
}

impl Obstacle {
    fn distance_at(&self, t_s: f64) -> Option<f64> {
        if t_s < self.appear_s || t_s >= self.leave_s {
            return None;
        }
        let span = (self.leave_s - self.appear_s).max(f64::EPSILON);
        let k = (t_s - self.appear_s) / span;
        Some(self.from_mm + (self.to_mm - self.from_mm) * k)
    }

    fn covers(&self, x: usize, y: usize) -> bool {
        let (x0, y0, x1, y1) = self.zones;
        (x0..=x1).contains(&x) && (y0..=y1).contains(&y)
    }
}

/// The world seen by the three sensors: a static background per sensor plus
/// moving obstacles.
#[derive(Clone, Debug)]
pub struct Scene {
    /// Background distance per sensor, `[top, left, right]`.
    pub background_mm: [f64; 3],
    pub obstacles: Vec<Obstacle>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            // Ceiling above, aisle racking either side.
            background_mm: [2600.0, 1800.0, 1800.0],
            obstacles: Vec::new(),
        }
    }
}

impl Scene {
    /// True distance of zone `(x, y)` for `sensor` at `t_s`.
    pub fn distance(&self, sensor: SensorId, x: usize, y: usize, t_s: f64) -> f64 {
        self.obstacles
            .iter()
            .filter(|o| o.sensor == sensor && o.covers(x, y))
            .filter_map(|o| o.distance_at(t_s))
            .fold(self.background_mm[sensor.index()], f64::min)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum SensorFault {
    None,
    /// Every `n`th read returns no frame at all.
    DropoutEvery { n: u64 },
    /// Frames arrive but no zone returns (lens covered, sensor blinded).
    Blind,
    /// Every zone reads `value` regardless of the scene.
    Stuck { value: u16 },
}

#[derive(Clone, Debug)]
pub struct Sensor {
    pub noise_std: f64,
    pub fault: SensorFault,
    /// Chance that an individual zone gives no return.
    pub zone_dropout: f64,
    rng: StdRng,
    step_count: u64,
}

impl Sensor {
    pub fn new(seed: u64) -> Self {
        Self {
            noise_std: 15.0,
            fault: SensorFault::None,
            zone_dropout: 0.02,
            rng: StdRng::seed_from_u64(seed),
            step_count: 0,
        }
    }

    pub fn read_frame(&mut self, scene: &Scene, id: SensorId, t_s: f64) -> Option<Frame> {
        self.step_count += 1;

        match self.fault {
            SensorFault::DropoutEvery { n } if n > 0 && self.step_count % n == 0 => {
                return None;
            }
            SensorFault::Blind => return Some(Frame::blank()),
            SensorFault::Stuck { value } => return Some(Frame::filled(value)),
            _ => {}
        }

        // A zero standard deviation is valid; only negative or NaN is not.
        let noise = Normal::new(0.0, self.noise_std.max(0.0)).ok();
        let mut zones = [0u16; ZONE_COUNT];
        for (i, z) in zones.iter_mut().enumerate() {
            if self.zone_dropout > 0.0 && self.rng.gen_bool(self.zone_dropout.min(1.0)) {
                continue;
            }
            let (x, y) = (i % GRID_WIDTH, i / GRID_WIDTH);
            let mut d = scene.distance(id, x, y, t_s);
            if let Some(n) = &noise {
                d += n.sample(&mut self.rng);
            }
            *z = d.round().clamp(0.0, f64::from(u16::MAX)) as u16;
        }
        Some(Frame::new(zones))
    }
}

/// Three simulated sensors looking at one scene, advanced in fixed steps.
#[derive(Clone, Debug)]
pub struct Rig {
    pub scene: Scene,
    pub sensors: [Sensor; 3],
    pub t_s: f64,
}

impl Rig {
    pub fn new(scene: Scene, seed: u64) -> Self {
        Self {
            scene,
            sensors: [
                Sensor::new(seed ^ 0xA1),
                Sensor::new(seed ^ 0xB2),
                Sensor::new(seed ^ 0xC3),
            ],
            t_s: 0.0,
        }
    }

    pub fn sensor_mut(&mut self, id: SensorId) -> &mut Sensor {
        &mut self.sensors[id.index()]
    }

    pub fn advance(&mut self, dt_s: f64) {
        self.t_s += dt_s;
    }
}

impl FrameSource for Rig {
    fn get_frame(&mut self, sensor: SensorId) -> Option<Frame> {
        let t_s = self.t_s;
        self.sensors[sensor.index()].read_frame(&self.scene, sensor, t_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(seed: u64) -> Sensor {
        let mut s = Sensor::new(seed);
        s.noise_std = 0.0;
        s.zone_dropout = 0.0;
        s
    }

    #[test]
    fn empty_scene_reads_background() {
        let scene = Scene::default();
        let f = quiet(1).read_frame(&scene, SensorId::Top, 0.0).unwrap();
        assert!(f.zones().iter().all(|&d| d == 2600));
    }

    #[test]
    fn obstacle_covers_its_zones_while_present() {
        let scene = Scene {
            obstacles: vec![Obstacle {
                sensor: SensorId::Left,
                zones: (2, 2, 4, 5),
                appear_s: 1.0,
                leave_s: 3.0,
                from_mm: 1200.0,
                to_mm: 400.0,
            }],
            ..Default::default()
        };
        let mut s = quiet(2);

        let before = s.read_frame(&scene, SensorId::Left, 0.5).unwrap();
        assert_eq!(before.at(3, 3), 1800);

        let mid = s.read_frame(&scene, SensorId::Left, 2.0).unwrap();
        assert_eq!(mid.at(3, 3), 800);
        assert_eq!(mid.at(0, 0), 1800);

        let other = s.read_frame(&scene, SensorId::Right, 2.0).unwrap();
        assert_eq!(other.at(3, 3), 1800);

        let after = s.read_frame(&scene, SensorId::Left, 3.0).unwrap();
        assert_eq!(after.at(3, 3), 1800);
    }

    #[test]
    fn dropout_fault_skips_every_nth_frame() {
        let scene = Scene::default();
        let mut s = quiet(3);
        s.fault = SensorFault::DropoutEvery { n: 3 };
        let got: Vec<bool> = (0..6)
            .map(|_| s.read_frame(&scene, SensorId::Top, 0.0).is_some())
            .collect();
        assert_eq!(got, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn blind_and_stuck_faults() {
        let scene = Scene::default();
        let mut s = quiet(4);
        s.fault = SensorFault::Blind;
        assert_eq!(s.read_frame(&scene, SensorId::Top, 0.0), Some(Frame::blank()));
        s.fault = SensorFault::Stuck { value: 321 };
        assert_eq!(
            s.read_frame(&scene, SensorId::Top, 0.0),
            Some(Frame::filled(321))
        );
    }

    #[test]
    fn same_seed_same_frames() {
        let scene = Scene::default();
        let mut a = Rig::new(scene.clone(), 7);
        let mut b = Rig::new(scene, 7);
        for _ in 0..5 {
            assert_eq!(a.get_frame(SensorId::Right), b.get_frame(SensorId::Right));
            a.advance(0.066);
            b.advance(0.066);
        }
    }
}
