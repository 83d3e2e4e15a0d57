use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use detector::SensorId;
use relay::{MemoryOutputs, OverrideTimer, RelayPosition};
use safety::{Monitor, MonitorConfig, SensorCycle, Transition};
use sim::{Obstacle, Rig, Scene, SensorFault};
use tracing::{info, warn};

#[derive(Clone, Debug, ValueEnum)]
enum Scenario {
    Clear,
    PersonLeft,
    OverheadBeam,
    SensorDropout,
    BlindSensor,
    MaintenanceOverride,
}

#[derive(Parser, Debug)]
#[command(
    name = "presence-guard",
    version,
    about = "Three-sensor object presence monitor driving fail-safe motor relays (simulated)"
)]
struct Args {
    #[arg(value_enum, long, default_value = "person-left")]
    scenario: Scenario,

    /// Total simulation time in seconds
    #[arg(long, default_value_t = 60.0)]
    seconds: f64,

    /// Ranging period in milliseconds (15 Hz by default)
    #[arg(long, default_value_t = 66, value_parser = clap::value_parser!(u64).range(1..))]
    dt_ms: u64,

    /// TOML config file; defaults apply when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Top sensor threshold (mm), overrides the config file
    #[arg(long)]
    top: Option<u16>,

    /// Left sensor threshold (mm), overrides the config file
    #[arg(long)]
    left: Option<u16>,

    /// Right sensor threshold (mm), overrides the config file
    #[arg(long)]
    right: Option<u16>,

    /// How long a manual relay override may hold (ms)
    #[arg(long, default_value_t = OverrideTimer::DEFAULT_TIMEOUT_MS)]
    override_timeout_ms: u64,

    /// RNG seed for deterministic runs
    #[arg(long, default_value_t = 12345)]
    seed: u64,
}

#[derive(serde::Serialize)]
struct TraceRow {
    t_s: f64,
    top: Option<SensorCycle>,
    left: Option<SensorCycle>,
    right: Option<SensorCycle>,
    top_triggered: bool,
    left_triggered: bool,
    right_triggered: bool,
    emergency_stop: bool,
    transition: Option<Transition>,
    relay: RelayPosition,
    relay_overridden: bool,
}

const STATUS_INTERVAL_MS: u64 = 1000;

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = load_config(&args)?;
    let dt_s = (args.dt_ms as f64) / 1000.0;
    let steps = (args.seconds / dt_s).ceil() as u64;

    // Simulated time drives the monitor's clock.
    let now_ms = Rc::new(Cell::new(0u64));
    let clock = {
        let now_ms = now_ms.clone();
        move || now_ms.get()
    };
    let mut monitor = Monitor::new(config, MemoryOutputs::default(), clock);

    let mut rig = Rig::new(build_scene(&args), args.seed);
    apply_faults(&args.scenario, &mut rig);

    let mut override_timer = OverrideTimer::new(args.override_timeout_ms);
    let override_at_ms = (args.seconds * 0.2 * 1000.0) as u64;
    let mut override_requested = false;
    let mut last_status_ms: Option<u64> = None;

    // Output JSONL trace to stdout (one object per line); logs go to stderr.
    for k in 0..steps {
        let t_ms = k * args.dt_ms;
        now_ms.set(t_ms);

        if matches!(args.scenario, Scenario::MaintenanceOverride)
            && !override_requested
            && t_ms >= override_at_ms
        {
            override_requested = true;
            warn!("operator forcing relays closed for maintenance");
            monitor.force_relay_state(false);
            override_timer.start(t_ms);
        }
        if override_timer.poll_expired(t_ms) {
            warn!(
                timeout_ms = args.override_timeout_ms,
                "override timeout, returning to monitored operation"
            );
            monitor.release_relay_override();
        }

        let report = monitor.poll(&mut rig);
        let state = monitor.safety_state();

        if state.emergency_stop
            && last_status_ms.map_or(true, |t| t_ms.saturating_sub(t) >= STATUS_INTERVAL_MS)
        {
            info!("\n{}", monitor.status_report());
            last_status_ms = Some(t_ms);
        }

        let row = TraceRow {
            t_s: rig.t_s,
            top: report.sensor(SensorId::Top).copied(),
            left: report.sensor(SensorId::Left).copied(),
            right: report.sensor(SensorId::Right).copied(),
            top_triggered: state.top.triggered,
            left_triggered: state.left.triggered,
            right_triggered: state.right.triggered,
            emergency_stop: report.emergency_stop,
            transition: report.transition,
            relay: monitor.relay().position(),
            relay_overridden: monitor.relay().is_overridden(),
        };
        println!("{}", serde_json::to_string(&row)?);

        rig.advance(dt_s);
    }

    info!("\n{}", monitor.status_report());
    Ok(())
}

/// RUST_LOG selects the filter (default "info");
/// PRESENCE_GUARD_LOG_FORMAT=json switches to JSON lines.
fn init_logging() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("PRESENCE_GUARD_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .init();
    }
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let mut cfg = MonitorConfig::default();
            cfg.apply_env_overrides();
            cfg
        }
    };

    for (sensor, flag) in [
        (SensorId::Top, args.top),
        (SensorId::Left, args.left),
        (SensorId::Right, args.right),
    ] {
        if let Some(mm) = flag {
            config.thresholds.set(sensor, mm);
        }
    }

    let t = config.thresholds;
    info!(
        top_mm = t.top_mm,
        left_mm = t.left_mm,
        right_mm = t.right_mm,
        consecutive = config.debounce.consecutive_detections,
        "safety monitor configured, relays open until every sensor has reported"
    );
    Ok(config)
}

/// A person walking up to `sensor` and away again during the middle of the run.
fn person(sensor: SensorId, seconds: f64) -> Obstacle {
    Obstacle {
        sensor,
        zones: (2, 1, 5, 7),
        appear_s: seconds * 0.3,
        leave_s: seconds * 0.7,
        from_mm: 1600.0,
        to_mm: 450.0,
    }
}

fn build_scene(args: &Args) -> Scene {
    let s = args.seconds;
    let mut scene = Scene::default();
    match args.scenario {
        Scenario::Clear => {}
        Scenario::PersonLeft | Scenario::BlindSensor | Scenario::MaintenanceOverride => {
            scene.obstacles.push(person(SensorId::Left, s));
        }
        Scenario::OverheadBeam => {
            // A low beam across the whole field of view, passed under slowly.
            scene.obstacles.push(Obstacle {
                sensor: SensorId::Top,
                zones: (0, 0, 7, 5),
                appear_s: s * 0.4,
                leave_s: s * 0.6,
                from_mm: 1300.0,
                to_mm: 1100.0,
            });
        }
        Scenario::SensorDropout => {
            scene.obstacles.push(person(SensorId::Right, s));
        }
    }
    scene
}

fn apply_faults(s: &Scenario, rig: &mut Rig) {
    match s {
        Scenario::SensorDropout => {
            rig.sensor_mut(SensorId::Right).fault = SensorFault::DropoutEvery { n: 4 };
        }
        Scenario::BlindSensor => {
            rig.sensor_mut(SensorId::Top).fault = SensorFault::Blind;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ranging_period_is_rejected() {
        assert!(Args::try_parse_from(["presence-guard", "--dt-ms", "0"]).is_err());
        let args = Args::try_parse_from(["presence-guard", "--dt-ms", "1"]).unwrap();
        assert_eq!(args.dt_ms, 1);
        assert_eq!(Args::try_parse_from(["presence-guard"]).unwrap().dt_ms, 66);
    }
}
