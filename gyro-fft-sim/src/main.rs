//! # gyro-fft-sim - Gyro Noise Analyser Harness
//!
//! Runs the spectral engine against a simulated flight: the vehicle sits on
//! the ground with motors stopped, spools up and hovers. Learned hover
//! values are written out when the run ends, as they would be on disarm.
//!
//! ## Architecture
//! - **Sensor Thread**: synthesises gyro samples at sensor rate
//! - **Engine Thread**: feeds the engine, advances it once per sample and
//!   learns while hovering
//! - **Communication**: a bounded crossbeam channel of sample batches

mod signal;

use std::fs;
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, Sender};
use gyro_fft_core::config::FftConfig;
use gyro_fft_core::hover::JsonHoverStore;
use gyro_fft_core::{Axis, GyroFft};
use log::{error, info, warn};

use signal::{FlightProfile, GyroSimulator, SensorFrame};

// Simulation constants
const BATCH_SIZE: usize = 64; // Samples per channel message
const CHANNEL_DEPTH: usize = 16; // Batches in flight before the sensor blocks
const HOVER_UPDATE_HZ: f32 = 10.0; // Rate of hover learning updates
const STATUS_INTERVAL_S: f32 = 1.0;

#[derive(Parser)]
#[command(name = "gyro-fft-sim")]
#[command(about = "Run the gyro noise analyser against a simulated hover")]
struct Args {
    /// JSON engine configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Where learned hover values are loaded from and saved to
    #[arg(long, default_value = "hover.json")]
    hover_store: PathBuf,
    /// Length of the simulated flight in seconds
    #[arg(long, default_value_t = 30.0)]
    seconds: f32,
    /// Motor vibration frequency at hover throttle
    #[arg(long, default_value_t = 160.0)]
    motor_hz: f32,
    #[arg(long, default_value_t = 0.4)]
    hover_throttle: f32,
    /// Motor vibration amplitude at full throttle
    #[arg(long, default_value_t = 2.0)]
    amplitude: f32,
    /// Peak amplitude of the uniform sensor noise
    #[arg(long, default_value_t = 0.05)]
    noise: f32,
    #[arg(long, default_value_t = 1u64)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init(); // Reads RUST_LOG, e.g. RUST_LOG=info
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            FftConfig::from_json(&json).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => FftConfig::default(),
    };
    let sensor_rate_hz = config.sensor_rate_hz;

    let mut fft = GyroFft::new(config)?;
    let mut store = JsonHoverStore::new(&args.hover_store);
    fft.restore_hover(&store)?;
    info!("Starting from learned hover {:?}", fft.learned_hover());

    let report = fft.calibration_check();
    if !report.passed() {
        warn!("Continuing with a degraded analyser: {:?}", report);
    }

    let profile = FlightProfile {
        ground_s: 3.0,
        spool_s: 1.0,
        hover_throttle: args.hover_throttle,
    };
    let total_samples = (args.seconds * sensor_rate_hz) as usize;
    let simulator = GyroSimulator::new(
        sensor_rate_hz,
        args.motor_hz,
        args.hover_throttle,
        args.amplitude,
        args.noise,
        args.seed,
    );

    let sensor_profile = profile.clone();
    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Vec<SensorFrame>>(CHANNEL_DEPTH);
    let sensor = thread::spawn(move || {
        run_sensor(simulator, sensor_profile, sensor_rate_hz, total_samples, frame_tx)
    });

    run_engine(&mut fft, &profile, sensor_rate_hz, frame_rx);

    match sensor.join() {
        Ok(true) => {}
        Ok(false) => warn!("Engine stopped before every sensor sample was delivered"),
        Err(_) => error!("Sensor thread panicked"),
    }

    // landing: the vehicle disarms
    if fft.commit_on_disarm(&mut store)? {
        info!("Saved learned hover values to {}", args.hover_store.display());
    }
    let learned = fft.learned_hover();
    let overruns = fft.overrun_stats();
    println!(
        "learned hover: {:.1}Hz at throttle {:.3}",
        learned.freq_hover_hz, learned.throttle_ref
    );
    println!(
        "budget overruns: {} (avg {}us, max {}us)",
        overruns.cycles,
        overruns.average_micros(),
        overruns.max_micros
    );
    Ok(())
}

fn run_sensor(
    mut simulator: GyroSimulator,
    profile: FlightProfile,
    rate_hz: f32,
    total_samples: usize,
    frame_tx: Sender<Vec<SensorFrame>>,
) -> bool {
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    for n in 0..total_samples {
        let throttle = profile.throttle_at(n as f32 / rate_hz);
        batch.push(SensorFrame {
            gyro: simulator.sample(throttle),
            throttle,
        });
        if batch.len() == BATCH_SIZE {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
            if frame_tx.send(full).is_err() {
                return false;
            }
        }
    }
    batch.is_empty() || frame_tx.send(batch).is_ok()
}

fn run_engine(fft: &mut GyroFft, profile: &FlightProfile, rate_hz: f32, frame_rx: Receiver<Vec<SensorFrame>>) {
    let hover_interval = ((rate_hz / HOVER_UPDATE_HZ) as u64).max(1);
    let status_interval = ((rate_hz * STATUS_INTERVAL_S) as u64).max(1);
    let hover_dt = hover_interval as f32 / rate_hz;
    let mut tick: u64 = 0;

    for batch in frame_rx.iter() {
        for frame in batch {
            fft.feed_sample(frame.gyro);
            fft.advance();
            tick += 1;

            let t = tick as f32 / rate_hz;
            if tick % hover_interval == 0 && profile.is_hovering(t) {
                fft.update_hover(hover_dt, frame.throttle);
            }
            if tick % status_interval == 0 {
                print_status(fft, t);
            }
        }
    }
}

fn print_status(fft: &GyroFft, t: f32) {
    let freqs = fft.noise_center_freq_hz();
    let energy = fft.center_freq_energy();
    let reference = fft.noise_ref_energy();
    let mut line = format!("t={t:5.1}s");
    for axis in Axis::ALL {
        let i = axis.index();
        let state = if fft.needs_calibration(axis) { "cal" } else { "   " };
        line.push_str(&format!(
            "  {axis}: {:6.1}Hz e={:8.3} ref={:7.3} {state}",
            freqs[i], energy[i], reference[i]
        ));
    }
    println!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> FlightProfile {
        FlightProfile {
            ground_s: 0.0,
            spool_s: 0.1,
            hover_throttle: 0.4,
        }
    }

    #[test]
    fn sensor_delivers_the_final_partial_batch() {
        let simulator = GyroSimulator::new(1000.0, 160.0, 0.4, 1.0, 0.0, 1);
        let (tx, rx) = crossbeam_channel::unbounded();
        assert!(run_sensor(simulator, profile(), 1000.0, BATCH_SIZE + 5, tx));
        let sizes: Vec<usize> = rx.iter().map(|batch| batch.len()).collect();
        assert_eq!(sizes, vec![BATCH_SIZE, 5]);
    }

    #[test]
    fn sensor_reports_a_vanished_engine() {
        let simulator = GyroSimulator::new(1000.0, 160.0, 0.4, 1.0, 0.0, 1);
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        assert!(!run_sensor(simulator, profile(), 1000.0, 5, tx));
    }
}
