//! # Hover Learning Module
//!
//! While the vehicle hovers, the expected noise frequency and the throttle
//! it takes to hover are learned from the detected peak. Learned values are
//! only written out when the vehicle disarms, so an aborted or disturbed
//! flight never replaces values learned on a good one.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::HoverConfig;

const THROTTLE_REF_MIN: f32 = 0.01;
const THROTTLE_REF_MAX: f32 = 0.9;

/// The learned hover values. This is what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearnedHover {
    /// Peak noise frequency while hovering, in Hz.
    pub freq_hover_hz: f32,
    /// Throttle output needed to hover.
    pub throttle_ref: f32,
}

/// Durable storage for [`LearnedHover`].
pub trait HoverStore {
    /// Previously saved values, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<LearnedHover>>;
    fn save(&mut self, learned: &LearnedHover) -> Result<()>;
}

/// Stores learned values as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonHoverStore {
    path: PathBuf,
}

impl JsonHoverStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HoverStore for JsonHoverStore {
    fn load(&self) -> Result<Option<LearnedHover>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let learned = serde_json::from_str(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(learned))
    }

    fn save(&mut self, learned: &LearnedHover) -> Result<()> {
        let json_string = serde_json::to_string_pretty(learned)?;
        let mut file = File::create(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

/// In-memory store, counting how often it was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryHoverStore {
    pub saved: Option<LearnedHover>,
    pub writes: usize,
}

impl HoverStore for MemoryHoverStore {
    fn load(&self) -> Result<Option<LearnedHover>> {
        Ok(self.saved)
    }

    fn save(&mut self, learned: &LearnedHover) -> Result<()> {
        self.saved = Some(*learned);
        self.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HoverLearner {
    learned: LearnedHover,
    time_constant_s: f32,
    min_hz: f32,
    max_hz: f32,
    // learned values differ from what was last committed
    dirty: bool,
}

impl HoverLearner {
    pub fn new(config: &HoverConfig, min_hz: f32, max_hz: f32) -> Self {
        Self {
            learned: LearnedHover {
                freq_hover_hz: config.freq_hover_hz.clamp(min_hz, max_hz),
                throttle_ref: config.throttle_ref.clamp(THROTTLE_REF_MIN, THROTTLE_REF_MAX),
            },
            time_constant_s: config.time_constant_s.max(f32::EPSILON),
            min_hz,
            max_hz,
            dirty: false,
        }
    }

    /// Starts from previously persisted values instead of the configured ones.
    pub fn restore(&mut self, learned: LearnedHover) {
        self.learned = LearnedHover {
            freq_hover_hz: learned.freq_hover_hz.clamp(self.min_hz, self.max_hz),
            throttle_ref: learned.throttle_ref.clamp(THROTTLE_REF_MIN, THROTTLE_REF_MAX),
        };
        self.dirty = false;
    }

    pub fn learned(&self) -> LearnedHover {
        self.learned
    }

    /// Moves the learned values towards the current observation through a
    /// first order filter with the configured time constant.
    pub fn update(&mut self, dt: f32, observed_freq_hz: f32, throttle_out: f32) {
        if !(dt.is_finite() && dt > 0.0) || !observed_freq_hz.is_finite() || !throttle_out.is_finite() {
            return;
        }
        let alpha = dt / (self.time_constant_s + dt);
        let learned = &mut self.learned;
        learned.freq_hover_hz = (learned.freq_hover_hz
            + alpha * (observed_freq_hz - learned.freq_hover_hz))
            .clamp(self.min_hz, self.max_hz);
        learned.throttle_ref = (learned.throttle_ref + alpha * (throttle_out - learned.throttle_ref))
            .clamp(THROTTLE_REF_MIN, THROTTLE_REF_MAX);
        self.dirty = true;
    }

    /// Writes the learned values if anything was learned since the last
    /// commit. Returns whether the store was written.
    pub fn commit(&mut self, store: &mut dyn HoverStore) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        store.save(&self.learned)?;
        self.dirty = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learner() -> HoverLearner {
        HoverLearner::new(&HoverConfig::default(), 50.0, 400.0)
    }

    #[test]
    fn converges_without_snapping() {
        let mut learner = learner();
        let mut previous = learner.learned();
        for _ in 0..500 {
            learner.update(0.1, 180.0, 0.5);
            let now = learner.learned();
            assert!(now.freq_hover_hz > previous.freq_hover_hz);
            assert!(now.freq_hover_hz < 180.0);
            assert!(now.throttle_ref > previous.throttle_ref);
            assert!(now.throttle_ref < 0.5);
            previous = now;
        }
        assert!((previous.freq_hover_hz - 180.0).abs() < 1.0);
        assert!((previous.throttle_ref - 0.5).abs() < 0.01);
    }

    #[test]
    fn single_update_is_bounded_by_time_constant() {
        let mut learner = learner();
        learner.update(1.0, 300.0, 0.35);
        // alpha = 1 / (10 + 1)
        let expected = 80.0 + (300.0 - 80.0) / 11.0;
        assert!((learner.learned().freq_hover_hz - expected).abs() < 1e-3);
    }

    #[test]
    fn learned_values_stay_in_range() {
        let mut learner = learner();
        for _ in 0..1000 {
            learner.update(1.0, 1000.0, 2.0);
        }
        assert_eq!(learner.learned().freq_hover_hz, 400.0);
        assert_eq!(learner.learned().throttle_ref, THROTTLE_REF_MAX);
    }

    #[test]
    fn ignores_bad_time_steps() {
        let mut learner = learner();
        let before = learner.learned();
        learner.update(0.0, 200.0, 0.5);
        learner.update(-1.0, 200.0, 0.5);
        learner.update(f32::NAN, 200.0, 0.5);
        assert_eq!(learner.learned(), before);
    }

    #[test]
    fn commit_without_learning_keeps_store_untouched() {
        let mut learner = learner();
        let previous = LearnedHover { freq_hover_hz: 120.0, throttle_ref: 0.3 };
        let mut store = MemoryHoverStore { saved: Some(previous), writes: 0 };
        assert!(!learner.commit(&mut store).unwrap());
        assert_eq!(store.saved, Some(previous));
        assert_eq!(store.writes, 0);

        learner.update(0.5, 150.0, 0.4);
        assert!(learner.commit(&mut store).unwrap());
        assert_eq!(store.saved, Some(learner.learned()));
        assert!(!learner.commit(&mut store).unwrap());
        assert_eq!(store.writes, 1);
    }

    #[test]
    fn json_store_round_trips_through_a_file() {
        let path = std::env::temp_dir().join(format!("gyro-fft-hover-{}.json", std::process::id()));
        let mut store = JsonHoverStore::new(&path);
        assert_eq!(store.load().unwrap(), None);

        let learned = LearnedHover { freq_hover_hz: 142.5, throttle_ref: 0.41 };
        store.save(&learned).unwrap();
        assert_eq!(store.load().unwrap(), Some(learned));
        std::fs::remove_file(&path).unwrap();
    }
}
