//! Windowed speed and distance over field-plane trajectories.
use nalgebra::Point2;
use std::collections::HashMap;
use tracing::debug;

use crate::config::KinematicsConfig;
use crate::track::{TrackId, TrackTable};
use crate::utils::measure_distance;

/// Distance and speed credited to one track for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowMeasure {
    /// Metres.
    pub distance: f32,
    /// km/h.
    pub speed: f32,
}

impl WindowMeasure {
    pub const ZERO: WindowMeasure = WindowMeasure {
        distance: 0.0,
        speed: 0.0,
    };
}

pub struct SpeedAndDistanceEstimator {
    frame_window: usize,
    frame_rate: f32,
    min_distance: f32,
    max_speed_kmh: f32,
}

impl SpeedAndDistanceEstimator {
    pub fn new(config: &KinematicsConfig) -> Self {
        SpeedAndDistanceEstimator {
            frame_window: config.frame_window.max(1),
            frame_rate: config.frame_rate,
            min_distance: config.min_distance,
            max_speed_kmh: config.max_speed_kmh,
        }
    }

    /// Measure the movement from `start` to `end` over `span_frames` frames.
    ///
    /// Movement under the minimum distance is noise, and movement faster than
    /// the maximum speed is a tracking glitch; both count as standing still.
    pub fn measure(&self, start: &Point2<f32>, end: &Point2<f32>, span_frames: usize) -> WindowMeasure {
        let distance = measure_distance(start, end);
        if distance < self.min_distance || span_frames == 0 {
            return WindowMeasure::ZERO;
        }
        let seconds = span_frames as f32 / self.frame_rate;
        let speed = distance / seconds * 3.6;
        if speed > self.max_speed_kmh {
            return WindowMeasure::ZERO;
        }
        WindowMeasure { distance, speed }
    }

    /// Write `speed` and `distance` onto every player record.
    ///
    /// Windows do not overlap. Each is measured between its first frame and
    /// the first frame of the next window (clipped to the last frame), and the
    /// result is written to every frame of the window where the track appears.
    /// Referees and the ball are left untouched.
    pub fn add_speed_and_distance(&self, table: &mut TrackTable) {
        let frames = &mut table.players;
        let n = frames.len();
        let mut totals: HashMap<TrackId, f32> = HashMap::new();
        let mut dropped = 0usize;

        for start in (0..n).step_by(self.frame_window) {
            let last = (start + self.frame_window).min(n - 1);
            if last == start {
                continue;
            }
            let end = (start + self.frame_window).min(n);

            let common: Vec<TrackId> = frames[start]
                .keys()
                .filter(|id| frames[last].contains_key(id))
                .copied()
                .collect();

            for id in common {
                let (Some(a), Some(b)) = (
                    frames[start][&id].field_position,
                    frames[last][&id].field_position,
                ) else {
                    continue;
                };

                let measure = self.measure(&a, &b, last - start);
                if measure == WindowMeasure::ZERO {
                    dropped += 1;
                }
                let total = totals.entry(id).or_insert(0.0);
                *total += measure.distance;
                let total = *total;

                for frame in &mut frames[start..end] {
                    if let Some(record) = frame.get_mut(&id) {
                        record.speed = Some(measure.speed);
                        record.distance = Some(total);
                    }
                }
            }
        }

        debug!(
            "speed and distance for {} players, {} windows zeroed by noise filters",
            totals.len(),
            dropped
        );
    }
}
