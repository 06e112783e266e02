#[cfg(test)]
pub mod accumulator_test;

use std::time::Duration;

use tokio::time::Instant;

use crate::drivers::icm20948::event::{RawInertial, RawMag};

use super::reading::{Converter, Reading, ReadingError};

/// Running sums of raw counts since the averaged view was last drained
#[derive(Debug, Clone)]
pub struct Accumulator {
    gyro: [f64; 3],
    accel: [f64; 3],
    temperature: f64,
    mag: [i64; 3],
    samples: u32,
    mag_samples: u32,
    epoch: Instant,
    mag_epoch: Instant,
}

impl Accumulator {
    pub fn new(start: Instant) -> Self {
        Self {
            gyro: [0.0; 3],
            accel: [0.0; 3],
            temperature: 0.0,
            mag: [0; 3],
            samples: 0,
            mag_samples: 0,
            epoch: start,
            mag_epoch: start,
        }
    }

    /// Number of inertial ticks since the last drain
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Number of magnetometer ticks since the last drain
    pub fn mag_samples(&self) -> u32 {
        self.mag_samples
    }

    /// Raw magnetometer sums since the last drain
    pub fn mag_sum(&self) -> [i64; 3] {
        self.mag
    }

    /// Fold one inertial tick into the sums. The last known magnetometer
    /// values are folded into the magnetometer sums as well; only
    /// [Accumulator::add_mag] counts magnetometer ticks.
    pub fn add_inertial(&mut self, raw: &RawInertial, last_mag: &RawMag) {
        for axis in 0..3 {
            self.gyro[axis] += raw.gyro[axis] as f64;
            self.accel[axis] += raw.accel[axis] as f64;
        }
        self.temperature += raw.temperature as f64;
        self.fold_mag(last_mag);
        self.samples = self.samples.saturating_add(1);
    }

    /// Fold one valid magnetometer frame into the sums
    pub fn add_mag(&mut self, raw: &RawMag) {
        self.fold_mag(raw);
        self.mag_samples = self.mag_samples.saturating_add(1);
    }

    fn fold_mag(&mut self, raw: &RawMag) {
        for (sum, value) in self.mag.iter_mut().zip(raw.axes()) {
            *sum += value as i64;
        }
    }

    /// Build the averaged reading and start a new window at the latest tick
    /// times
    pub fn drain(&mut self, converter: &Converter, tick: Instant, mag_tick: Instant) -> Reading {
        let mut reading = Reading {
            gyro: [0.0; 3],
            accel: [0.0; 3],
            mag: [0.0; 3],
            temperature: 0.0,
            samples: self.samples,
            mag_samples: self.mag_samples,
            timestamp: tick,
            mag_timestamp: mag_tick,
            elapsed: Duration::ZERO,
            mag_elapsed: Duration::ZERO,
            error: None,
            mag_error: None,
        };

        if self.samples > 0 {
            let n = self.samples as f64;
            reading.gyro = converter.gyro(self.gyro.map(|sum| sum / n));
            reading.accel = converter.accel(self.accel.map(|sum| sum / n));
            reading.temperature = Converter::temperature(self.temperature / n);
            reading.elapsed = tick.saturating_duration_since(self.epoch);
        } else {
            reading.error = Some(ReadingError::NoInertialSamples);
        }

        if self.mag_samples > 0 {
            let n = self.mag_samples as f64;
            reading.mag = converter.mag(self.mag.map(|sum| sum as f64 / n));
            reading.mag_elapsed = mag_tick.saturating_duration_since(self.mag_epoch);
        } else {
            reading.mag_error = Some(ReadingError::NoMagSamples);
        }

        *self = Self {
            epoch: tick,
            mag_epoch: mag_tick,
            ..Self::new(tick)
        };

        reading
    }
}
