use std::{fmt, time::Duration};

use thiserror::Error;
use tokio::time::Instant;

use crate::{
    bus::BusError,
    calibration::CalibrationRecord,
    drivers::icm20948::{
        event::{RawInertial, RawMag},
        info::DeviceState,
    },
};

/// Errors carried inside a [Reading]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadingError {
    #[error("error reading device: {0}")]
    Transport(#[from] BusError),
    #[error("no new accel/gyro values")]
    NoInertialSamples,
    #[error("no new magnetometer values")]
    NoMagSamples,
}

/// A calibrated sample (or average of samples) of every IMU channel.
///
/// Instantaneous readings have sample counts of 0 or 1 depending on whether
/// the read succeeded and zero elapsed time. Averaged readings carry the
/// number of ticks they cover and the time since the previous drain.
#[derive(Clone, Debug)]
pub struct Reading {
    /// Angular rate in deg/s
    pub gyro: [f64; 3],
    /// Acceleration in g
    pub accel: [f64; 3],
    /// Magnetic field in µT
    pub mag: [f64; 3],
    /// Die temperature in °C
    pub temperature: f64,
    pub samples: u32,
    pub mag_samples: u32,
    /// Time of the latest inertial tick
    pub timestamp: Instant,
    /// Time of the latest magnetometer tick
    pub mag_timestamp: Instant,
    /// Inertial time covered since the previous drain
    pub elapsed: Duration,
    /// Magnetometer time covered since the previous drain
    pub mag_elapsed: Duration,
    pub error: Option<ReadingError>,
    pub mag_error: Option<ReadingError>,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "gyro [{:8.3} {:8.3} {:8.3}] deg/s  accel [{:7.4} {:7.4} {:7.4}] g  \
             mag [{:8.2} {:8.2} {:8.2}] uT  temp {:5.1} C  n={} nm={}",
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.mag[0],
            self.mag[1],
            self.mag[2],
            self.temperature,
            self.samples,
            self.mag_samples,
        )?;
        if let Some(e) = self.error.as_ref() {
            write!(f, "  error: {e}")?;
        }
        if let Some(e) = self.mag_error.as_ref() {
            write!(f, "  mag error: {e}")?;
        }
        Ok(())
    }
}

/// Converts raw counts into calibrated units using the calibration record
/// and the device configuration of one polling session.
#[derive(Clone, Debug)]
pub struct Converter {
    calibration: CalibrationRecord,
    gyro_scale: f64,
    accel_scale: f64,
    mag_sensitivity: [f64; 3],
}

impl Converter {
    pub fn new(calibration: CalibrationRecord, state: &DeviceState) -> Self {
        Self {
            calibration,
            gyro_scale: state.gyro_scale,
            accel_scale: state.accel_scale,
            mag_sensitivity: state.mag_sensitivity,
        }
    }

    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    /// (raw - bias) * scale
    pub fn gyro(&self, raw: [f64; 3]) -> [f64; 3] {
        let bias = self.calibration.gyro_bias;
        [0, 1, 2].map(|axis| (raw[axis] - bias[axis]) * self.gyro_scale)
    }

    /// (raw - bias) * scale
    pub fn accel(&self, raw: [f64; 3]) -> [f64; 3] {
        let bias = self.calibration.accel_bias;
        [0, 1, 2].map(|axis| (raw[axis] - bias[axis]) * self.accel_scale)
    }

    /// rescale * (raw * sensitivity - bias)
    pub fn mag(&self, raw: [f64; 3]) -> [f64; 3] {
        let bias = self.calibration.mag_bias;
        let corrected = [0, 1, 2].map(|axis| raw[axis] * self.mag_sensitivity[axis] - bias[axis]);
        self.calibration.mag_rescale.apply(corrected)
    }

    /// Die temperature in °C
    pub fn temperature(raw: f64) -> f64 {
        raw / 333.87 + 21.0
    }

    /// Build an instantaneous reading from the latest raw values. The
    /// magnetometer fields stay zero until a magnetometer frame exists.
    pub fn instantaneous(
        &self,
        inertial: &RawInertial,
        mag: &RawMag,
        error: Option<ReadingError>,
        mag_error: Option<ReadingError>,
        timestamp: Instant,
        mag_timestamp: Instant,
    ) -> Reading {
        Reading {
            gyro: self.gyro(inertial.gyro.map(f64::from)),
            accel: self.accel(inertial.accel.map(f64::from)),
            mag: match mag_error {
                Some(ReadingError::NoMagSamples) => [0.0; 3],
                _ => self.mag(mag.axes().map(f64::from)),
            },
            temperature: Self::temperature(inertial.temperature as f64),
            samples: if error.is_none() { 1 } else { 0 },
            mag_samples: if mag_error.is_none() { 1 } else { 0 },
            timestamp,
            mag_timestamp,
            elapsed: Duration::ZERO,
            mag_elapsed: Duration::ZERO,
            error,
            mag_error,
        }
    }
}
