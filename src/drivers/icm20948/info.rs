use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::registers::{
    AK8963_MAX_SAMPLE_RATE, BITS_DLPF_ACCEL_CFG_111HZ, BITS_DLPF_ACCEL_CFG_12HZ,
    BITS_DLPF_ACCEL_CFG_246HZ, BITS_DLPF_ACCEL_CFG_24HZ, BITS_DLPF_ACCEL_CFG_50HZ,
    BITS_DLPF_ACCEL_CFG_5HZ, BITS_DLPF_GYRO_CFG_120HZ, BITS_DLPF_GYRO_CFG_12HZ,
    BITS_DLPF_GYRO_CFG_152HZ, BITS_DLPF_GYRO_CFG_197HZ, BITS_DLPF_GYRO_CFG_24HZ,
    BITS_DLPF_GYRO_CFG_51HZ, BITS_DLPF_GYRO_CFG_6HZ, BITS_FS_1000DPS, BITS_FS_16G,
    BITS_FS_2000DPS, BITS_FS_250DPS, BITS_FS_2G, BITS_FS_4G, BITS_FS_500DPS, BITS_FS_8G,
};

/// Internal sample clock of the gyro and accelerometer, in Hz
pub const BASE_SAMPLE_RATE: f64 = 1125.0;

/// Magnetometer scale in µT per count before fuse ROM adjustment
pub const MAG_SCALE: f64 = 9830.0 / 65536.0;

/// Lowest and highest supported sample rates, in Hz
pub const MIN_SAMPLE_RATE: u32 = 5;
pub const MAX_SAMPLE_RATE: u32 = 1125;

/// Errors for invalid configuration values. These are always detected before
/// the device is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{0} is not a valid gyro sensitivity (250, 500, 1000 or 2000 deg/s)")]
    InvalidGyroSensitivity(u32),
    #[error("{0} is not a valid accel sensitivity (2, 4, 8 or 16 g)")]
    InvalidAccelSensitivity(u32),
    #[error("{0} Hz is not a valid sample rate ({MIN_SAMPLE_RATE} to {MAX_SAMPLE_RATE} Hz)")]
    InvalidSampleRate(u32),
}

/// Gyro full scale range in degrees per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum GyroSensitivity {
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

impl GyroSensitivity {
    pub const ALL: [GyroSensitivity; 4] = [
        GyroSensitivity::Dps250,
        GyroSensitivity::Dps500,
        GyroSensitivity::Dps1000,
        GyroSensitivity::Dps2000,
    ];

    /// Full scale range in deg/s
    pub fn range(&self) -> u32 {
        match self {
            GyroSensitivity::Dps250 => 250,
            GyroSensitivity::Dps500 => 500,
            GyroSensitivity::Dps1000 => 1000,
            GyroSensitivity::Dps2000 => 2000,
        }
    }

    /// Scale factor in deg/s per raw count
    pub fn scale(&self) -> f64 {
        self.range() as f64 / i16::MAX as f64
    }

    /// Full scale select bits for GYRO_CONFIG_1
    pub fn bits(&self) -> u8 {
        match self {
            GyroSensitivity::Dps250 => BITS_FS_250DPS,
            GyroSensitivity::Dps500 => BITS_FS_500DPS,
            GyroSensitivity::Dps1000 => BITS_FS_1000DPS,
            GyroSensitivity::Dps2000 => BITS_FS_2000DPS,
        }
    }

    /// Normalize a factory offset register value into raw counts at this range.
    /// The offsets are stored at the 1000 deg/s reference range.
    pub fn normalize_offset(&self, value: i16) -> f64 {
        let value = match self {
            GyroSensitivity::Dps2000 => value >> 1,
            GyroSensitivity::Dps1000 => value,
            GyroSensitivity::Dps500 => value.wrapping_shl(1),
            GyroSensitivity::Dps250 => value.wrapping_shl(2),
        };
        value as f64
    }
}

impl TryFrom<u32> for GyroSensitivity {
    type Error = ConfigurationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            250 => Ok(GyroSensitivity::Dps250),
            500 => Ok(GyroSensitivity::Dps500),
            1000 => Ok(GyroSensitivity::Dps1000),
            2000 => Ok(GyroSensitivity::Dps2000),
            _ => Err(ConfigurationError::InvalidGyroSensitivity(value)),
        }
    }
}

impl From<GyroSensitivity> for u32 {
    fn from(value: GyroSensitivity) -> Self {
        value.range()
    }
}

impl fmt::Display for GyroSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} deg/s", self.range())
    }
}

/// Accelerometer full scale range in g
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AccelSensitivity {
    G2,
    G4,
    G8,
    G16,
}

impl AccelSensitivity {
    pub const ALL: [AccelSensitivity; 4] = [
        AccelSensitivity::G2,
        AccelSensitivity::G4,
        AccelSensitivity::G8,
        AccelSensitivity::G16,
    ];

    /// Full scale range in g
    pub fn range(&self) -> u32 {
        match self {
            AccelSensitivity::G2 => 2,
            AccelSensitivity::G4 => 4,
            AccelSensitivity::G8 => 8,
            AccelSensitivity::G16 => 16,
        }
    }

    /// Scale factor in g per raw count
    pub fn scale(&self) -> f64 {
        self.range() as f64 / i16::MAX as f64
    }

    /// Full scale select bits for ACCEL_CONFIG
    pub fn bits(&self) -> u8 {
        match self {
            AccelSensitivity::G2 => BITS_FS_2G,
            AccelSensitivity::G4 => BITS_FS_4G,
            AccelSensitivity::G8 => BITS_FS_8G,
            AccelSensitivity::G16 => BITS_FS_16G,
        }
    }

    /// Normalize a factory offset register value into raw counts at this range.
    /// The offsets are stored at the 8 g reference range.
    pub fn normalize_offset(&self, value: i16) -> f64 {
        let value = match self {
            AccelSensitivity::G16 => value >> 1,
            AccelSensitivity::G8 => value,
            AccelSensitivity::G4 => value.wrapping_shl(1),
            AccelSensitivity::G2 => value.wrapping_shl(2),
        };
        value as f64
    }
}

impl TryFrom<u32> for AccelSensitivity {
    type Error = ConfigurationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(AccelSensitivity::G2),
            4 => Ok(AccelSensitivity::G4),
            8 => Ok(AccelSensitivity::G8),
            16 => Ok(AccelSensitivity::G16),
            _ => Err(ConfigurationError::InvalidAccelSensitivity(value)),
        }
    }
}

impl From<AccelSensitivity> for u32 {
    fn from(value: AccelSensitivity) -> Self {
        value.range()
    }
}

impl fmt::Display for AccelSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} g", self.range())
    }
}

/// Supported gyro low pass filter cutoffs, highest first
const GYRO_LPF_LADDER: &[(u32, u8)] = &[
    (197, BITS_DLPF_GYRO_CFG_197HZ),
    (152, BITS_DLPF_GYRO_CFG_152HZ),
    (120, BITS_DLPF_GYRO_CFG_120HZ),
    (51, BITS_DLPF_GYRO_CFG_51HZ),
    (24, BITS_DLPF_GYRO_CFG_24HZ),
    (12, BITS_DLPF_GYRO_CFG_12HZ),
];
const GYRO_LPF_FLOOR: (u32, u8) = (6, BITS_DLPF_GYRO_CFG_6HZ);

/// Supported accelerometer low pass filter cutoffs, highest first
const ACCEL_LPF_LADDER: &[(u32, u8)] = &[
    (246, BITS_DLPF_ACCEL_CFG_246HZ),
    (111, BITS_DLPF_ACCEL_CFG_111HZ),
    (50, BITS_DLPF_ACCEL_CFG_50HZ),
    (24, BITS_DLPF_ACCEL_CFG_24HZ),
    (12, BITS_DLPF_ACCEL_CFG_12HZ),
];
const ACCEL_LPF_FLOOR: (u32, u8) = (5, BITS_DLPF_ACCEL_CFG_5HZ);

/// Returns the highest cutoff in the ladder not exceeding the requested rate
/// together with its register bits, or the floor bucket.
fn select_lpf(ladder: &[(u32, u8)], floor: (u32, u8), rate_hz: u32) -> (u32, u8) {
    ladder
        .iter()
        .copied()
        .find(|(cutoff, _)| rate_hz >= *cutoff)
        .unwrap_or(floor)
}

/// Gyro filter bucket (cutoff in Hz, DLPF bits) for the requested rate
pub fn gyro_lpf(rate_hz: u32) -> (u32, u8) {
    select_lpf(GYRO_LPF_LADDER, GYRO_LPF_FLOOR, rate_hz)
}

/// Accelerometer filter bucket (cutoff in Hz, DLPF bits) for the requested rate
pub fn accel_lpf(rate_hz: u32) -> (u32, u8) {
    select_lpf(ACCEL_LPF_LADDER, ACCEL_LPF_FLOOR, rate_hz)
}

/// Validate a requested sample rate
pub fn check_sample_rate(rate_hz: u32) -> Result<u32, ConfigurationError> {
    if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate_hz) {
        Ok(rate_hz)
    } else {
        Err(ConfigurationError::InvalidSampleRate(rate_hz))
    }
}

/// Sample rate divider register value for the given rate:
///   divider = round(1125 / rate) - 1
pub fn sample_rate_divider(rate_hz: u32) -> u8 {
    let divider = (BASE_SAMPLE_RATE / rate_hz.max(1) as f64).round() - 1.0;
    divider.clamp(0.0, u8::MAX as f64) as u8
}

/// Polling period for the given rate: round(1125 / rate) milliseconds
pub fn sample_period(rate_hz: u32) -> Duration {
    let millis = (BASE_SAMPLE_RATE / rate_hz.max(1) as f64).round();
    Duration::from_millis(millis.max(1.0) as u64)
}

/// Magnetometer sample rate, capped at what the magnetometer supports
pub fn mag_sample_rate(rate_hz: u32) -> u32 {
    rate_hz.min(AK8963_MAX_SAMPLE_RATE)
}

/// Device configuration in effect while polling. Set once during startup
/// and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceState {
    /// deg/s per raw count
    pub gyro_scale: f64,
    /// g per raw count
    pub accel_scale: f64,
    /// µT per raw count, per axis, from the magnetometer fuse ROM
    pub mag_sensitivity: [f64; 3],
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub mag_enabled: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            gyro_scale: GyroSensitivity::Dps250.scale(),
            accel_scale: AccelSensitivity::G2.scale(),
            mag_sensitivity: [MAG_SCALE; 3],
            sample_rate: 100,
            mag_enabled: false,
        }
    }
}

impl DeviceState {
    /// Inertial polling period
    pub fn period(&self) -> Duration {
        sample_period(self.sample_rate)
    }

    /// Magnetometer polling period
    pub fn mag_period(&self) -> Duration {
        sample_period(mag_sample_rate(self.sample_rate))
    }
}
