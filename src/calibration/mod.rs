//! Persistent sensor calibration: per-axis biases and the magnetometer
//! rescale matrix.


use std::{
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::reading::Reading;

/// Represents all possible errors loading or saving a [CalibrationRecord]
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Could not access calibration file: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to (de)serialize calibration data: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// The [RescaleMatrix] maps bias corrected magnetometer values onto the
/// output axes. Values are multiplied as:
///   x' = x.0 * x + x.1 * y + x.2 * z
///   y' = y.0 * x + y.1 * y + y.2 * z
///   z' = z.0 * x + z.1 * y + z.2 * z
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RescaleMatrix {
    pub x: (f64, f64, f64),
    pub y: (f64, f64, f64),
    pub z: (f64, f64, f64),
}

impl RescaleMatrix {
    /// Apply the matrix to the given vector
    pub fn apply(&self, value: [f64; 3]) -> [f64; 3] {
        let [x, y, z] = value;
        [
            self.x.0 * x + self.x.1 * y + self.x.2 * z,
            self.y.0 * x + self.y.1 * y + self.y.2 * z,
            self.z.0 * x + self.z.1 * y + self.z.2 * z,
        ]
    }
}

impl Default for RescaleMatrix {
    fn default() -> Self {
        RescaleMatrix {
            x: (1.0, 0.0, 0.0),
            y: (0.0, 1.0, 0.0),
            z: (0.0, 0.0, 1.0),
        }
    }
}

impl fmt::Display for RescaleMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}; {}, {}, {}; {}, {}, {}",
            self.x.0, self.x.1, self.x.2, self.y.0, self.y.1, self.y.2, self.z.0, self.z.1, self.z.2,
        )
    }
}

/// Biases are in raw counts and subtracted before scaling. Every field is
/// required; a file missing any of them is rejected as a whole.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct CalibrationRecord {
    pub gyro_bias: [f64; 3],
    pub accel_bias: [f64; 3],
    pub mag_bias: [f64; 3],
    pub mag_rescale: RescaleMatrix,
}

impl CalibrationRecord {
    /// Load a [CalibrationRecord] from the given JSON string. The flat layout
    /// used by older tools (A01, G01, Ms11, ...) is accepted as well.
    pub fn from_json(content: &str) -> Result<Self, CalibrationError> {
        match serde_json::from_str::<CalibrationRecord>(content) {
            Ok(record) => Ok(record),
            Err(e) => match serde_json::from_str::<LegacyRecord>(content) {
                Ok(legacy) => {
                    log::debug!("Loaded calibration in legacy layout");
                    Ok(legacy.into())
                }
                Err(_) => Err(e.into()),
            },
        }
    }

    /// Serialize the record to JSON
    pub fn to_json(&self) -> Result<String, CalibrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Shift the gyro and accel biases using an averaged reading taken while
    /// the device rests with +Z up, so that the same conditions read as zero
    /// rotation and (0, 0, 1) g.
    pub fn apply_stationary(&mut self, average: &Reading, gyro_scale: f64, accel_scale: f64) {
        const GRAVITY: [f64; 3] = [0.0, 0.0, 1.0];
        for axis in 0..3 {
            self.gyro_bias[axis] += average.gyro[axis] / gyro_scale;
            self.accel_bias[axis] += (average.accel[axis] - GRAVITY[axis]) / accel_scale;
        }
    }
}

/// Flat calibration layout written by the original tooling
#[derive(Deserialize)]
#[allow(non_snake_case)]
struct LegacyRecord {
    A01: f64,
    A02: f64,
    A03: f64,
    G01: f64,
    G02: f64,
    G03: f64,
    M01: f64,
    M02: f64,
    M03: f64,
    Ms11: f64,
    Ms12: f64,
    Ms13: f64,
    Ms21: f64,
    Ms22: f64,
    Ms23: f64,
    Ms31: f64,
    Ms32: f64,
    Ms33: f64,
}

impl From<LegacyRecord> for CalibrationRecord {
    fn from(legacy: LegacyRecord) -> Self {
        CalibrationRecord {
            gyro_bias: [legacy.G01, legacy.G02, legacy.G03],
            accel_bias: [legacy.A01, legacy.A02, legacy.A03],
            mag_bias: [legacy.M01, legacy.M02, legacy.M03],
            mag_rescale: RescaleMatrix {
                x: (legacy.Ms11, legacy.Ms12, legacy.Ms13),
                y: (legacy.Ms21, legacy.Ms22, legacy.Ms23),
                z: (legacy.Ms31, legacy.Ms32, legacy.Ms33),
            },
        }
    }
}

/// Loads and saves a [CalibrationRecord] at a fixed path
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Path of the calibration file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the calibration record
    pub fn load(&self) -> Result<CalibrationRecord, CalibrationError> {
        let content = fs::read_to_string(&self.path)?;
        CalibrationRecord::from_json(&content)
    }

    /// Load the calibration record, substituting the default record if it
    /// is missing or corrupt
    pub fn load_or_default(&self) -> CalibrationRecord {
        match self.load() {
            Ok(record) => {
                log::debug!("Loaded calibration from {:?}", self.path);
                record
            }
            Err(e) => {
                log::warn!(
                    "Error reading calibration data from {:?}: {e}. Using defaults.",
                    self.path
                );
                CalibrationRecord::default()
            }
        }
    }

    /// Save the calibration record. The record is written to a temporary
    /// file next to the target and renamed over it, so a failed write never
    /// leaves a truncated file behind.
    pub fn save(&self, record: &CalibrationRecord) -> Result<(), CalibrationError> {
        let result = self.write_atomic(record);
        if let Err(e) = result.as_ref() {
            log::error!("Error saving calibration data to {:?}: {e}", self.path);
        }
        result
    }

    fn write_atomic(&self, record: &CalibrationRecord) -> Result<(), CalibrationError> {
        let content = record.to_json()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let written = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                log::debug!("Unable to remove {tmp_path:?}: {cleanup}");
            }
            return Err(e.into());
        }
        fs::rename(&tmp_path, &self.path)?;

        log::debug!("Saved calibration to {:?}", self.path);
        Ok(())
    }
}
