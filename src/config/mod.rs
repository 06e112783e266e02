pub mod path;

#[cfg(test)]
pub mod config_test;

use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drivers::icm20948::{
    driver::DeviceSettings,
    info::{check_sample_rate, AccelSensitivity, ConfigurationError, GyroSensitivity},
    registers::ICM20948_ADDR,
};

/// Represents all possible errors loading an [EngineConfig]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),
}

/// Defines how the IMU is reached and configured. Missing fields take their
/// default values.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineConfig {
    /// I2C bus device (e.g. "/dev/i2c-1")
    pub bus: PathBuf,
    /// Address of the IMU on the bus
    pub address: u8,
    /// Gyro full scale range in deg/s
    pub gyro_sensitivity: GyroSensitivity,
    /// Accelerometer full scale range in g
    pub accel_sensitivity: AccelSensitivity,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub enable_magnetometer: bool,
    /// Use the factory offsets stored on the device as biases
    pub apply_hardware_offsets: bool,
    pub calibration_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bus: PathBuf::from("/dev/i2c-1"),
            address: ICM20948_ADDR,
            gyro_sensitivity: GyroSensitivity::Dps250,
            accel_sensitivity: AccelSensitivity::G4,
            sample_rate: 50,
            enable_magnetometer: false,
            apply_hardware_offsets: false,
            calibration_path: PathBuf::from(path::DEFAULT_CALIBRATION_PATH),
        }
    }
}

impl EngineConfig {
    /// Load an [EngineConfig] from the given YAML string
    pub fn from_yaml(content: String) -> Result<EngineConfig, LoadError> {
        let config: EngineConfig = serde_yaml::from_str(content.as_str())?;
        config.validate()?;
        Ok(config)
    }

    /// Load an [EngineConfig] from the given YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig, LoadError> {
        let file = std::fs::File::open(path)?;
        let config: EngineConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from the first config file found, or use the
    /// defaults if there is none
    pub fn load() -> Result<EngineConfig, LoadError> {
        let Some(path) = path::find_config_path() else {
            log::info!("No configuration file found. Using defaults.");
            return Ok(EngineConfig::default());
        };
        log::info!("Loading configuration from {path:?}");
        Self::from_yaml_file(path)
    }

    /// Reject settings the device cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_sample_rate(self.sample_rate)?;
        Ok(())
    }

    /// Settings applied to the device at startup
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            gyro: self.gyro_sensitivity,
            accel: self.accel_sensitivity,
            sample_rate: self.sample_rate,
            enable_mag: self.enable_magnetometer,
            apply_hw_offsets: self.apply_hardware_offsets,
        }
    }
}
