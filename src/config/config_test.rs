use std::{error::Error, path::PathBuf};

use crate::{
    config::{EngineConfig, LoadError},
    drivers::icm20948::info::{AccelSensitivity, ConfigurationError, GyroSensitivity},
};

const SAMPLE_CONFIG: &str = "./rootfs/etc/imu-sampler/config.yaml";

#[tokio::test]
async fn test_load_sample_config() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::from_yaml_file(SAMPLE_CONFIG)?;
    println!("{config:?}");
    assert_eq!(config.bus, PathBuf::from("/dev/i2c-1"));
    assert_eq!(config.address, 0x68);
    assert_eq!(config.sample_rate, 50);
    assert!(!config.enable_magnetometer);
    Ok(())
}

#[tokio::test]
async fn test_partial_config_uses_defaults() -> Result<(), Box<dyn Error>> {
    let yaml = String::from(
        "sample_rate: 100\n\
         gyro_sensitivity: 2000\n\
         accel_sensitivity: 16\n\
         calibration_path: /tmp/cal.json\n",
    );
    let config = EngineConfig::from_yaml(yaml)?;
    assert_eq!(config.sample_rate, 100);
    assert_eq!(config.gyro_sensitivity, GyroSensitivity::Dps2000);
    assert_eq!(config.accel_sensitivity, AccelSensitivity::G16);
    assert_eq!(config.calibration_path, PathBuf::from("/tmp/cal.json"));
    assert_eq!(config.bus, EngineConfig::default().bus);

    let settings = config.device_settings();
    assert_eq!(settings.sample_rate, 100);
    assert_eq!(settings.gyro, GyroSensitivity::Dps2000);
    assert!(!settings.enable_mag);
    Ok(())
}

#[tokio::test]
async fn test_invalid_sensitivity_rejected() -> Result<(), Box<dyn Error>> {
    let result = EngineConfig::from_yaml(String::from("gyro_sensitivity: 300\n"));
    assert!(matches!(result, Err(LoadError::DeserializeError(_))));

    let result = EngineConfig::from_yaml(String::from("accel_sensitivity: 3\n"));
    assert!(matches!(result, Err(LoadError::DeserializeError(_))));
    Ok(())
}

#[tokio::test]
async fn test_invalid_sample_rate_rejected() -> Result<(), Box<dyn Error>> {
    let result = EngineConfig::from_yaml(String::from("sample_rate: 2000\n"));
    assert!(matches!(
        result,
        Err(LoadError::Invalid(ConfigurationError::InvalidSampleRate(2000)))
    ));

    let result = EngineConfig::from_yaml(String::from("sample_rate: 0\n"));
    assert!(matches!(result, Err(LoadError::Invalid(_))));
    Ok(())
}

#[tokio::test]
async fn test_config_round_trip() -> Result<(), Box<dyn Error>> {
    let mut config = EngineConfig::default();
    config.enable_magnetometer = true;
    config.gyro_sensitivity = GyroSensitivity::Dps500;

    let yaml = serde_yaml::to_string(&config)?;
    assert!(yaml.contains("gyro_sensitivity: 500"));
    let loaded = EngineConfig::from_yaml(yaml)?;
    assert_eq!(loaded, config);
    Ok(())
}
