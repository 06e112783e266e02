use std::error::Error;

use tokio::time::Instant;

use crate::{
    bus::BusError,
    calibration::{CalibrationRecord, RescaleMatrix},
    drivers::icm20948::{
        event::{RawInertial, RawMag},
        info::DeviceState,
    },
    engine::reading::{Converter, ReadingError},
};

fn test_converter() -> Converter {
    let calibration = CalibrationRecord {
        gyro_bias: [10.0, -10.0, 0.0],
        accel_bias: [0.0, 4.0, -8.0],
        mag_bias: [10.0, -20.0, 5.0],
        mag_rescale: RescaleMatrix {
            x: (1.0, 0.5, 0.0),
            y: (0.25, 2.0, -1.0),
            z: (0.0, -0.5, 1.5),
        },
    };
    let state = DeviceState {
        gyro_scale: 0.5,
        accel_scale: 0.25,
        mag_sensitivity: [0.5, 0.25, 0.125],
        ..Default::default()
    };
    Converter::new(calibration, &state)
}

#[tokio::test]
async fn test_mag_conversion() -> Result<(), Box<dyn Error>> {
    let converter = test_converter();

    // raw * sensitivity = [50, -10, 8], minus bias = [40, 10, 3]
    let mag = converter.mag([100.0, -40.0, 64.0]);
    assert_eq!(mag[0], 45.0);
    assert_eq!(mag[1], 27.0);
    assert_eq!(mag[2], -0.5);
    Ok(())
}

#[tokio::test]
async fn test_inertial_conversion() -> Result<(), Box<dyn Error>> {
    let converter = test_converter();
    assert_eq!(converter.gyro([12.0, -12.0, 3.0]), [1.0, -1.0, 1.5]);
    assert_eq!(converter.accel([4.0, 8.0, 0.0]), [1.0, 1.0, 2.0]);
    assert_eq!(Converter::temperature(0.0), 21.0);
    assert_eq!(Converter::temperature(333.87), 22.0);
    assert_eq!(Converter::temperature(-333.87), 20.0);
    Ok(())
}

#[tokio::test]
async fn test_instantaneous_mag_fields() -> Result<(), Box<dyn Error>> {
    let converter = test_converter();
    let now = Instant::now();
    let inertial = RawInertial::default();
    let mag = RawMag {
        words: [100, -40, 64, 0],
    };

    // Nothing sampled yet: the calibrated bias must not leak into the fields
    let reading = converter.instantaneous(
        &inertial,
        &RawMag::default(),
        None,
        Some(ReadingError::NoMagSamples),
        now,
        now,
    );
    assert_eq!(reading.mag, [0.0; 3]);
    assert_eq!(reading.mag_samples, 0);
    assert_eq!(reading.samples, 1);

    let reading = converter.instantaneous(&inertial, &mag, None, None, now, now);
    assert_eq!(reading.mag, [45.0, 27.0, -0.5]);
    assert_eq!(reading.mag_samples, 1);

    // A failed read reports the previous frame
    let error = BusError::Transport {
        addr: 0x68,
        reg: 0x3B,
        message: "timed out".to_string(),
    };
    let reading = converter.instantaneous(
        &inertial,
        &mag,
        None,
        Some(ReadingError::Transport(error)),
        now,
        now,
    );
    assert_eq!(reading.mag, [45.0, 27.0, -0.5]);
    assert_eq!(reading.mag_samples, 0);
    Ok(())
}
