use std::error::Error;
use std::time::Duration;

use imu_sampler::bus::sim::SimulatedBus;
use imu_sampler::calibration::{CalibrationRecord, CalibrationStore};
use imu_sampler::config::EngineConfig;
use imu_sampler::drivers::icm20948::registers::{GYRO_ZOUT_H, ICM20948_ADDR};
use imu_sampler::engine::{Engine, EngineState};

#[tokio::test(start_paused = true)]
async fn test_engine_with_calibration() -> Result<(), Box<dyn Error>> {
    let path = std::env::temp_dir().join(format!(
        "imu-sampler-integration-{}.json",
        std::process::id()
    ));
    let store = CalibrationStore::new(&path);
    let record = CalibrationRecord {
        gyro_bias: [0.0, 0.0, 100.0],
        ..Default::default()
    };
    store.save(&record)?;

    let bus = SimulatedBus::resting(ICM20948_ADDR);
    bus.set_word(0, GYRO_ZOUT_H, 100);
    let config = EngineConfig::from_yaml(format!(
        "sample_rate: 100\nenable_magnetometer: true\ncalibration_path: {}\n",
        path.display()
    ))?;

    let handle = Engine::start(bus.clone(), &config).await?;
    let client = handle.client();

    // Bias cancels the raw gyro value
    let current = client.current().await?;
    assert_eq!(current.gyro, [0.0; 3]);

    tokio::time::sleep(Duration::from_millis(220)).await;
    let average = client.average().await?;
    assert_eq!(average.samples, 20);
    assert_eq!(average.gyro, [0.0; 3]);
    assert!(average.mag_samples > 0);

    let history = client.drain_history().await?;
    assert!(!history.is_empty());
    for reading in history.iter() {
        assert!(reading.error.is_none());
        assert_eq!(reading.samples, 1);
    }

    handle.stop().await?;
    assert_eq!(client.state(), EngineState::Stopped);
    assert!(client.current().await.is_err());

    std::fs::remove_file(&path)?;
    Ok(())
}
