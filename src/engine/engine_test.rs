use std::{error::Error, thread, time::Duration};

use tokio::{
    sync::mpsc,
    time::{self, Instant},
};

use crate::{
    bus::{sim::SimulatedBus, Bus, BusError},
    calibration::CalibrationRecord,
    config::EngineConfig,
    drivers::icm20948::{driver::Driver, registers::*},
    engine::{
        client::ClientError,
        history::{History, HISTORY_CAPACITY},
        reading::{Reading, ReadingError},
        Engine, EngineState,
    },
};

fn test_config(name: &str) -> EngineConfig {
    EngineConfig {
        sample_rate: 100,
        calibration_path: std::env::temp_dir().join(format!("imu-sampler-engine-{name}.json")),
        ..Default::default()
    }
}

/// Bus that blocks on every write like a real device settling
struct SlowBus {
    inner: SimulatedBus,
    delay: Duration,
}

impl Bus for SlowBus {
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8, BusError> {
        self.inner.read_byte(addr, reg)
    }

    fn read_word(&mut self, addr: u8, reg: u8) -> Result<i16, BusError> {
        self.inner.read_word(addr, reg)
    }

    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        thread::sleep(self.delay);
        self.inner.write_byte(addr, reg, value)
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        thread::sleep(self.delay);
        self.inner.write_block(addr, reg, data)
    }
}

fn reading_at(timestamp: Instant) -> Reading {
    Reading {
        gyro: [0.0; 3],
        accel: [0.0; 3],
        mag: [0.0; 3],
        temperature: 0.0,
        samples: 1,
        mag_samples: 0,
        timestamp,
        mag_timestamp: timestamp,
        elapsed: Duration::ZERO,
        mag_elapsed: Duration::ZERO,
        error: None,
        mag_error: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_average_counts_ticks() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let handle = Engine::start(bus.clone(), &test_config("average")).await?;
    let client = handle.client();
    assert_eq!(client.state(), EngineState::Running);

    // 11 ms period: ticks at +6, +17, ... +105 after the settling drain
    time::sleep(Duration::from_millis(110)).await;
    let average = client.average().await?;
    assert_eq!(average.samples, 10);
    assert!(average.error.is_none());
    assert_eq!(average.elapsed, Duration::from_millis(110));
    assert!((average.accel[2] - 1.0).abs() < 1e-3);
    assert_eq!(average.accel[0], 0.0);
    assert_eq!(average.gyro, [0.0; 3]);
    assert_eq!(average.temperature, 21.0);

    // Magnetometer is disabled
    assert_eq!(average.mag_samples, 0);
    assert_eq!(average.mag_error, Some(ReadingError::NoMagSamples));

    // Draining restarted the window
    let again = client.average().await?;
    assert_eq!(again.samples, 0);
    assert_eq!(again.error, Some(ReadingError::NoInertialSamples));
    assert_eq!(again.gyro, [0.0; 3]);
    assert_eq!(again.accel, [0.0; 3]);

    handle.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_average_matches_single_tick() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    bus.set_word(0, GYRO_XOUT_H, -131);
    bus.set_word(0, ACCEL_YOUT_H, 4096);
    let handle = Engine::start(bus.clone(), &test_config("single")).await?;
    let client = handle.client();

    time::sleep(Duration::from_millis(50)).await;
    let current = client.current().await?;
    let average = client.average().await?;
    assert!(average.samples > 1);
    assert_eq!(average.gyro, current.gyro);
    assert_eq!(average.accel, current.accel);
    assert_eq!(average.temperature, current.temperature);

    handle.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_current_reports_read_errors() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let handle = Engine::start(bus.clone(), &test_config("current")).await?;
    let client = handle.client();

    let current = client.current().await?;
    assert_eq!(current.samples, 1);
    assert!(current.error.is_none());
    assert!((current.accel[2] - 1.0).abs() < 1e-3);
    assert_eq!(current.elapsed, Duration::ZERO);

    bus.fail_all(true);
    time::sleep(Duration::from_millis(20)).await;
    let failed = client.current().await?;
    assert_eq!(failed.samples, 0);
    assert!(matches!(failed.error, Some(ReadingError::Transport(ref e)) if e.is_transport()));
    // The previous values are reused
    assert_eq!(failed.accel, current.accel);
    assert!(failed.timestamp > current.timestamp);

    // Failed ticks still count towards the average
    let average = client.average().await?;
    assert!(average.samples > 0);
    assert!(average.error.is_none());

    bus.fail_all(false);
    handle.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_history_is_bounded() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let handle = Engine::start(bus.clone(), &test_config("history")).await?;
    let client = handle.client();

    time::sleep(Duration::from_secs(4)).await;
    let current = client.current().await?;
    let history = client.drain_history().await?;
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp));
    assert_eq!(history.last().map(|r| r.timestamp), Some(current.timestamp));

    // Empty history: the next buffered reading is the next tick
    assert!(client.drain_history().await?.is_empty());
    let next = client.next_buffered().await?;
    assert!(next.timestamp > current.timestamp);

    handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_history_evicts_oldest() -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let mut history = History::new(3);
    for i in 0..4 {
        history.push(reading_at(start + Duration::from_millis(i)));
    }
    assert_eq!(history.len(), 3);
    assert_eq!(history.capacity(), 3);

    let readings = history.drain();
    let times: Vec<Duration> = readings.iter().map(|r| r.timestamp - start).collect();
    assert_eq!(
        times,
        vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(3)
        ]
    );
    assert!(history.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_polling() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let handle = Engine::start(bus.clone(), &test_config("stop")).await?;
    let client = handle.client();

    handle.stop().await?;
    assert_eq!(client.state(), EngineState::Stopped);

    let reads = bus.reads();
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bus.reads(), reads);

    assert!(matches!(client.current().await, Err(ClientError::ChannelClosed)));
    assert!(matches!(client.average().await, Err(ClientError::ChannelClosed)));
    assert!(matches!(client.next_buffered().await, Err(ClientError::ChannelClosed)));
    assert!(matches!(client.drain_history().await, Err(ClientError::ChannelClosed)));

    // Stopping again is harmless
    client.stop().await?;
    client.stopped().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_requests_queued_behind_stop_fail() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let driver = Driver::new(bus, ICM20948_ADDR);
    let (engine, client) = Engine::new(driver, CalibrationRecord::default());

    client.stop().await?;
    let waiting = client.clone();
    let request = tokio::spawn(async move { waiting.current().await });
    tokio::task::yield_now().await;

    engine.run().await;
    assert!(matches!(request.await?, Err(ClientError::ChannelClosed)));
    assert_eq!(client.state(), EngineState::Stopped);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropping_clients_stops_engine() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let driver = Driver::new(bus.clone(), ICM20948_ADDR);
    let (engine, client) = Engine::new(driver, CalibrationRecord::default());
    let task = tokio::spawn(engine.run());

    time::sleep(Duration::from_millis(30)).await;
    drop(client);
    task.await?;

    let reads = bus.reads();
    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bus.reads(), reads);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_mag_overrun_is_discarded() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::new(ICM20948_ADDR);
    bus.set_word(0, EXT_SLV_SENS_DATA_00, 0x0101);
    let driver = Driver::new(bus.clone(), ICM20948_ADDR);
    let (mut engine, _client) = Engine::new(driver, CalibrationRecord::default());

    engine.on_mag_tick(Instant::now()).await?;
    assert_eq!(engine.accumulator.mag_samples(), 1);
    assert_eq!(engine.accumulator.mag_sum(), [0x0101, 0, 0]);

    // Overrun without data ready
    bus.set_word(0, EXT_SLV_SENS_DATA_00, 0x0402);
    engine.on_mag_tick(Instant::now()).await?;
    assert_eq!(engine.accumulator.mag_samples(), 1);
    assert_eq!(engine.accumulator.mag_sum(), [0x0101, 0, 0]);
    assert_eq!(engine.last_mag.axes(), [0x0101, 0, 0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_inertial_tick_folds_last_mag() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::new(ICM20948_ADDR);
    bus.set_word(0, EXT_SLV_SENS_DATA_00, 0x0101);
    let driver = Driver::new(bus.clone(), ICM20948_ADDR);
    let (mut engine, _client) = Engine::new(driver, CalibrationRecord::default());

    engine.on_mag_tick(Instant::now()).await?;
    bus.fail_all(true);
    engine.on_tick(Instant::now()).await?;

    // The stale magnetometer frame is folded in again without counting a
    // magnetometer tick
    assert_eq!(engine.accumulator.samples(), 1);
    assert_eq!(engine.accumulator.mag_samples(), 1);
    assert_eq!(engine.accumulator.mag_sum(), [0x0202, 0, 0]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_average_keeps_window() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let driver = Driver::new(bus, ICM20948_ADDR);
    let (mut engine, _client) = Engine::new(driver, CalibrationRecord::default());

    engine.on_tick(Instant::now()).await?;
    engine.on_tick(Instant::now()).await?;

    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    engine.handle_average(tx);
    assert_eq!(engine.accumulator.samples(), 2);

    let (tx, mut rx) = mpsc::channel(1);
    engine.handle_average(tx);
    let average = rx.recv().await.ok_or("no reply")?;
    assert_eq!(average.samples, 2);
    assert_eq!(engine.accumulator.samples(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_magnetometer_sampling() -> Result<(), Box<dyn Error>> {
    let bus = SimulatedBus::resting(ICM20948_ADDR);
    let mut config = test_config("mag");
    config.enable_magnetometer = true;
    let handle = Engine::start(bus.clone(), &config).await?;
    let client = handle.client();

    time::sleep(Duration::from_millis(110)).await;
    let average = client.average().await?;
    assert_eq!(average.samples, 10);
    assert_eq!(average.mag_samples, 10);
    assert!(average.mag_error.is_none());
    assert_eq!(average.mag_elapsed, Duration::from_millis(110));

    let current = client.current().await?;
    assert_eq!(current.mag_samples, 1);
    assert!(current.mag_error.is_none());
    assert!(current.mag[0] > 0.0);

    // Every inertial tick folds the last frame again, doubling the sum
    // against the magnetometer tick count
    assert!((average.mag[0] - 2.0 * current.mag[0]).abs() < 1e-9);
    assert_eq!(average.mag[1], 0.0);
    assert_eq!(average.mag[2], 0.0);

    handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_bus_transfers_leave_runtime_free() -> Result<(), Box<dyn Error>> {
    let delay = Duration::from_millis(50);
    let bus = SlowBus {
        inner: SimulatedBus::resting(ICM20948_ADDR),
        delay,
    };
    let driver = Driver::new(bus, ICM20948_ADDR);
    let (mut engine, _client) = Engine::new(driver, CalibrationRecord::default());

    // The magnetometer read issues several writes; other work on this
    // runtime thread must keep making progress meanwhile
    let started = std::time::Instant::now();
    let (result, waited) = tokio::join!(engine.on_mag_tick(Instant::now()), async {
        tokio::task::yield_now().await;
        started.elapsed()
    });
    result?;
    assert!(waited < delay);
    assert!(started.elapsed() >= delay);
    assert_eq!(engine.accumulator.mag_samples(), 1);

    // The driver is handed back for the next tick
    engine.on_tick(Instant::now()).await?;
    assert_eq!(engine.accumulator.samples(), 1);
    Ok(())
}
