pub mod accumulator;
pub mod client;
pub mod command;
pub mod history;
pub mod reading;

#[cfg(test)]
pub mod engine_test;
#[cfg(test)]
pub mod reading_test;

use std::{collections::VecDeque, time::Duration};

use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::{self, JoinError, JoinHandle},
    time::{self, Instant, Interval, MissedTickBehavior},
};

use crate::{
    bus::{Bus, BusError},
    calibration::{CalibrationRecord, CalibrationStore},
    config::EngineConfig,
    drivers::icm20948::{
        driver::{Driver, StartupError},
        event::{MagSample, RawInertial, RawMag},
        info::DeviceState,
    },
};

use self::{
    accumulator::Accumulator,
    client::{ClientError, EngineClient},
    command::Command,
    history::History,
    reading::{Converter, Reading, ReadingError},
};

/// Time to let the sensors settle before the averaged view is trusted
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Size of the command channel buffer
const BUFFER_SIZE: usize = 64;

/// Lifecycle of the acquisition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
    Stopping,
}

/// Possible errors starting or stopping the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Startup(#[from] StartupError),
    #[error("engine task failed: {0}")]
    Task(#[from] JoinError),
    #[error("engine stopped unexpectedly: {0}")]
    Client(#[from] ClientError),
    #[error("device is no longer available")]
    DeviceLost,
}

/// Owns a running engine task
#[derive(Debug)]
pub struct EngineHandle {
    client: EngineClient,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Returns a new client for the engine
    pub fn client(&self) -> EngineClient {
        self.client.clone()
    }

    /// Stop the engine and wait for its task to finish
    pub async fn stop(self) -> Result<(), EngineError> {
        self.client.stop().await?;
        self.task.await?;
        Ok(())
    }
}

/// The [Engine] is the single task that polls the IMU. It owns the driver,
/// the accumulator, the latest snapshot and the history, and serves every
/// view of the data to [EngineClient]s over its command channel.
pub struct Engine<B: Bus> {
    /// Lent to the blocking pool while a bus transfer runs
    driver: Option<Driver<B>>,
    device: DeviceState,
    converter: Converter,
    accumulator: Accumulator,
    history: History,
    rx: mpsc::Receiver<Command>,
    state: watch::Sender<EngineState>,
    /// Latest instantaneous reading
    current: Option<Reading>,
    last_inertial: RawInertial,
    last_mag: RawMag,
    mag_error: Option<BusError>,
    /// Whether a valid magnetometer frame has been seen
    mag_seen: bool,
    tick: Instant,
    mag_tick: Instant,
    pending_current: Vec<mpsc::Sender<Reading>>,
    pending_buffered: VecDeque<mpsc::Sender<Reading>>,
}

impl<B: Bus> Engine<B> {
    /// Create an engine around an initialized driver. The engine does not
    /// poll until [Engine::run] is called.
    pub fn new(driver: Driver<B>, calibration: CalibrationRecord) -> (Self, EngineClient) {
        let (tx, rx) = mpsc::channel(BUFFER_SIZE);
        let (state_tx, state_rx) = watch::channel(EngineState::Stopped);
        let device = *driver.state();
        let converter = Converter::new(calibration, &device);
        let now = Instant::now();

        let engine = Self {
            driver: Some(driver),
            device,
            converter,
            accumulator: Accumulator::new(now),
            history: History::default(),
            rx,
            state: state_tx,
            current: None,
            last_inertial: RawInertial::default(),
            last_mag: RawMag::default(),
            mag_error: None,
            mag_seen: false,
            tick: now,
            mag_tick: now,
            pending_current: Vec::new(),
            pending_buffered: VecDeque::new(),
        };

        (engine, EngineClient::new(tx, state_rx))
    }

    /// Bring up the device on the given bus and start polling it. Loads the
    /// calibration, configures the device, waits for the sensors to settle
    /// and throws away the first average.
    pub async fn start(bus: B, config: &EngineConfig) -> Result<EngineHandle, EngineError> {
        let settings = config.device_settings();
        let address = config.address;
        let mut calibration = CalibrationStore::new(&config.calibration_path).load_or_default();

        // Bring-up sleeps between register writes
        let (driver, offsets) = task::spawn_blocking(move || {
            let mut driver = Driver::new(bus, address);
            let offsets = driver.initialize(&settings)?;
            Ok::<_, StartupError>((driver, offsets))
        })
        .await??;

        if let Some(offsets) = offsets {
            log::info!(
                "Using hardware offsets: gyro {:?}, accel {:?}",
                offsets.gyro,
                offsets.accel
            );
            calibration.gyro_bias = offsets.gyro;
            calibration.accel_bias = offsets.accel;
        }

        let (engine, client) = Engine::new(driver, calibration);
        let task = tokio::spawn(engine.run());
        let handle = EngineHandle { client, task };

        time::sleep(SETTLE_DELAY).await;
        let discarded = handle.client.average().await?;
        log::debug!("Discarded settling average over {} samples", discarded.samples);

        Ok(handle)
    }

    /// Run the polling loop until a stop is requested or every client has
    /// been dropped
    pub async fn run(mut self) {
        let device = self.device;
        log::info!(
            "Starting acquisition at {} Hz (period {:?}, magnetometer {})",
            device.sample_rate,
            device.period(),
            if device.mag_enabled { "enabled" } else { "disabled" }
        );

        let mut clock = time::interval(device.period());
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut mag_clock = device.mag_enabled.then(|| {
            let mut interval = time::interval(device.mag_period());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        self.state.send_replace(EngineState::Running);

        loop {
            tokio::select! {
                now = clock.tick() => {
                    if let Err(e) = self.on_tick(now).await {
                        log::error!("Stopping acquisition: {e}");
                        break;
                    }
                }
                now = next_tick(&mut mag_clock) => {
                    if let Err(e) = self.on_mag_tick(now).await {
                        log::error!("Stopping acquisition: {e}");
                        break;
                    }
                }
                cmd = self.rx.recv() => {
                    let Some(cmd) = cmd else {
                        log::debug!("All engine clients dropped");
                        break;
                    };
                    log::trace!("Received engine command: {cmd:?}");
                    match cmd {
                        Command::GetCurrent(sender) => self.handle_current(sender),
                        Command::GetAverage(sender) => self.handle_average(sender),
                        Command::GetBuffered(sender) => {
                            self.pending_buffered.push_back(sender);
                            self.serve_buffered();
                        }
                        Command::DrainHistory(sender) => {
                            let readings = self.history.drain();
                            reply(sender, readings, "history");
                        }
                        Command::Stop => {
                            log::debug!("Stopping acquisition engine");
                            break;
                        }
                    }
                }
            }
        }

        self.state.send_replace(EngineState::Stopping);
        self.rx.close();
        drop(clock);
        drop(mag_clock);
        self.pending_current.clear();
        self.pending_buffered.clear();
        self.history.clear();
        self.current = None;
        self.state.send_replace(EngineState::Stopped);
        log::info!("Acquisition engine stopped");
    }

    /// Run a bus transfer on the blocking pool. Bus writes sleep while the
    /// device settles, so transfers never run on the runtime threads.
    async fn transfer<T, F>(&mut self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Driver<B>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut driver = self.driver.take().ok_or(EngineError::DeviceLost)?;
        let (driver, output) = task::spawn_blocking(move || {
            let output = op(&mut driver);
            (driver, output)
        })
        .await?;
        self.driver = Some(driver);
        Ok(output)
    }

    /// Sample the gyro, accel and temperature registers
    async fn on_tick(&mut self, now: Instant) -> Result<(), EngineError> {
        self.tick = now;
        let previous = self.last_inertial;
        let sample = self
            .transfer(move |driver| driver.read_inertial(&previous))
            .await?;
        self.last_inertial = sample.raw;

        let mag_error = if self.mag_seen {
            self.mag_error.clone().map(ReadingError::from)
        } else {
            Some(ReadingError::NoMagSamples)
        };
        let reading = self.converter.instantaneous(
            &sample.raw,
            &self.last_mag,
            sample.error.map(ReadingError::from),
            mag_error,
            self.tick,
            self.mag_tick,
        );
        log::trace!("Inertial tick: {reading}");

        self.accumulator.add_inertial(&sample.raw, &self.last_mag);
        self.publish(reading);
        Ok(())
    }

    /// Sample the magnetometer through the auxiliary bus
    async fn on_mag_tick(&mut self, now: Instant) -> Result<(), EngineError> {
        self.mag_tick = now;
        let previous = self.last_mag;
        let sample = self
            .transfer(move |driver| driver.read_mag(&previous))
            .await?;
        if let MagSample::Frame { raw, error } = sample {
            self.last_mag = raw;
            self.mag_error = error;
            self.mag_seen = true;
            self.accumulator.add_mag(&raw);
        }
        Ok(())
    }

    /// Make a new instantaneous reading visible to every view
    fn publish(&mut self, reading: Reading) {
        for sender in self.pending_current.drain(..) {
            reply(sender, reading.clone(), "current");
        }
        if self.history.push(reading.clone()).is_some() {
            log::trace!("History full, evicted oldest reading");
        }
        self.current = Some(reading);
        self.serve_buffered();
    }

    fn handle_current(&mut self, sender: mpsc::Sender<Reading>) {
        match self.current.as_ref() {
            Some(reading) => reply(sender, reading.clone(), "current"),
            None => self.pending_current.push(sender),
        }
    }

    fn handle_average(&mut self, sender: mpsc::Sender<Reading>) {
        // A requester that went away does not reset the window
        if sender.is_closed() {
            return;
        }
        let average = self
            .accumulator
            .drain(&self.converter, self.tick, self.mag_tick);
        reply(sender, average, "average");
    }

    /// Hand buffered readings to waiting consumers, oldest first
    fn serve_buffered(&mut self) {
        while !self.history.is_empty() {
            let Some(sender) = self.pending_buffered.pop_front() else {
                break;
            };
            if sender.is_closed() {
                continue;
            }
            let Some(reading) = self.history.pop() else {
                break;
            };
            reply(sender, reading, "buffered");
        }
    }
}

/// Wait for the next tick of an optional timer
async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

/// Deliver a reply without ever blocking the engine
fn reply<T>(sender: mpsc::Sender<T>, value: T, view: &str) {
    if let Err(e) = sender.try_send(value) {
        log::debug!("Unable to deliver {view} reply: {e}");
    }
}
