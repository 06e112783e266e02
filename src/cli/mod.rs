pub mod calibration;
pub mod run;

use std::error::Error;
use std::path::PathBuf;

use calibration::{handle_calibrate, handle_calibration, CalibrationCommand};
use clap::{Parser, Subcommand};
use run::{handle_run, View};

use crate::bus::{i2c::LinuxI2cBus, sim::SimulatedBus, Bus};
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineHandle};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a configuration file to use instead of the default search path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Use a simulated IMU instead of the I2C bus
    #[arg(long, global = true)]
    pub simulate: bool,
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll the IMU and print readings (default)
    Run {
        /// Which view of the data to print
        #[arg(long, value_enum, default_value_t = View::Average)]
        view: View,
        /// Time between printed readings in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Stop after printing this many readings
        #[arg(long)]
        count: Option<usize>,
    },
    /// Measure gyro and accel biases with the device resting flat (+Z up)
    Calibrate {
        /// Number of inertial samples to average
        #[arg(long, default_value_t = 500)]
        samples: u32,
    },
    /// Manage the stored calibration
    Calibration {
        #[command(subcommand)]
        cmd: CalibrationCommand,
    },
}

pub async fn main_cli(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match args.config.as_ref() {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::load()?,
    };
    log::debug!("Using configuration: {config:?}");

    let cmd = args.cmd.unwrap_or(Commands::Run {
        view: View::Average,
        interval_ms: 1000,
        count: None,
    });

    match cmd {
        Commands::Run {
            view,
            interval_ms,
            count,
        } => {
            let handle = start_engine(&config, args.simulate).await?;
            handle_run(handle, view, interval_ms, count).await?
        }
        Commands::Calibrate { samples } => handle_calibrate(config, args.simulate, samples).await?,
        Commands::Calibration { cmd } => handle_calibration(&config, cmd)?,
    }

    Ok(())
}

/// Open the configured bus, or a simulated one
pub fn open_bus(config: &EngineConfig, simulate: bool) -> Result<Box<dyn Bus>, Box<dyn Error>> {
    if simulate {
        log::info!("Using simulated IMU at {:#04x}", config.address);
        return Ok(Box::new(SimulatedBus::resting(config.address)));
    }
    let bus = LinuxI2cBus::open(&config.bus, config.address)?;
    Ok(Box::new(bus))
}

/// Start polling the IMU described by the given configuration
pub async fn start_engine(
    config: &EngineConfig,
    simulate: bool,
) -> Result<EngineHandle, Box<dyn Error>> {
    let bus = open_bus(config, simulate)?;
    let handle = Engine::start(bus, config).await?;
    Ok(handle)
}
