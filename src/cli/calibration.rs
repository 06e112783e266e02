use std::error::Error;

use clap::Subcommand;
use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};

use crate::calibration::{CalibrationRecord, CalibrationStore};
use crate::config::EngineConfig;

use super::start_engine;

#[derive(Subcommand, Debug, Clone)]
pub enum CalibrationCommand {
    /// Display the stored calibration
    Show,
    /// Replace the stored calibration with the default (identity) calibration
    Reset,
}

#[derive(Tabled)]
struct AxisRow {
    #[tabled(rename = "Sensor")]
    sensor: String,
    #[tabled(rename = "X")]
    x: f64,
    #[tabled(rename = "Y")]
    y: f64,
    #[tabled(rename = "Z")]
    z: f64,
}

impl AxisRow {
    fn new(sensor: &str, values: [f64; 3]) -> Self {
        let [x, y, z] = values;
        Self {
            sensor: sensor.to_string(),
            x,
            y,
            z,
        }
    }
}

/// Handle the calibration subcommands
pub fn handle_calibration(
    config: &EngineConfig,
    cmd: CalibrationCommand,
) -> Result<(), Box<dyn Error>> {
    let store = CalibrationStore::new(&config.calibration_path);
    match cmd {
        CalibrationCommand::Show => {
            let record = store.load()?;
            print_record(&store, &record);
        }
        CalibrationCommand::Reset => {
            let record = CalibrationRecord::default();
            store.save(&record)?;
            print_record(&store, &record);
        }
    }

    Ok(())
}

/// Average `samples` inertial ticks with the device at rest and store biases
/// that make the same conditions read as zero rotation and +1 g on Z
pub async fn handle_calibrate(
    mut config: EngineConfig,
    simulate: bool,
    samples: u32,
) -> Result<(), Box<dyn Error>> {
    if config.apply_hardware_offsets {
        log::warn!("Ignoring hardware offsets while calibrating");
        config.apply_hardware_offsets = false;
    }

    let store = CalibrationStore::new(&config.calibration_path);
    let mut record = store.load_or_default();

    let handle = start_engine(&config, simulate).await?;
    let client = handle.client();
    let period = crate::drivers::icm20948::info::sample_period(config.sample_rate);
    println!("Keep the device still and flat. Sampling {samples} readings...");
    tokio::time::sleep(period * samples.max(1)).await;
    let average = client.average().await;
    handle.stop().await?;

    let average = average?;
    if let Some(error) = average.error.as_ref() {
        return Err(format!("Unable to calibrate: {error}").into());
    }
    log::info!("Calibrating from {} samples", average.samples);

    record.apply_stationary(
        &average,
        config.gyro_sensitivity.scale(),
        config.accel_sensitivity.scale(),
    );
    store.save(&record)?;
    print_record(&store, &record);

    Ok(())
}

fn print_record(store: &CalibrationStore, record: &CalibrationRecord) {
    let rows = vec![
        AxisRow::new("Gyro bias", record.gyro_bias),
        AxisRow::new("Accel bias", record.accel_bias),
        AxisRow::new("Mag bias", record.mag_bias),
        AxisRow::new("Mag rescale X", record.mag_rescale.x.into()),
        AxisRow::new("Mag rescale Y", record.mag_rescale.y.into()),
        AxisRow::new("Mag rescale Z", record.mag_rescale.z.into()),
    ];
    let mut table = Table::new(rows);
    table
        .with(Style::modern_rounded())
        .with(Panel::header(format!("Calibration ({})", store.path().display())));
    println!("{table}");
}
