use std::error::Error;
use std::time::Duration;

use clap::ValueEnum;

use crate::engine::{client::EngineClient, EngineHandle};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Latest instantaneous reading
    Current,
    /// Average since the previous print
    Average,
    /// Every buffered reading since the previous print
    History,
}

/// Print readings until interrupted or `count` readings were printed, then
/// stop the engine
pub async fn handle_run(
    handle: EngineHandle,
    view: View,
    interval_ms: u64,
    count: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let client = handle.client();
    let period = Duration::from_millis(interval_ms.max(1));

    let result = tokio::select! {
        result = print_readings(&client, view, period, count) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, stopping");
            Ok(())
        }
    };

    handle.stop().await?;
    result
}

async fn print_readings(
    client: &EngineClient,
    view: View,
    period: Duration,
    count: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let mut interval = tokio::time::interval(period);
    let mut printed = 0;
    loop {
        interval.tick().await;
        match view {
            View::Current => {
                println!("{}", client.current().await?);
                printed += 1;
            }
            View::Average => {
                println!("{}", client.average().await?);
                printed += 1;
            }
            View::History => {
                let readings = client.drain_history().await?;
                log::debug!("Drained {} buffered readings", readings.len());
                for reading in readings {
                    println!("{reading}");
                    printed += 1;
                    if count.is_some_and(|count| printed >= count) {
                        break;
                    }
                }
            }
        }

        if count.is_some_and(|count| printed >= count) {
            return Ok(());
        }
    }
}
