use std::error::Error;

use tokio::time::Instant;

use crate::{
    drivers::icm20948::event::{RawInertial, RawMag},
    engine::accumulator::Accumulator,
};

#[tokio::test(start_paused = true)]
async fn test_counters_saturate() -> Result<(), Box<dyn Error>> {
    let mut accumulator = Accumulator::new(Instant::now());
    accumulator.samples = u32::MAX;
    accumulator.mag_samples = u32::MAX;

    let mag = RawMag {
        words: [3, 0, 0, 0],
    };
    accumulator.add_inertial(&RawInertial::default(), &mag);
    accumulator.add_mag(&mag);

    assert_eq!(accumulator.samples(), u32::MAX);
    assert_eq!(accumulator.mag_samples(), u32::MAX);
    assert_eq!(accumulator.mag_sum(), [6, 0, 0]);
    Ok(())
}
