use crate::bus::BusError;

/// Raw gyro, accelerometer and temperature counts from one inertial sample
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawInertial {
    pub gyro: [i16; 3],
    pub accel: [i16; 3],
    pub temperature: i16,
}

/// Raw magnetometer payload as read from the four external sensor data
/// words. The first three words carry the axes; the status byte is the low
/// byte of the first word and the overflow byte the high byte of the fourth.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawMag {
    pub words: [i16; 4],
}

impl RawMag {
    pub fn axes(&self) -> [i16; 3] {
        [self.words[0], self.words[1], self.words[2]]
    }

    pub fn status(&self) -> u8 {
        (self.words[0] & 0xFF) as u8
    }

    pub fn overflow(&self) -> u8 {
        ((self.words[3] >> 8) & 0xFF) as u8
    }
}

/// Result of reading every inertial register once. Registers that failed to
/// read keep the value from `previous` and the first failure is kept in
/// `error`.
#[derive(Clone, Debug)]
pub struct InertialSample {
    pub raw: RawInertial,
    pub error: Option<BusError>,
}

/// Result of one magnetometer read sequence
#[derive(Clone, Debug)]
pub enum MagSample {
    /// A complete frame, possibly with values reused from the previous frame
    /// where individual reads failed
    Frame { raw: RawMag, error: Option<BusError> },
    /// The frame was torn or overflowed and must not be used
    Invalid(RawMag),
}
