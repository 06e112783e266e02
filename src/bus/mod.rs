//! Register-oriented bus transport used to talk to the IMU.
pub mod i2c;
pub mod sim;

use thiserror::Error;

/// Possible errors for a bus transfer. [BusError::Transport] means the
/// transfer itself failed, [BusError::Protocol] means the transfer could not
/// be expressed on the bus or returned data of the wrong shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("transport failure on {addr:#04x} register {reg:#04x}: {message}")]
    Transport { addr: u8, reg: u8, message: String },
    #[error("invalid transfer on {addr:#04x} register {reg:#04x}: {message}")]
    Protocol { addr: u8, reg: u8, message: String },
}

impl BusError {
    /// Returns true if the error came from the underlying transport
    pub fn is_transport(&self) -> bool {
        matches!(self, BusError::Transport { .. })
    }
}

/// A register-oriented bus such as I2C. Every transfer names the slave
/// address so auxiliary devices (e.g. a magnetometer in bypass mode) can be
/// reached through the same bus.
pub trait Bus: Send + 'static {
    /// Read a single byte from the given register
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8, BusError>;

    /// Read a signed 16-bit value starting at the given register. The high
    /// byte is read from `reg` and the low byte from `reg + 1`.
    fn read_word(&mut self, addr: u8, reg: u8) -> Result<i16, BusError>;

    /// Write a single byte to the given register
    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError>;

    /// Write a block of bytes starting at the given register
    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), BusError>;
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8, BusError> {
        (**self).read_byte(addr, reg)
    }

    fn read_word(&mut self, addr: u8, reg: u8) -> Result<i16, BusError> {
        (**self).read_word(addr, reg)
    }

    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        (**self).write_byte(addr, reg, value)
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        (**self).write_block(addr, reg, data)
    }
}
