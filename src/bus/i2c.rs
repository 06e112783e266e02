use std::{path::Path, thread, time::Duration};

use i2cdev::{
    core::I2CDevice,
    linux::{LinuxI2CDevice, LinuxI2CError},
};

use super::{Bus, BusError};

/// Time to let the device settle after each register write
const WRITE_SETTLE: Duration = Duration::from_millis(1);

/// Largest block the SMBus i2c block transfer can carry
const MAX_BLOCK_LEN: usize = 32;

/// [Bus] implementation backed by a Linux i2c-dev character device
/// (e.g. "/dev/i2c-1").
pub struct LinuxI2cBus {
    device: LinuxI2CDevice,
    slave: u8,
}

impl LinuxI2cBus {
    /// Open the given i2c-dev device, initially addressing the given slave
    pub fn open<P: AsRef<Path>>(path: P, slave: u8) -> Result<Self, BusError> {
        let path = path.as_ref();
        log::debug!("Opening I2C bus {path:?} for slave {slave:#04x}");
        let device = LinuxI2CDevice::new(path, slave as u16)
            .map_err(|e| transport_error(slave, 0, e))?;
        Ok(Self { device, slave })
    }

    /// Point the underlying device at the given slave if it is not already
    fn select(&mut self, addr: u8, reg: u8) -> Result<(), BusError> {
        if self.slave == addr {
            return Ok(());
        }
        self.device
            .set_slave_address(addr as u16)
            .map_err(|e| transport_error(addr, reg, e))?;
        self.slave = addr;
        Ok(())
    }
}

impl Bus for LinuxI2cBus {
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8, BusError> {
        self.select(addr, reg)?;
        self.device
            .smbus_read_byte_data(reg)
            .map_err(|e| transport_error(addr, reg, e))
    }

    fn read_word(&mut self, addr: u8, reg: u8) -> Result<i16, BusError> {
        self.select(addr, reg)?;
        let data = self
            .device
            .smbus_read_i2c_block_data(reg, 2)
            .map_err(|e| transport_error(addr, reg, e))?;
        let [high, low] = data.as_slice() else {
            return Err(BusError::Protocol {
                addr,
                reg,
                message: format!("expected 2 bytes, got {}", data.len()),
            });
        };
        Ok(i16::from_be_bytes([*high, *low]))
    }

    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        self.select(addr, reg)?;
        self.device
            .smbus_write_byte_data(reg, value)
            .map_err(|e| transport_error(addr, reg, e))?;
        thread::sleep(WRITE_SETTLE);
        Ok(())
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        if data.len() > MAX_BLOCK_LEN {
            return Err(BusError::Protocol {
                addr,
                reg,
                message: format!("block of {} bytes exceeds {MAX_BLOCK_LEN}", data.len()),
            });
        }
        self.select(addr, reg)?;
        self.device
            .smbus_write_i2c_block_data(reg, data)
            .map_err(|e| transport_error(addr, reg, e))?;
        thread::sleep(WRITE_SETTLE);
        Ok(())
    }
}

fn transport_error(addr: u8, reg: u8, err: LinuxI2CError) -> BusError {
    BusError::Transport {
        addr,
        reg,
        message: err.to_string(),
    }
}
