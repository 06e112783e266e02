//! Scoped register bank transactions. Every access to a bank other than the
//! default one goes through [with_bank], which always re-selects bank 0
//! before returning.
use crate::bus::{Bus, BusError};

use super::{driver::DriverError, registers::REG_BANK_SEL};

/// Register banks of the ICM-20948
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Zero,
    One,
    Two,
    Three,
}

impl Bank {
    /// Value written to REG_BANK_SEL to select this bank
    pub fn select_value(&self) -> u8 {
        let index: u8 = match self {
            Bank::Zero => 0,
            Bank::One => 1,
            Bank::Two => 2,
            Bank::Three => 3,
        };
        index << 4
    }
}

/// Register access to one device while a bank is selected
pub struct Transaction<'a, B: Bus> {
    bus: &'a mut B,
    address: u8,
}

impl<B: Bus> Transaction<'_, B> {
    pub fn read_byte(&mut self, reg: u8) -> Result<u8, BusError> {
        self.bus.read_byte(self.address, reg)
    }

    pub fn read_word(&mut self, reg: u8) -> Result<i16, BusError> {
        self.bus.read_word(self.address, reg)
    }

    pub fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.bus.write_byte(self.address, reg, value)
    }

    /// Read-modify-write the bits selected by `mask`
    pub fn update_bits(&mut self, reg: u8, mask: u8, value: u8) -> Result<(), BusError> {
        let current = self.read_byte(reg)?;
        self.write_byte(reg, (current & !mask) | (value & mask))
    }
}

/// Select `bank`, run `f` against it and restore bank 0, even if `f` fails.
/// A failure to restore the bank is reported unless `f` already failed, in
/// which case the original error wins and the restore failure is logged.
pub fn with_bank<B, T, F>(bus: &mut B, address: u8, bank: Bank, f: F) -> Result<T, DriverError>
where
    B: Bus,
    F: FnOnce(&mut Transaction<'_, B>) -> Result<T, DriverError>,
{
    if bank != Bank::Zero {
        if let Err(e) = bus.write_byte(address, REG_BANK_SEL, bank.select_value()) {
            log::warn!("Unable to select register bank {bank:?}: {e}");
            restore_default_bank(bus, address);
            return Err(e.into());
        }
    }

    let result = {
        let mut transaction = Transaction {
            bus: &mut *bus,
            address,
        };
        f(&mut transaction)
    };

    if bank == Bank::Zero {
        return result;
    }
    let restored = bus.write_byte(address, REG_BANK_SEL, Bank::Zero.select_value());
    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => {
            log::warn!("Unable to restore register bank 0: {e}");
            Err(e.into())
        }
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            log::warn!("Unable to restore register bank 0 after error: {restore_err}");
            Err(e)
        }
    }
}

/// Best effort attempt to get back to bank 0 after a failed bank switch
fn restore_default_bank<B: Bus>(bus: &mut B, address: u8) {
    if let Err(e) = bus.write_byte(address, REG_BANK_SEL, Bank::Zero.select_value()) {
        log::warn!("Unable to restore register bank 0: {e}");
    }
}
