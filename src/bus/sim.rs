//! In-memory register file that behaves like an ICM-20948 on a bus. Used to
//! run the engine without hardware and to observe bus traffic in tests.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::drivers::icm20948::registers::{
    AK8963_ASAX, AK8963_ASAY, AK8963_ASAZ, AK8963_I2C_ADDR, ACCEL_ZOUT_H, EXT_SLV_SENS_DATA_00,
    REG_BANK_SEL, WHO_AM_I, WHO_AM_I_VALUE,
};

use super::{Bus, BusError};

/// A single register write observed on the simulated bus
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterWrite {
    pub addr: u8,
    pub bank: u8,
    pub reg: u8,
    pub value: u8,
}

#[derive(Debug, Default)]
struct SimState {
    bank: u8,
    registers: HashMap<(u8, u8, u8), u8>,
    failing: HashSet<(u8, u8, u8)>,
    fail_all: bool,
    reads: usize,
    writes: Vec<RegisterWrite>,
}

/// Simulated bus. Clones share the same register file so a test can keep a
/// handle while the engine owns another.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    primary: u8,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    /// Create a new simulated bus with a device at the given primary address
    pub fn new(primary: u8) -> Self {
        let bus = Self {
            primary,
            state: Arc::new(Mutex::new(SimState::default())),
        };
        bus.set_register(0, WHO_AM_I, WHO_AM_I_VALUE);
        bus
    }

    /// Create a simulated device lying flat and still: +1 g on Z at the
    /// 4 g range, nominal magnetometer fuse ROM and a valid magnetometer frame.
    pub fn resting(primary: u8) -> Self {
        let bus = Self::new(primary);
        bus.set_word(0, ACCEL_ZOUT_H, 8192);
        for reg in [AK8963_ASAX, AK8963_ASAY, AK8963_ASAZ] {
            bus.set_aux_register(AK8963_I2C_ADDR, reg, 128);
        }
        bus.set_word(0, EXT_SLV_SENS_DATA_00, 0x0101);
        bus
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self, state: &SimState, addr: u8, reg: u8) -> (u8, u8, u8) {
        if addr == self.primary {
            (addr, state.bank, reg)
        } else {
            (addr, 0, reg)
        }
    }

    /// Set a register of the primary device in the given bank
    pub fn set_register(&self, bank: u8, reg: u8, value: u8) {
        self.lock()
            .registers
            .insert((self.primary, bank, reg), value);
    }

    /// Returns the value of a register of the primary device
    pub fn register(&self, bank: u8, reg: u8) -> u8 {
        self.lock()
            .registers
            .get(&(self.primary, bank, reg))
            .copied()
            .unwrap_or_default()
    }

    /// Set a big-endian 16-bit value spanning `reg` and `reg + 1`
    pub fn set_word(&self, bank: u8, reg: u8, value: i16) {
        let [high, low] = value.to_be_bytes();
        self.set_register(bank, reg, high);
        self.set_register(bank, reg.wrapping_add(1), low);
    }

    /// Set a register of an auxiliary device on the bus
    pub fn set_aux_register(&self, addr: u8, reg: u8, value: u8) {
        self.lock().registers.insert((addr, 0, reg), value);
    }

    /// Make every transfer touching the given primary register fail
    pub fn fail_register(&self, bank: u8, reg: u8) {
        self.lock().failing.insert((self.primary, bank, reg));
    }

    /// Make every transfer on the bus fail (or succeed again)
    pub fn fail_all(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing.clear();
        state.fail_all = false;
    }

    /// Returns the currently selected register bank
    pub fn bank(&self) -> u8 {
        self.lock().bank
    }

    /// Returns the number of read transfers performed so far
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Returns all writes performed so far
    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.lock().writes.clone()
    }

    fn check(&self, state: &SimState, addr: u8, reg: u8) -> Result<(), BusError> {
        if state.fail_all || state.failing.contains(&self.key(state, addr, reg)) {
            return Err(BusError::Transport {
                addr,
                reg,
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    fn write(&self, state: &mut SimState, addr: u8, reg: u8, value: u8) {
        let key = self.key(state, addr, reg);
        state.writes.push(RegisterWrite {
            addr,
            bank: key.1,
            reg,
            value,
        });
        state.registers.insert(key, value);
        if addr == self.primary && reg == REG_BANK_SEL {
            state.bank = (value >> 4) & 0x03;
        }
    }
}

impl Bus for SimulatedBus {
    fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8, BusError> {
        let mut state = self.lock();
        state.reads += 1;
        self.check(&state, addr, reg)?;
        let key = self.key(&state, addr, reg);
        Ok(state.registers.get(&key).copied().unwrap_or_default())
    }

    fn read_word(&mut self, addr: u8, reg: u8) -> Result<i16, BusError> {
        let mut state = self.lock();
        state.reads += 1;
        self.check(&state, addr, reg)?;
        let high = self.key(&state, addr, reg);
        let low = self.key(&state, addr, reg.wrapping_add(1));
        let high = state.registers.get(&high).copied().unwrap_or_default();
        let low = state.registers.get(&low).copied().unwrap_or_default();
        Ok(i16::from_be_bytes([high, low]))
    }

    fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        let mut state = self.lock();
        self.check(&state, addr, reg)?;
        self.write(&mut state, addr, reg, value);
        Ok(())
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.lock();
        self.check(&state, addr, reg)?;
        for (offset, value) in data.iter().enumerate() {
            self.write(&mut state, addr, reg.wrapping_add(offset as u8), *value);
        }
        Ok(())
    }
}
