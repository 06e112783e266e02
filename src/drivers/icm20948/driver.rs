use std::{thread, time::Duration};

use thiserror::Error;

use crate::bus::{Bus, BusError};

use super::{
    bank::{with_bank, Bank},
    event::{InertialSample, MagSample, RawInertial, RawMag},
    info::{
        accel_lpf, check_sample_rate, gyro_lpf, mag_sample_rate, sample_rate_divider,
        AccelSensitivity, ConfigurationError, DeviceState, GyroSensitivity, MAG_SCALE,
    },
    registers::*,
};

/// Time the device needs to come back after a reset
const RESET_DELAY: Duration = Duration::from_millis(100);
/// Time for the auxiliary I2C interface to settle after a mode change
const AUX_SETTLE: Duration = Duration::from_millis(3);
/// Time for the magnetometer to switch modes
const MAG_MODE_DELAY: Duration = Duration::from_millis(1);
/// Time for the magnetometer to become ready after master setup
const MAG_READY_DELAY: Duration = Duration::from_millis(100);

/// Registers read on every inertial sample, in [RawInertial] order
const INERTIAL_REGISTERS: [u8; 7] = [
    GYRO_XOUT_H,
    GYRO_YOUT_H,
    GYRO_ZOUT_H,
    ACCEL_XOUT_H,
    ACCEL_YOUT_H,
    ACCEL_ZOUT_H,
    TEMP_OUT_H,
];

/// External sensor data words holding the magnetometer payload
const MAG_REGISTERS: [u8; 4] = [
    EXT_SLV_SENS_DATA_00,
    EXT_SLV_SENS_DATA_02,
    EXT_SLV_SENS_DATA_04,
    EXT_SLV_SENS_DATA_06,
];

/// Possible errors from configuring or reading the device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("device error: {0}")]
    Bus(#[from] BusError),
}

/// Errors that abort bringing up the device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartupError {
    #[error("invalid startup configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("failed to {step}: {source}")]
    Device {
        step: &'static str,
        source: DriverError,
    },
}

/// Settings applied once when the device is brought up
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub gyro: GyroSensitivity,
    pub accel: AccelSensitivity,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub enable_mag: bool,
    pub apply_hw_offsets: bool,
}

/// Factory offsets read from the device, normalized to the configured ranges
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareOffsets {
    pub gyro: [f64; 3],
    pub accel: [f64; 3],
}

/// Driver for an ICM-20948 on a register bus
pub struct Driver<B: Bus> {
    bus: B,
    address: u8,
    state: DeviceState,
}

impl<B: Bus> Driver<B> {
    pub fn new(bus: B, address: u8) -> Self {
        log::debug!("Creating ICM-20948 driver instance at {address:#04x}");
        Self {
            bus,
            address,
            state: DeviceState::default(),
        }
    }

    /// Returns the current device configuration
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Bring the device up: reset, set ranges, filters and rates, and set up
    /// the magnetometer if requested. Returns the factory offsets when
    /// `apply_hw_offsets` is set.
    pub fn initialize(
        &mut self,
        settings: &DeviceSettings,
    ) -> Result<Option<HardwareOffsets>, StartupError> {
        let rate = check_sample_rate(settings.sample_rate)?;
        log::debug!("Initializing ICM-20948 with {settings:?}");

        match self.who_am_i() {
            Ok(WHO_AM_I_VALUE) => log::debug!("Found ICM-20948"),
            Ok(id) => log::warn!("Unexpected WHO_AM_I value {id:#04x}, continuing anyway"),
            Err(e) => log::warn!("Unable to read WHO_AM_I: {e}"),
        }

        self.reset().map_err(step("reset device"))?;
        self.wake().map_err(step("wake device"))?;

        self.set_gyro_sensitivity(settings.gyro)
            .map_err(step("set gyro sensitivity"))?;
        self.set_accel_sensitivity(settings.accel)
            .map_err(step("set accel sensitivity"))?;

        // Filter at half the sample rate
        self.set_gyro_lpf(rate / 2).map_err(step("set gyro LPF"))?;
        self.set_accel_lpf(rate / 2).map_err(step("set accel LPF"))?;

        let divider = sample_rate_divider(rate);
        self.set_gyro_sample_rate(divider)
            .map_err(step("set gyro sample rate"))?;
        self.set_accel_sample_rate(divider)
            .map_err(step("set accel sample rate"))?;
        self.state.sample_rate = rate;

        if settings.enable_mag {
            self.read_mag_calibration()
                .map_err(step("read magnetometer calibration"))?;
            self.configure_mag_master()
                .map_err(step("set up magnetometer"))?;
            self.state.mag_enabled = true;
        }

        if !settings.apply_hw_offsets {
            return Ok(None);
        }
        let accel = self
            .read_accel_bias(settings.accel)
            .map_err(step("read accel offsets"))?;
        let gyro = self
            .read_gyro_bias(settings.gyro)
            .map_err(step("read gyro offsets"))?;

        Ok(Some(HardwareOffsets { gyro, accel }))
    }

    /// Read the WHO_AM_I register
    pub fn who_am_i(&mut self) -> Result<u8, DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Zero, |tx| {
            Ok(tx.read_byte(WHO_AM_I)?)
        })
    }

    /// Reset all registers to their defaults and wait for the device
    pub fn reset(&mut self) -> Result<(), DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Zero, |tx| {
            Ok(tx.write_byte(PWR_MGMT_1, BIT_H_RESET)?)
        })?;
        thread::sleep(RESET_DELAY);
        Ok(())
    }

    /// Wake the device from sleep, selecting the best available clock
    pub fn wake(&mut self) -> Result<(), DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Zero, |tx| {
            Ok(tx.write_byte(PWR_MGMT_1, BIT_CLKSEL_AUTO)?)
        })
    }

    /// Set the gyro full scale range. The scale factor only changes once the
    /// device accepted the new range.
    pub fn set_gyro_sensitivity(&mut self, sensitivity: GyroSensitivity) -> Result<(), DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Two, |tx| {
            Ok(tx.update_bits(GYRO_CONFIG_1, MASK_FS_SEL, sensitivity.bits())?)
        })?;
        self.state.gyro_scale = sensitivity.scale();
        log::debug!("Set gyro sensitivity to {sensitivity}");
        Ok(())
    }

    /// Set the accelerometer full scale range
    pub fn set_accel_sensitivity(
        &mut self,
        sensitivity: AccelSensitivity,
    ) -> Result<(), DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Two, |tx| {
            Ok(tx.update_bits(ACCEL_CONFIG, MASK_FS_SEL, sensitivity.bits())?)
        })?;
        self.state.accel_scale = sensitivity.scale();
        log::debug!("Set accel sensitivity to {sensitivity}");
        Ok(())
    }

    /// Set the gyro low pass filter to the highest supported cutoff not above
    /// `rate_hz`. Returns the selected cutoff.
    pub fn set_gyro_lpf(&mut self, rate_hz: u32) -> Result<u32, DriverError> {
        let (cutoff, bits) = gyro_lpf(rate_hz);
        with_bank(&mut self.bus, self.address, Bank::Two, |tx| {
            Ok(tx.update_bits(
                GYRO_CONFIG_1,
                MASK_DLPF_CFG | BIT_FCHOICE,
                bits | BIT_FCHOICE,
            )?)
        })?;
        log::debug!("Set gyro LPF to {cutoff} Hz (requested {rate_hz} Hz)");
        Ok(cutoff)
    }

    /// Set the accelerometer low pass filter. Returns the selected cutoff.
    pub fn set_accel_lpf(&mut self, rate_hz: u32) -> Result<u32, DriverError> {
        let (cutoff, bits) = accel_lpf(rate_hz);
        with_bank(&mut self.bus, self.address, Bank::Two, |tx| {
            Ok(tx.update_bits(
                ACCEL_CONFIG,
                MASK_DLPF_CFG | BIT_FCHOICE,
                bits | BIT_FCHOICE,
            )?)
        })?;
        log::debug!("Set accel LPF to {cutoff} Hz (requested {rate_hz} Hz)");
        Ok(cutoff)
    }

    /// Write the gyro sample rate divider
    pub fn set_gyro_sample_rate(&mut self, divider: u8) -> Result<(), DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Two, |tx| {
            Ok(tx.write_byte(GYRO_SMPLRT_DIV, divider)?)
        })
    }

    /// Write the accelerometer sample rate divider
    pub fn set_accel_sample_rate(&mut self, divider: u8) -> Result<(), DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Two, |tx| {
            Ok(tx.write_byte(ACCEL_SMPLRT_DIV_2, divider)?)
        })
    }

    /// Read the factory accelerometer offsets, normalized to raw counts at
    /// the given range
    pub fn read_accel_bias(
        &mut self,
        sensitivity: AccelSensitivity,
    ) -> Result<[f64; 3], DriverError> {
        let raw = with_bank(&mut self.bus, self.address, Bank::One, |tx| {
            Ok([
                tx.read_word(XA_OFFS_H)?,
                tx.read_word(YA_OFFS_H)?,
                tx.read_word(ZA_OFFS_H)?,
            ])
        })?;
        Ok(raw.map(|value| sensitivity.normalize_offset(value)))
    }

    /// Read the factory gyro offsets, normalized to raw counts at the given
    /// range
    pub fn read_gyro_bias(&mut self, sensitivity: GyroSensitivity) -> Result<[f64; 3], DriverError> {
        let raw = with_bank(&mut self.bus, self.address, Bank::Two, |tx| {
            Ok([
                tx.read_word(XG_OFFS_USRH)?,
                tx.read_word(YG_OFFS_USRH)?,
                tx.read_word(ZG_OFFS_USRH)?,
            ])
        })?;
        Ok(raw.map(|value| sensitivity.normalize_offset(value)))
    }

    /// Read the magnetometer fuse ROM sensitivity adjustment through bypass
    /// mode. Bypass is turned off again even if reading the ROM fails.
    pub fn read_mag_calibration(&mut self) -> Result<[f64; 3], DriverError> {
        let user_ctrl = with_bank(&mut self.bus, self.address, Bank::Zero, |tx| {
            Ok(tx.read_byte(USER_CTRL)?)
        })?;

        let result = self.read_fuse_rom_in_bypass(user_ctrl);
        let restored = self.restore_aux_master(user_ctrl);
        let sensitivity = match (result, restored) {
            (Ok(sensitivity), Ok(())) => sensitivity,
            (Err(e), Ok(())) => return Err(e),
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), Err(restore_err)) => {
                log::warn!("Unable to leave bypass mode after error: {restore_err}");
                return Err(e);
            }
        };

        log::debug!("Read magnetometer sensitivity: {sensitivity:?}");
        self.state.mag_sensitivity = sensitivity;
        Ok(sensitivity)
    }

    fn read_fuse_rom_in_bypass(&mut self, user_ctrl: u8) -> Result<[f64; 3], DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Zero, |tx| {
            tx.write_byte(USER_CTRL, user_ctrl & !BIT_I2C_MST_EN)?;
            thread::sleep(AUX_SETTLE);
            Ok(tx.write_byte(INT_PIN_CFG, BIT_BYPASS_EN)?)
        })?;

        // The magnetometer now sits directly on the bus
        let mag = AK8963_I2C_ADDR;
        self.bus.write_byte(mag, AK8963_CNTL1, AKM_POWER_DOWN)?;
        thread::sleep(MAG_MODE_DELAY);
        self.bus.write_byte(mag, AK8963_CNTL1, AKM_FUSE_ROM_ACCESS)?;
        thread::sleep(MAG_MODE_DELAY);
        let asa = [
            self.bus.read_byte(mag, AK8963_ASAX)?,
            self.bus.read_byte(mag, AK8963_ASAY)?,
            self.bus.read_byte(mag, AK8963_ASAZ)?,
        ];
        self.bus.write_byte(mag, AK8963_CNTL1, AKM_POWER_DOWN)?;
        thread::sleep(MAG_MODE_DELAY);

        Ok(asa.map(|value| (value as f64 + 128.0) / 256.0 * MAG_SCALE))
    }

    /// Leave bypass mode and put USER_CTRL back the way it was. Both writes
    /// are attempted; the first failure is returned.
    fn restore_aux_master(&mut self, user_ctrl: u8) -> Result<(), DriverError> {
        with_bank(&mut self.bus, self.address, Bank::Zero, |tx| {
            let bypass = tx.write_byte(INT_PIN_CFG, 0x00);
            let master = tx.write_byte(USER_CTRL, user_ctrl);
            thread::sleep(AUX_SETTLE);
            bypass?;
            Ok(master?)
        })
    }

    /// Set up the internal I2C master so the magnetometer is sampled along
    /// with every gyro/accel sample
    pub fn configure_mag_master(&mut self) -> Result<(), DriverError> {
        let rate = self.state.sample_rate;
        let mag_divider = if rate <= mag_sample_rate(rate) {
            0
        } else {
            (rate / mag_sample_rate(rate) - 1) as u8
        };

        with_bank(&mut self.bus, self.address, Bank::Zero, |tx| {
            Ok(tx.update_bits(USER_CTRL, BIT_I2C_MST_EN, BIT_I2C_MST_EN)?)
        })?;
        with_bank(&mut self.bus, self.address, Bank::Three, |tx| {
            tx.write_byte(I2C_MST_CTRL, I2C_MST_CLK_400KHZ)?;
            // Slave 0 reads the measurement block
            tx.write_byte(I2C_SLV0_ADDR, BIT_I2C_READ | AK8963_I2C_ADDR)?;
            tx.write_byte(I2C_SLV0_REG, AK8963_ST1)?;
            tx.write_byte(I2C_SLV0_CTRL, BIT_SLAVE_EN | (AK8963_READ_LEN + 1))?;
            // Slave 1 triggers a single measurement each sample
            tx.write_byte(I2C_SLV1_ADDR, AK8963_I2C_ADDR)?;
            tx.write_byte(I2C_SLV1_REG, AK8963_CNTL1)?;
            tx.write_byte(I2C_SLV1_CTRL, BIT_SLAVE_EN | 1)?;
            tx.write_byte(I2C_SLV1_DO, AKM_SINGLE_MEASUREMENT)?;
            tx.write_byte(I2C_MST_DELAY_CTRL, 0x03)?;
            Ok(tx.write_byte(I2C_SLV4_CTRL, mag_divider)?)
        })?;

        thread::sleep(MAG_READY_DELAY);
        log::debug!("Magnetometer sampling set up with divider {mag_divider}");
        Ok(())
    }

    /// Read every inertial register once. A register that fails to read keeps
    /// its value from `previous`.
    pub fn read_inertial(&mut self, previous: &RawInertial) -> InertialSample {
        let mut values = [
            previous.gyro[0],
            previous.gyro[1],
            previous.gyro[2],
            previous.accel[0],
            previous.accel[1],
            previous.accel[2],
            previous.temperature,
        ];
        let mut error = None;
        for (value, reg) in values.iter_mut().zip(INERTIAL_REGISTERS) {
            match self.bus.read_word(self.address, reg) {
                Ok(v) => *value = v,
                Err(e) => {
                    log::warn!("Error reading gyro/accel register {reg:#04x}: {e}");
                    error.get_or_insert(e);
                }
            }
        }

        let [gx, gy, gz, ax, ay, az, temperature] = values;
        InertialSample {
            raw: RawInertial {
                gyro: [gx, gy, gz],
                accel: [ax, ay, az],
                temperature,
            },
            error,
        }
    }

    /// Trigger an auxiliary read of the magnetometer and validate the frame.
    /// Words that fail to read keep their value from `previous`.
    pub fn read_mag(&mut self, previous: &RawMag) -> MagSample {
        let mut error = None;
        let setup = with_bank(&mut self.bus, self.address, Bank::Three, |tx| {
            tx.write_byte(I2C_SLV0_ADDR, BIT_I2C_READ | AK8963_I2C_ADDR)?;
            tx.write_byte(I2C_SLV0_REG, AK8963_HXL)?;
            Ok(tx.write_byte(I2C_SLV0_CTRL, BIT_SLAVE_EN | AK8963_READ_LEN)?)
        });
        if let Err(e) = setup {
            log::warn!("Unable to set up magnetometer read: {e}");
            if let DriverError::Bus(e) = e {
                error = Some(e);
            }
        }

        let mut raw = *previous;
        for (word, reg) in raw.words.iter_mut().zip(MAG_REGISTERS) {
            match self.bus.read_word(self.address, reg) {
                Ok(v) => *word = v,
                Err(e) => {
                    log::warn!("Error reading magnetometer register {reg:#04x}: {e}");
                    error.get_or_insert(e);
                }
            }
        }

        let status = raw.status();
        if status & AKM_DATA_READY == 0 && status & AKM_DATA_OVERRUN != 0 {
            log::debug!("Magnetometer data not ready or overrun: status {status:#04x}");
            return MagSample::Invalid(raw);
        }
        if raw.overflow() & AKM_OVERFLOW != 0 {
            log::debug!("Magnetometer data overflow: {:#04x}", raw.overflow());
            return MagSample::Invalid(raw);
        }

        MagSample::Frame { raw, error }
    }
}

/// Wrap a driver error with the startup step it happened in
fn step(step: &'static str) -> impl Fn(DriverError) -> StartupError {
    move |source| StartupError::Device { step, source }
}
