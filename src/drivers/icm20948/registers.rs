//! ICM-20948 register map and bit fields. Registers share addresses across
//! four banks selected through [REG_BANK_SEL].

/// Default I2C address of the ICM-20948 (AD0 low)
pub const ICM20948_ADDR: u8 = 0x68;

/// Expected WHO_AM_I value
pub const WHO_AM_I_VALUE: u8 = 0xEA;

/// Bank select register, present in every bank
pub const REG_BANK_SEL: u8 = 0x7F;

// Bank 0
pub const WHO_AM_I: u8 = 0x00;
pub const USER_CTRL: u8 = 0x03;
pub const PWR_MGMT_1: u8 = 0x06;
pub const INT_PIN_CFG: u8 = 0x0F;
pub const ACCEL_XOUT_H: u8 = 0x2D;
pub const ACCEL_YOUT_H: u8 = 0x2F;
pub const ACCEL_ZOUT_H: u8 = 0x31;
pub const GYRO_XOUT_H: u8 = 0x33;
pub const GYRO_YOUT_H: u8 = 0x35;
pub const GYRO_ZOUT_H: u8 = 0x37;
pub const TEMP_OUT_H: u8 = 0x39;
pub const EXT_SLV_SENS_DATA_00: u8 = 0x3B;
pub const EXT_SLV_SENS_DATA_02: u8 = 0x3D;
pub const EXT_SLV_SENS_DATA_04: u8 = 0x3F;
pub const EXT_SLV_SENS_DATA_06: u8 = 0x41;

// Bank 1
pub const XA_OFFS_H: u8 = 0x14;
pub const YA_OFFS_H: u8 = 0x17;
pub const ZA_OFFS_H: u8 = 0x1A;

// Bank 2
pub const GYRO_SMPLRT_DIV: u8 = 0x00;
pub const GYRO_CONFIG_1: u8 = 0x01;
pub const XG_OFFS_USRH: u8 = 0x03;
pub const YG_OFFS_USRH: u8 = 0x05;
pub const ZG_OFFS_USRH: u8 = 0x07;
pub const ACCEL_SMPLRT_DIV_2: u8 = 0x11;
pub const ACCEL_CONFIG: u8 = 0x14;

// Bank 3
pub const I2C_MST_CTRL: u8 = 0x01;
pub const I2C_MST_DELAY_CTRL: u8 = 0x02;
pub const I2C_SLV0_ADDR: u8 = 0x03;
pub const I2C_SLV0_REG: u8 = 0x04;
pub const I2C_SLV0_CTRL: u8 = 0x05;
pub const I2C_SLV1_ADDR: u8 = 0x07;
pub const I2C_SLV1_REG: u8 = 0x08;
pub const I2C_SLV1_CTRL: u8 = 0x09;
pub const I2C_SLV1_DO: u8 = 0x0A;
pub const I2C_SLV4_CTRL: u8 = 0x15;

// PWR_MGMT_1
pub const BIT_H_RESET: u8 = 0x80;
pub const BIT_CLKSEL_AUTO: u8 = 0x01;

// USER_CTRL
pub const BIT_I2C_MST_EN: u8 = 0x20;

// INT_PIN_CFG
pub const BIT_BYPASS_EN: u8 = 0x02;

// I2C_SLVx_ADDR / I2C_SLVx_CTRL
pub const BIT_I2C_READ: u8 = 0x80;
pub const BIT_SLAVE_EN: u8 = 0x80;

// I2C_MST_CTRL: 345.6 kHz master clock, stop between reads
pub const I2C_MST_CLK_400KHZ: u8 = 0x07;

// GYRO_CONFIG_1 / ACCEL_CONFIG share the same layout:
// [5:3] DLPF config, [2:1] full scale select, [0] FCHOICE
pub const BIT_FCHOICE: u8 = 0x01;
pub const MASK_FS_SEL: u8 = 0x06;
pub const MASK_DLPF_CFG: u8 = 0x38;

pub const BITS_FS_250DPS: u8 = 0x00;
pub const BITS_FS_500DPS: u8 = 0x02;
pub const BITS_FS_1000DPS: u8 = 0x04;
pub const BITS_FS_2000DPS: u8 = 0x06;

pub const BITS_FS_2G: u8 = 0x00;
pub const BITS_FS_4G: u8 = 0x02;
pub const BITS_FS_8G: u8 = 0x04;
pub const BITS_FS_16G: u8 = 0x06;

pub const BITS_DLPF_GYRO_CFG_197HZ: u8 = 0 << 3;
pub const BITS_DLPF_GYRO_CFG_152HZ: u8 = 1 << 3;
pub const BITS_DLPF_GYRO_CFG_120HZ: u8 = 2 << 3;
pub const BITS_DLPF_GYRO_CFG_51HZ: u8 = 3 << 3;
pub const BITS_DLPF_GYRO_CFG_24HZ: u8 = 4 << 3;
pub const BITS_DLPF_GYRO_CFG_12HZ: u8 = 5 << 3;
pub const BITS_DLPF_GYRO_CFG_6HZ: u8 = 6 << 3;

pub const BITS_DLPF_ACCEL_CFG_246HZ: u8 = 1 << 3;
pub const BITS_DLPF_ACCEL_CFG_111HZ: u8 = 2 << 3;
pub const BITS_DLPF_ACCEL_CFG_50HZ: u8 = 3 << 3;
pub const BITS_DLPF_ACCEL_CFG_24HZ: u8 = 4 << 3;
pub const BITS_DLPF_ACCEL_CFG_12HZ: u8 = 5 << 3;
pub const BITS_DLPF_ACCEL_CFG_5HZ: u8 = 6 << 3;

// Auxiliary magnetometer (AK8963 compatible register layout)
pub const AK8963_I2C_ADDR: u8 = 0x0C;
pub const AK8963_ST1: u8 = 0x02;
pub const AK8963_HXL: u8 = 0x03;
pub const AK8963_CNTL1: u8 = 0x0A;
pub const AK8963_ASAX: u8 = 0x10;
pub const AK8963_ASAY: u8 = 0x11;
pub const AK8963_ASAZ: u8 = 0x12;

pub const AKM_POWER_DOWN: u8 = 0x00;
pub const AKM_SINGLE_MEASUREMENT: u8 = 0x01;
pub const AKM_FUSE_ROM_ACCESS: u8 = 0x0F;

/// Status byte: a new measurement is available
pub const AKM_DATA_READY: u8 = 0x01;
/// Status byte: a measurement was skipped before being read
pub const AKM_DATA_OVERRUN: u8 = 0x02;
/// Payload high byte: magnetic sensor overflow
pub const AKM_OVERFLOW: u8 = 0x08;

/// Maximum rate the magnetometer can be sampled at, in Hz
pub const AK8963_MAX_SAMPLE_RATE: u32 = 100;

/// Bytes read from the magnetometer each sample (HXL..ST2)
pub const AK8963_READ_LEN: u8 = 7;
