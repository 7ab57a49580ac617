//! LIS2DH12 accelerometer on the I2C bus.
//!
//! Blocking register driver: identity check at bring-up, ODR configuration
//! matching the streaming rate, and a 6-byte burst read per sample. Bus
//! errors during sampling surface as a skipped sample, never as a fault.

use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;

use logger_core::devices::MotionSensor;

const ADDRESS: u8 = 0x19;
const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL1: u8 = 0x20;
const REG_CTRL4: u8 = 0x23;
const REG_OUT_X_L: u8 = 0x28;
const AUTO_INCREMENT: u8 = 0x80;
const DEVICE_ID: u8 = 0x33;

/// Bring-up failures reported by the driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccelError {
    /// I2C transaction failed.
    Bus,
    /// WHO_AM_I returned an unexpected identity.
    WrongDevice { id: u8 },
}

/// LIS2DH12 driver handle.
pub struct Lis2dh<'d> {
    i2c: I2c<'d, Blocking>,
}

impl<'d> Lis2dh<'d> {
    /// Verifies the device identity and configures it for streaming.
    pub fn new(i2c: I2c<'d, Blocking>, rate_hz: u16) -> Result<Self, AccelError> {
        let mut accel = Self { i2c };
        let id = accel.read_register(REG_WHO_AM_I)?;
        if id != DEVICE_ID {
            return Err(AccelError::WrongDevice { id });
        }
        accel.configure(rate_hz)?;
        Ok(accel)
    }

    fn configure(&mut self, rate_hz: u16) -> Result<(), AccelError> {
        let odr: u8 = match rate_hz {
            0..=1 => 0b0001,
            2..=10 => 0b0010,
            11..=25 => 0b0011,
            26..=50 => 0b0100,
            51..=100 => 0b0101,
            101..=200 => 0b0110,
            _ => 0b0111,
        };
        // ODR in the high nibble, all three axes enabled.
        self.write_register(REG_CTRL1, (odr << 4) | 0b0111)?;
        // Block data update, +/-2 g, high-resolution mode.
        self.write_register(REG_CTRL4, 0x88)
    }

    fn read_register(&mut self, register: u8) -> Result<u8, AccelError> {
        let mut value = [0u8; 1];
        self.i2c
            .blocking_write_read(ADDRESS, &[register], &mut value)
            .map_err(|_| AccelError::Bus)?;
        Ok(value[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), AccelError> {
        self.i2c
            .blocking_write(ADDRESS, &[register, value])
            .map_err(|_| AccelError::Bus)
    }
}

impl MotionSensor for Lis2dh<'_> {
    fn sample(&mut self) -> Option<[i16; 3]> {
        let mut raw = [0u8; 6];
        self.i2c
            .blocking_write_read(ADDRESS, &[REG_OUT_X_L | AUTO_INCREMENT], &mut raw)
            .ok()?;

        // 12-bit left-justified readings.
        let axis = |low: u8, high: u8| i16::from_le_bytes([low, high]) >> 4;
        Some([
            axis(raw[0], raw[1]),
            axis(raw[2], raw[3]),
            axis(raw[4], raw[5]),
        ])
    }
}
