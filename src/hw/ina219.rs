//! INA219 current/voltage monitor driver.
//!
//! Calibrated for a 100 µA current LSB, which covers ±3.2 A with the
//! standard 0.1 Ω shunt. Shunt and current registers are signed; charging
//! shows up as negative current.

use rppal::i2c::I2c;

use super::traits::{PowerReading, PowerSensor};
use crate::error::{Result, SentryError};

/// Address used by the common UPS HATs this appliance targets.
pub const DEFAULT_ADDRESS: u16 = 0x43;

const REG_CONFIG: u8 = 0x00;
const REG_SHUNT_VOLTAGE: u8 = 0x01;
const REG_BUS_VOLTAGE: u8 = 0x02;
const REG_POWER: u8 = 0x03;
const REG_CURRENT: u8 = 0x04;
const REG_CALIBRATION: u8 = 0x05;

/// 32 V bus range, ±320 mV shunt PGA, 12-bit conversions, continuous
/// shunt+bus sampling.
const CONFIG: u16 = 0x399F;

const CURRENT_LSB_A: f64 = 0.000_1;
const POWER_LSB_W: f64 = 20.0 * CURRENT_LSB_A;
const SHUNT_LSB_V: f64 = 0.000_01;
const BUS_LSB_V: f64 = 0.004;

fn i2c_err(e: rppal::i2c::Error) -> SentryError {
    SentryError::hardware_error(format!("i2c: {}", e))
}

/// Register-level handle to one INA219.
pub struct Ina219 {
    i2c: I2c,
}

impl Ina219 {
    /// Configure and calibrate the monitor for the given shunt resistance.
    pub fn new(shunt_ohms: f64, address: u16) -> Result<Self> {
        if !(shunt_ohms > 0.0) {
            return Err(SentryError::config_error(format!(
                "shunt resistance must be positive, got {}",
                shunt_ohms
            )));
        }
        let mut i2c = I2c::new().map_err(i2c_err)?;
        i2c.set_slave_address(address).map_err(i2c_err)?;
        let mut sensor = Self { i2c };
        let calibration = (0.04096 / (CURRENT_LSB_A * shunt_ohms)) as u16;
        sensor.write_u16(REG_CONFIG, CONFIG)?;
        sensor.write_u16(REG_CALIBRATION, calibration)?;
        Ok(sensor)
    }

    fn write_u16(&mut self, reg: u8, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(&[reg, hi, lo]).map_err(i2c_err)?;
        Ok(())
    }

    fn read_u16(&mut self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(&[reg], &mut buf).map_err(i2c_err)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_i16(&mut self, reg: u8) -> Result<i16> {
        Ok(self.read_u16(reg)? as i16)
    }
}

impl PowerSensor for Ina219 {
    fn read(&mut self) -> Result<PowerReading> {
        let bus_raw = self.read_u16(REG_BUS_VOLTAGE)?;
        let shunt_raw = self.read_i16(REG_SHUNT_VOLTAGE)?;
        let current_raw = self.read_i16(REG_CURRENT)?;
        let power_raw = self.read_u16(REG_POWER)?;
        Ok(PowerReading {
            // Bus voltage lives in bits 15..3.
            bus_voltage_v: f64::from(bus_raw >> 3) * BUS_LSB_V,
            shunt_voltage_v: f64::from(shunt_raw) * SHUNT_LSB_V,
            current_a: f64::from(current_raw) * CURRENT_LSB_A,
            power_w: f64::from(power_raw) * POWER_LSB_W,
        })
    }
}
