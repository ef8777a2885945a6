//! VL53L1X time-of-flight sensor driver (register level).
//!
//! Bring-up follows the ST ultra-lite sequence: wait for firmware boot,
//! load the default configuration block, run one throwaway measurement to
//! settle VHV calibration, then apply distance mode and timing budget and
//! start continuous ranging. `poll` never blocks on the sensor; the
//! data-ready flag gates reads.

use std::time::Duration;

use rppal::i2c::I2c;

use super::traits::RangingSensor;
use crate::error::{Result, SentryError};

/// Factory-default I2C address.
pub const DEFAULT_ADDRESS: u16 = 0x29;

const SOFT_RESET: u16 = 0x0000;
const VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND: u16 = 0x0008;
const VHV_CONFIG_INIT: u16 = 0x000B;
const GPIO_HV_MUX_CTRL: u16 = 0x0030;
const GPIO_TIO_HV_STATUS: u16 = 0x0031;
const PHASECAL_CONFIG_TIMEOUT_MACROP: u16 = 0x004B;
const RANGE_CONFIG_TIMEOUT_MACROP_A_HI: u16 = 0x005E;
const RANGE_CONFIG_VCSEL_PERIOD_A: u16 = 0x0060;
const RANGE_CONFIG_TIMEOUT_MACROP_B_HI: u16 = 0x0061;
const RANGE_CONFIG_VCSEL_PERIOD_B: u16 = 0x0063;
const RANGE_CONFIG_VALID_PHASE_HIGH: u16 = 0x0069;
const SD_CONFIG_WOI_SD0: u16 = 0x0078;
const SD_CONFIG_INITIAL_PHASE_SD0: u16 = 0x007A;
const SYSTEM_INTERRUPT_CLEAR: u16 = 0x0086;
const SYSTEM_MODE_START: u16 = 0x0087;
const RESULT_FINAL_RANGE_MM: u16 = 0x0096;
const FIRMWARE_SYSTEM_STATUS: u16 = 0x00E5;
const IDENTIFICATION_MODEL_ID: u16 = 0x010F;

const MODEL_ID: u16 = 0xEACC;
const CONFIG_START: u16 = 0x002D;
const RANGING_ENABLE: u8 = 0x40;
const RANGING_DISABLE: u8 = 0x00;

/// Default register block for 0x2D..=0x87, from the ST reference driver.
#[rustfmt::skip]
const DEFAULT_CONFIG: [u8; 91] = [
    0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x02, 0x08, // 0x2D..=0x34
    0x00, 0x08, 0x10, 0x01, 0x01, 0x00, 0x00, 0x00, // 0x35..=0x3C
    0x00, 0xFF, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, // 0x3D..=0x44
    0x00, 0x20, 0x0B, 0x00, 0x00, 0x02, 0x0A, 0x21, // 0x45..=0x4C
    0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0xC8, // 0x4D..=0x54
    0x00, 0x00, 0x38, 0xFF, 0x01, 0x00, 0x08, 0x00, // 0x55..=0x5C
    0x00, 0x01, 0xCC, 0x0F, 0x01, 0xF1, 0x0D, 0x01, // 0x5D..=0x64
    0x68, 0x00, 0x80, 0x08, 0xB8, 0x00, 0x00, 0x00, // 0x65..=0x6C
    0x00, 0x0F, 0x89, 0x00, 0x00, 0x00, 0x00, 0x00, // 0x6D..=0x74
    0x00, 0x00, 0x01, 0x0F, 0x0D, 0x0E, 0x0E, 0x00, // 0x75..=0x7C
    0x00, 0x02, 0xC7, 0xFF, 0x9B, 0x00, 0x00, 0x00, // 0x7D..=0x84
    0x01, 0x00, 0x00,                               // 0x85..=0x87
];

/// Supported timing budgets (ms) with their macrop A/B register values.
const SHORT_BUDGETS: [(u16, u16, u16); 7] = [
    (15, 0x001D, 0x0027),
    (20, 0x0051, 0x006E),
    (33, 0x00D6, 0x006E),
    (50, 0x01AE, 0x01E8),
    (100, 0x02E1, 0x0388),
    (200, 0x03E1, 0x0496),
    (500, 0x0591, 0x05C1),
];
const LONG_BUDGETS: [(u16, u16, u16); 6] = [
    (20, 0x001E, 0x0022),
    (33, 0x0060, 0x006E),
    (50, 0x00AD, 0x00C6),
    (100, 0x01CC, 0x01EA),
    (200, 0x02D9, 0x02F8),
    (500, 0x048F, 0x04A4),
];

fn i2c_err(e: rppal::i2c::Error) -> SentryError {
    SentryError::hardware_error(format!("i2c: {}", e))
}

/// Macrop register pair for the nearest supported budget at or above the
/// request; oversized requests land on the largest entry.
fn budget_registers(distance_mode: u8, budget_ms: u16) -> (u16, u16) {
    let table: &[(u16, u16, u16)] = if distance_mode == 2 {
        &LONG_BUDGETS
    } else {
        &SHORT_BUDGETS
    };
    let (_, a, b) = table
        .iter()
        .copied()
        .find(|(ms, _, _)| *ms >= budget_ms)
        .unwrap_or(table[table.len() - 1]);
    (a, b)
}

/// Register-level handle to one VL53L1X on the default I2C bus.
pub struct Vl53l1x {
    i2c: I2c,
    interrupt_polarity: u8,
}

impl Vl53l1x {
    /// Bring the sensor up and start continuous ranging.
    ///
    /// `distance_mode` is 1 (short, to ~1.3 m in bright light) or 2 (long,
    /// to ~4 m); `timing_budget_ms` rounds up to the nearest supported
    /// value.
    pub fn new(timing_budget_ms: u16, distance_mode: u8) -> Result<Self> {
        let mut i2c = I2c::new().map_err(i2c_err)?;
        i2c.set_slave_address(DEFAULT_ADDRESS).map_err(i2c_err)?;
        let mut sensor = Self {
            i2c,
            interrupt_polarity: 1,
        };
        sensor.initialize(timing_budget_ms, distance_mode)?;
        Ok(sensor)
    }

    fn initialize(&mut self, timing_budget_ms: u16, distance_mode: u8) -> Result<()> {
        let model = self.read_u16(IDENTIFICATION_MODEL_ID)?;
        if model != MODEL_ID {
            return Err(SentryError::hardware_error(format!(
                "unexpected model id 0x{:04X} (want 0x{:04X})",
                model, MODEL_ID
            )));
        }

        self.write_u8(SOFT_RESET, 0x00)?;
        std::thread::sleep(Duration::from_millis(1));
        self.write_u8(SOFT_RESET, 0x01)?;
        self.wait_for_boot()?;

        self.write_block(CONFIG_START, &DEFAULT_CONFIG)?;
        let mux = self.read_u8(GPIO_HV_MUX_CTRL)?;
        self.interrupt_polarity = !((mux & 0x10) >> 4) & 0x01;

        // One throwaway measurement settles VHV calibration.
        self.write_u8(SYSTEM_MODE_START, RANGING_ENABLE)?;
        self.wait_for_data_ready(1000)?;
        self.clear_interrupt()?;
        self.write_u8(SYSTEM_MODE_START, RANGING_DISABLE)?;
        self.write_u8(VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND, 0x09)?;
        self.write_u8(VHV_CONFIG_INIT, 0x00)?;

        self.set_distance_mode(distance_mode, timing_budget_ms)?;
        self.write_u8(SYSTEM_MODE_START, RANGING_ENABLE)?;
        Ok(())
    }

    fn wait_for_boot(&mut self) -> Result<()> {
        for _ in 0..100 {
            if self.read_u8(FIRMWARE_SYSTEM_STATUS)? & 0x01 != 0 {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Err(SentryError::hardware_error("firmware did not boot"))
    }

    fn wait_for_data_ready(&mut self, attempts: u32) -> Result<()> {
        for _ in 0..attempts {
            if self.data_ready()? {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Err(SentryError::hardware_error("first measurement timed out"))
    }

    fn data_ready(&mut self) -> Result<bool> {
        Ok(self.read_u8(GPIO_TIO_HV_STATUS)? & 0x01 == self.interrupt_polarity)
    }

    fn clear_interrupt(&mut self) -> Result<()> {
        self.write_u8(SYSTEM_INTERRUPT_CLEAR, 0x01)
    }

    fn set_distance_mode(&mut self, mode: u8, timing_budget_ms: u16) -> Result<()> {
        if mode == 2 {
            self.write_u8(PHASECAL_CONFIG_TIMEOUT_MACROP, 0x0A)?;
            self.write_u8(RANGE_CONFIG_VCSEL_PERIOD_A, 0x0F)?;
            self.write_u8(RANGE_CONFIG_VCSEL_PERIOD_B, 0x0D)?;
            self.write_u8(RANGE_CONFIG_VALID_PHASE_HIGH, 0xB8)?;
            self.write_u16(SD_CONFIG_WOI_SD0, 0x0F0D)?;
            self.write_u16(SD_CONFIG_INITIAL_PHASE_SD0, 0x0E0E)?;
        } else {
            self.write_u8(PHASECAL_CONFIG_TIMEOUT_MACROP, 0x14)?;
            self.write_u8(RANGE_CONFIG_VCSEL_PERIOD_A, 0x07)?;
            self.write_u8(RANGE_CONFIG_VCSEL_PERIOD_B, 0x05)?;
            self.write_u8(RANGE_CONFIG_VALID_PHASE_HIGH, 0x38)?;
            self.write_u16(SD_CONFIG_WOI_SD0, 0x0705)?;
            self.write_u16(SD_CONFIG_INITIAL_PHASE_SD0, 0x0606)?;
        }
        let (a, b) = budget_registers(mode, timing_budget_ms);
        self.write_u16(RANGE_CONFIG_TIMEOUT_MACROP_A_HI, a)?;
        self.write_u16(RANGE_CONFIG_TIMEOUT_MACROP_B_HI, b)?;
        Ok(())
    }

    fn write_block(&mut self, index: u16, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(2 + data.len());
        frame.extend_from_slice(&index.to_be_bytes());
        frame.extend_from_slice(data);
        self.i2c.write(&frame).map_err(i2c_err)?;
        Ok(())
    }

    fn write_u8(&mut self, index: u16, value: u8) -> Result<()> {
        self.write_block(index, &[value])
    }

    fn write_u16(&mut self, index: u16, value: u16) -> Result<()> {
        self.write_block(index, &value.to_be_bytes())
    }

    fn read_u8(&mut self, index: u16) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(&index.to_be_bytes(), &mut buf)
            .map_err(i2c_err)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self, index: u16) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(&index.to_be_bytes(), &mut buf)
            .map_err(i2c_err)?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl RangingSensor for Vl53l1x {
    fn poll(&mut self) -> Result<Option<f64>> {
        if !self.data_ready()? {
            return Ok(None);
        }
        let mm = self.read_u16(RESULT_FINAL_RANGE_MM)?;
        self.clear_interrupt()?;
        Ok(Some(f64::from(mm) / 1000.0))
    }
}
