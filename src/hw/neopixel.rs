//! WS2812 LED ring driven over SPI.
//!
//! Each WS2812 bit is stretched into one SPI byte at 6.4 MHz: 0xC0 encodes
//! a zero (short high pulse), 0xF8 a one (long high pulse). Trailing zero
//! bytes hold the line low past the 50 µs reset latch. No level shifter is
//! assumed; most rings tolerate 3.3 V data at this supply voltage.

use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use super::traits::{LedRing, Rgb};
use crate::error::{Result, SentryError};

/// Pixel count of the stock ring.
pub const DEFAULT_PIXELS: usize = 16;

const SPI_CLOCK_HZ: u32 = 6_400_000;
const BIT_ZERO: u8 = 0xC0;
const BIT_ONE: u8 = 0xF8;
/// 64 zero bytes ≈ 80 µs of idle line, comfortably past the latch time.
const RESET_BYTES: usize = 64;

fn spi_err(e: rppal::spi::Error) -> SentryError {
    SentryError::hardware_error(format!("spi: {}", e))
}

/// WS2812 ring on SPI0.
pub struct NeopixelRing {
    spi: Spi,
    pixels: usize,
    brightness: f32,
}

impl NeopixelRing {
    pub fn new(pixels: usize, brightness: f32) -> Result<Self> {
        let spi =
            Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0).map_err(spi_err)?;
        Ok(Self {
            spi,
            pixels,
            brightness: brightness.clamp(0.0, 1.0),
        })
    }

    fn render(&mut self, color: Rgb, scale: f32) -> Result<()> {
        let grb = [
            scaled(color.g, scale),
            scaled(color.r, scale),
            scaled(color.b, scale),
        ];
        let mut frame = Vec::with_capacity(self.pixels * 24 + RESET_BYTES);
        for _ in 0..self.pixels {
            for byte in grb {
                for bit in (0..8).rev() {
                    frame.push(if byte >> bit & 1 == 1 { BIT_ONE } else { BIT_ZERO });
                }
            }
        }
        frame.resize(frame.len() + RESET_BYTES, 0);
        self.spi.write(&frame).map_err(spi_err)?;
        Ok(())
    }
}

fn scaled(channel: u8, scale: f32) -> u8 {
    (f32::from(channel) * scale).round() as u8
}

impl LedRing for NeopixelRing {
    fn set_brightness(&mut self, brightness: f32) -> Result<()> {
        self.brightness = brightness.clamp(0.0, 1.0);
        Ok(())
    }

    fn fill(&mut self, color: Rgb) -> Result<()> {
        let scale = self.brightness;
        self.render(color, scale)
    }

    fn off(&mut self) -> Result<()> {
        self.render(Rgb::BLACK, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_scaling_rounds() {
        assert_eq!(scaled(255, 1.0), 255);
        assert_eq!(scaled(255, 0.0), 0);
        assert_eq!(scaled(200, 0.3), 60);
        assert_eq!(scaled(1, 0.3), 0);
    }
}
