use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};

use geet_ecu::state::EgtReading;

/// Thermocouple input flag in the 16-bit frame.
const OPEN_CIRCUIT_BIT: u16 = 1 << 2;

/// MAX6675 K-type thermocouple converter. Read-only SPI, at most 4.3 MHz.
///
/// A read restarts the conversion, which takes up to 220 ms.
pub struct Max6675<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> Max6675<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    pub fn read(&mut self) -> Result<EgtReading, Error> {
        let mut rx = [0u8; 2];
        self.cs.set_low();
        let res = self.spi.blocking_read(&mut rx);
        self.cs.set_high();
        res?;
        Ok(decode(u16::from_be_bytes(rx)))
    }
}

fn decode(frame: u16) -> EgtReading {
    if frame & OPEN_CIRCUIT_BIT != 0 {
        EgtReading::OpenCircuit
    } else {
        EgtReading::QuarterDegrees((frame >> 3) & 0x0FFF)
    }
}
