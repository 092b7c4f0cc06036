use cortex_m::asm;
use embassy_stm32::gpio::{AnyPin, Input, Level, Output, Pull, Speed};

/// HX711 load cell ADC on two GPIOs, channel A at gain 128.
///
/// Only the top 16 bits of each conversion are kept.
pub struct Hx711 {
    clk: Output<'static, AnyPin>,
    dout: Input<'static, AnyPin>,
}

impl Hx711 {
    /// ~1 us at 168 MHz; the part wants 0.2..50 us per clock phase.
    const HALF_CLOCK_CYCLES: u32 = 168;
    /// Trailing pulses after the data bits select channel A, gain 128.
    const GAIN_PULSES: u32 = 1;

    pub fn new(clk: AnyPin, dout: AnyPin) -> Self {
        Self {
            clk: Output::new(clk, Level::Low, Speed::VeryHigh),
            dout: Input::new(dout, Pull::Up),
        }
    }

    /// DOUT goes low when a conversion is waiting.
    pub fn is_ready(&self) -> bool {
        self.dout.is_low()
    }

    /// Newest conversion, or `None` while the converter is busy.
    pub fn try_read(&mut self) -> Option<i16> {
        if !self.is_ready() {
            return None;
        }

        // A clock high phase over 60 us powers the part down
        let raw = critical_section::with(|_cs| {
            let mut value: u32 = 0;
            for _ in 0..24 {
                self.clk.set_high();
                asm::delay(Self::HALF_CLOCK_CYCLES);
                value = (value << 1) | self.dout.is_high() as u32;
                self.clk.set_low();
                asm::delay(Self::HALF_CLOCK_CYCLES);
            }
            for _ in 0..Self::GAIN_PULSES {
                self.clk.set_high();
                asm::delay(Self::HALF_CLOCK_CYCLES);
                self.clk.set_low();
                asm::delay(Self::HALF_CLOCK_CYCLES);
            }
            value
        });

        Some(counts_from_raw(raw))
    }
}

/// Top 16 bits of a 24-bit two's complement conversion.
pub fn counts_from_raw(raw24: u32) -> i16 {
    ((raw24 >> 8) & 0xFFFF) as u16 as i16
}
