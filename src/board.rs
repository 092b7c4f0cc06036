//! Clock tree and pin assignment of the controller board.

use embassy_stm32::peripherals::{
    ADC1, EXTI6, PA11, PA12, PA15, PA5, PA6, PA7, PB0, PB12, PB4, PB5, PB6, PB8, PB9, PC10,
    PC11, PC12, PC13, SPI1, SPI3, TIM3, USB_OTG_FS,
};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

use crate::tasks::sample_task::AnalogPins;

pub struct UsbPins {
    pub otg: USB_OTG_FS,
    pub dp: PA12,
    pub dm: PA11,
}

/// W25Q settings flash on SPI3.
pub struct FlashPins {
    pub spi: SPI3,
    pub sck: PC10,
    pub mosi: PC12,
    pub miso: PC11,
    pub cs: PA15,
}

/// MAX6675 on SPI1; MOSI is routed but the chip never reads it.
pub struct ThermocouplePins {
    pub spi: SPI1,
    pub sck: PA5,
    pub mosi: PA7,
    pub miso: PA6,
    pub cs: PB12,
}

pub struct ServoPins {
    pub tim: TIM3,
    pub ch1: PB4,
    pub ch2: PB5,
    pub ch3: PB0,
}

pub struct LoadCellPins {
    pub clk: PB8,
    pub dout: PB9,
}

pub struct PickupPins {
    pub pin: PB6,
    pub exti: EXTI6,
}

pub struct Board {
    pub usb: UsbPins,
    pub flash: FlashPins,
    pub adc: ADC1,
    pub analog: AnalogPins,
    pub servos: ServoPins,
    pub load_cell: LoadCellPins,
    pub thermocouple: ThermocouplePins,
    pub pickup: PickupPins,
    pub led: PC13,
}

fn clocks() -> Config {
    let mut config = Config::default();
    // 8 MHz crystal
    config.rcc.hse = Some(Hse {
        freq: TimeHertz(8_000_000),
        mode: HseMode::Oscillator,
    });
    config.rcc.pll_src = PllSource::HSE;
    config.rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL168,
        divp: Some(PllPDiv::DIV2), // 168 MHz sysclk
        divq: Some(PllQDiv::DIV7), // 48 MHz for the OTG core
        divr: None,
    });
    config.rcc.sys = Sysclk::PLL1_P;
    config.rcc.ahb_pre = AHBPrescaler::DIV1;
    config.rcc.apb1_pre = APBPrescaler::DIV4; // 42 MHz: SPI3, TIM3 x2
    config.rcc.apb2_pre = APBPrescaler::DIV2; // 84 MHz: SPI1, ADC1
    config
}

impl Board {
    pub fn init() -> Self {
        let p = embassy_stm32::init(clocks());

        Self {
            usb: UsbPins {
                otg: p.USB_OTG_FS,
                dp: p.PA12,
                dm: p.PA11,
            },
            flash: FlashPins {
                spi: p.SPI3,
                sck: p.PC10,
                mosi: p.PC12,
                miso: p.PC11,
                cs: p.PA15,
            },
            adc: p.ADC1,
            analog: AnalogPins {
                usr0: p.PA0,
                usr1: p.PA1,
                usr2: p.PA2,
                map: p.PA3,
                tmp: p.PA4,
            },
            servos: ServoPins {
                tim: p.TIM3,
                ch1: p.PB4,
                ch2: p.PB5,
                ch3: p.PB0,
            },
            load_cell: LoadCellPins {
                clk: p.PB8,
                dout: p.PB9,
            },
            thermocouple: ThermocouplePins {
                spi: p.SPI1,
                sck: p.PA5,
                mosi: p.PA7,
                miso: p.PA6,
                cs: p.PB12,
            },
            pickup: PickupPins {
                pin: p.PB6,
                exti: p.EXTI6,
            },
            led: p.PC13,
        }
    }
}
