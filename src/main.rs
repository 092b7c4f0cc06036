#![no_std]
#![no_main]

mod board;
mod drivers;
mod tasks;
mod usb;

use embassy_executor::Spawner;
use embassy_stm32::adc::{Adc, Resolution, SampleTime};
use embassy_stm32::dma::NoDma;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pin, Pull, Speed};
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::CountingMode;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Delay, Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use geet_ecu::commands::Reply;
use geet_ecu::settings::{load_or_default, SETTINGS_BYTES};
use geet_ecu::{Error, Scheduler, SharedEcu};

use crate::board::Board;
use crate::drivers::flash::{W25qxx, SETTINGS_ADDR};
use crate::drivers::hx711::Hx711;
use crate::drivers::max6675::Max6675;
use crate::drivers::servo::Servos;
use crate::tasks::command_task::{command_task, REPLY_DEPTH};
use crate::tasks::log_task::log_task;
use crate::tasks::rpm_task::rpm_task;
use crate::tasks::sample_task::sample_task;

// ── Shared state ──────────────────────────────────────────────────────────────
static ECU: StaticCell<SharedEcu> = StaticCell::new();

// Command task -> log task, which owns the serial TX side.
static REPLY_CHAN: Channel<CriticalSectionRawMutex, Result<Reply, Error>, REPLY_DEPTH> =
    Channel::new();

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();

    // 2. USB (CDC-ACM: reports and commands)
    let (usb_dev, usb_tx, usb_rx) = usb::init(board.usb.otg, board.usb.dp, board.usb.dm);
    spawner.must_spawn(usb::usb_task(usb_dev));

    // 3. SPI3 @ 10 MHz: W25Q settings flash
    let mut flash_spi_config = SpiConfig::default();
    flash_spi_config.frequency = TimeHertz(10_000_000);
    let flash_spi = Spi::new(
        board.flash.spi,
        board.flash.sck, board.flash.mosi, board.flash.miso,
        NoDma, NoDma,
        flash_spi_config,
    );
    let cs_flash = Output::new(board.flash.cs.degrade(), Level::High, Speed::VeryHigh);
    let mut flash = W25qxx::new(flash_spi, cs_flash);
    match flash.read_id() {
        Ok(id) => defmt::info!("flash JEDEC id {:x}", id),
        Err(e) => defmt::warn!("flash not responding: {}", e),
    }

    // 4. Settings: stored image or defaults
    let mut image = [0u8; SETTINGS_BYTES];
    let config = match flash.read(SETTINGS_ADDR, &mut image) {
        Ok(()) => load_or_default(&image),
        Err(e) => {
            defmt::warn!("settings flash unreadable: {}", e);
            load_or_default(&[])
        }
    };
    let ecu: &'static SharedEcu = ECU.init(SharedEcu::new(Scheduler::new(config)));

    // 5. ADC1, 10-bit
    let mut adc = Adc::new(board.adc, &mut Delay);
    adc.set_resolution(Resolution::TenBit);
    adc.set_sample_time(SampleTime::Cycles144);

    // 6. Servos on TIM3 @ 50 Hz
    let sp = board.servos;
    let pwm = SimplePwm::new(
        sp.tim,
        Some(PwmPin::new_ch1(sp.ch1, OutputType::PushPull)),
        Some(PwmPin::new_ch2(sp.ch2, OutputType::PushPull)),
        Some(PwmPin::new_ch3(sp.ch3, OutputType::PushPull)),
        None,
        TimeHertz(50),
        CountingMode::EdgeAlignedUp,
    );
    let mut servos = Servos::new(pwm);
    servos.set_pulses(ecu.with(|s| s.servo_us()));

    // 7. HX711 load cell
    let load_cell = Hx711::new(board.load_cell.clk.degrade(), board.load_cell.dout.degrade());

    // 8. SPI1 @ 1 MHz: MAX6675 thermocouple
    let mut tc_spi_config = SpiConfig::default();
    tc_spi_config.frequency = TimeHertz(1_000_000);
    let tc_spi = Spi::new(
        board.thermocouple.spi,
        board.thermocouple.sck, board.thermocouple.mosi, board.thermocouple.miso,
        NoDma, NoDma,
        tc_spi_config,
    );
    let cs_tc = Output::new(board.thermocouple.cs.degrade(), Level::High, Speed::VeryHigh);
    let thermocouple = Max6675::new(tc_spi, cs_tc);

    // 9. Flywheel pickup
    let pickup = ExtiInput::new(Input::new(board.pickup.pin, Pull::Up), board.pickup.exti);

    // 10. Heartbeat LED
    let mut led = Output::new(board.led, Level::High, Speed::Low);

    // Let the MAX6675 finish its first conversion
    Timer::after(Duration::from_millis(250)).await;

    // 11. Spawn all tasks
    spawner.must_spawn(sample_task(adc, board.analog, load_cell, thermocouple, servos, ecu));
    spawner.must_spawn(rpm_task(pickup, ecu));
    spawner.must_spawn(command_task(usb_rx, ecu, REPLY_CHAN.sender()));
    spawner.must_spawn(log_task(usb_tx, flash, ecu, REPLY_CHAN.receiver()));

    // 12. Main task: LED heartbeat, fast blink while the engine runs
    loop {
        let status = ecu.with(|s| s.status());
        led.toggle();
        let period = if status.feedback_lost {
            100
        } else if status.engine_running {
            250
        } else {
            1000
        };
        Timer::after(Duration::from_millis(period)).await;
    }
}
