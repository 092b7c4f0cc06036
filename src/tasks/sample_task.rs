use embassy_executor::task;
use embassy_stm32::adc::Adc;
use embassy_stm32::peripherals::{ADC1, PA0, PA1, PA2, PA3, PA4, SPI1};
use embassy_time::{Duration, Ticker};

use geet_ecu::config::{EGT_SAMPLE_INTERVAL_MS, FAST_SAMPLE_INTERVAL_MS};
use geet_ecu::state::SensorFrame;
use geet_ecu::SharedEcu;

use crate::drivers::hx711::Hx711;
use crate::drivers::max6675::Max6675;
use crate::drivers::servo::Servos;

/// Fast ticks between thermocouple reads.
const EGT_EVERY: u32 = EGT_SAMPLE_INTERVAL_MS / FAST_SAMPLE_INTERVAL_MS;

/// Analog inputs in the order the scheduler expects them.
pub struct AnalogPins {
    pub usr0: PA0,
    pub usr1: PA1,
    pub usr2: PA2,
    pub map: PA3,
    pub tmp: PA4,
}

/// Sampling task, one scheduler tick per fast period.
///
/// Conversions happen here, outside the lock; only the finished frame goes
/// into the scheduler. Servo outputs are updated after the lock is released.
#[task]
pub async fn sample_task(
    mut adc: Adc<'static, ADC1>,
    mut pins: AnalogPins,
    mut load_cell: Hx711,
    mut thermocouple: Max6675<'static, SPI1>,
    mut servos: Servos,
    ecu: &'static SharedEcu,
) {
    let mut ticker = Ticker::every(Duration::from_millis(FAST_SAMPLE_INTERVAL_MS as u64));
    let mut tick: u32 = 0;

    loop {
        ticker.next().await;
        tick = tick.wrapping_add(1);

        // ── A. Conversions ────────────────────────────────────────────────────
        let analog = [
            adc.read(&mut pins.usr0),
            adc.read(&mut pins.usr1),
            adc.read(&mut pins.usr2),
            adc.read(&mut pins.map),
            adc.read(&mut pins.tmp),
        ];
        let torque_counts = load_cell.try_read();
        // skip the reading on a bus error; the scheduler keeps the last one
        let egt = if tick % EGT_EVERY == 0 {
            thermocouple.read().ok()
        } else {
            None
        };

        // ── B. Scheduler ──────────────────────────────────────────────────────
        let outcome = ecu.tick(&SensorFrame {
            analog,
            torque_counts,
            egt,
        });

        // ── C. Outputs ────────────────────────────────────────────────────────
        if let Some(pulses) = outcome.servo_us {
            servos.set_pulses(pulses);
        }
    }
}
