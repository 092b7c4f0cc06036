use embassy_executor::task;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::peripherals::PB6;
use embassy_time::Instant;

use geet_ecu::SharedEcu;

/// Flywheel pickup, one rising edge per revolution.
///
/// The timestamp is taken before the lock so contention does not skew it.
#[task]
pub async fn rpm_task(mut pickup: ExtiInput<'static, PB6>, ecu: &'static SharedEcu) {
    loop {
        pickup.wait_for_rising_edge().await;
        // wraps every ~71 minutes; intervals use wrapping arithmetic
        let now_us = Instant::now().as_micros() as u32;
        ecu.on_rpm_edge(now_us);
    }
}
