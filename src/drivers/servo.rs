use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;

use geet_ecu::config::NO_OF_SERVOS;

/// Standard hobby servo frame.
const FRAME_US: u32 = 20_000;

const CHANNELS: [Channel; NO_OF_SERVOS] = [Channel::Ch1, Channel::Ch2, Channel::Ch3];

/// Three servos on TIM3 channels 1..3 at 50 Hz.
pub struct Servos {
    pwm: SimplePwm<'static, TIM3>,
    max_duty: u32,
}

impl Servos {
    pub fn new(mut pwm: SimplePwm<'static, TIM3>) -> Self {
        let max_duty = pwm.get_max_duty() as u32;
        for ch in CHANNELS {
            pwm.set_duty(ch, 0);
            pwm.enable(ch);
        }
        Self { pwm, max_duty }
    }

    pub fn set_pulses(&mut self, pulses_us: [u16; NO_OF_SERVOS]) {
        for (ch, us) in CHANNELS.into_iter().zip(pulses_us) {
            let duty = (us as u32).min(FRAME_US) * self.max_duty / FRAME_US;
            self.pwm.set_duty(ch, duty as u16);
        }
    }
}
