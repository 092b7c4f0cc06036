//! Fixed-point PID loop with integrator clamping.

use crate::config::{PID_OUTPUT_MAX, PID_OUTPUT_MIN, RPM_MAX_SET, RPM_MIN_SET, VAC_MAX_SET, VAC_MIN_SET};
use crate::math::fixed::{saturate_i32, FP_FRAC_BITS};
use crate::math::Fixed;

const I_ACC_MIN: i64 = (PID_OUTPUT_MIN as i64) << FP_FRAC_BITS;
const I_ACC_MAX: i64 = (PID_OUTPUT_MAX as i64) << FP_FRAC_BITS;

/// Control loops the ECU runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopId {
    Rpm,
    Vacuum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidAxis {
    P,
    I,
    D,
}

/// Static description of one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidConfig {
    pub target_min: i32,
    pub target_max: i32,
    /// Error is `actual - target` instead of `target - actual`.
    pub invert: bool,
    /// UI slider positions for p, i, d; see [`Fixed::from_ui_gain`].
    pub gains: [u8; 3],
}

impl PidConfig {
    pub const RPM: PidConfig = PidConfig {
        target_min: RPM_MIN_SET,
        target_max: RPM_MAX_SET,
        invert: false,
        // 1.0, 0.25, 0
        gains: [80, 48, 0],
    };

    pub const VACUUM: PidConfig = PidConfig {
        target_min: VAC_MIN_SET,
        target_max: VAC_MAX_SET,
        invert: true,
        gains: [80, 48, 0],
    };
}

/// Snapshot of one loop for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidTelemetry {
    pub target: i32,
    pub actual: i32,
    pub error: i32,
    pub p_term: i32,
    pub i_term: i32,
    pub d_term: i32,
    pub output: i32,
    pub kp_ui: u8,
    pub ki_ui: u8,
    pub kd_ui: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidState {
    target: i32,
    target_min: i32,
    target_max: i32,
    actual: i32,
    error: i32,
    kp: Fixed,
    ki: Fixed,
    kd: Fixed,
    /// Slider positions the gains came from. Several positions map to the
    /// same gain, so these are kept rather than recovered from it.
    gains_ui: [u8; 3],
    p_term: i32,
    i_accumulator: i32,
    d_term: i32,
    output: i32,
    invert: bool,
    previous_error: i32,
}

impl PidState {
    /// New loop with no target set; the output rests at `PID_OUTPUT_MIN`.
    pub fn new(config: &PidConfig) -> Self {
        let mut state = Self {
            target: 0,
            target_min: config.target_min,
            target_max: config.target_max,
            actual: 0,
            error: 0,
            kp: Fixed::ZERO,
            ki: Fixed::ZERO,
            kd: Fixed::ZERO,
            gains_ui: [0; 3],
            p_term: 0,
            i_accumulator: 0,
            d_term: 0,
            output: PID_OUTPUT_MIN,
            invert: config.invert,
            previous_error: 0,
        };
        for (axis, ui) in [PidAxis::P, PidAxis::I, PidAxis::D].into_iter().zip(config.gains) {
            state.set_gain(axis, ui);
        }
        state
    }

    /// One control step; returns the new output in `PID_OUTPUT_MIN..=PID_OUTPUT_MAX`.
    pub fn tick(&mut self, actual: i32) -> i32 {
        self.actual = actual;

        let raw_error = if self.invert {
            actual as i64 - self.target as i64
        } else {
            self.target as i64 - actual as i64
        };
        let error = raw_error.clamp(i16::MIN as i64, i16::MAX as i64) as i32;
        self.error = error;

        self.p_term = self.kp.mul_int(error);

        let acc = self.i_accumulator as i64 + self.ki.mul_int_unscaled(error);
        self.i_accumulator = acc.clamp(I_ACC_MIN, I_ACC_MAX) as i32;

        self.d_term = self.kd.mul_int(error - self.previous_error);
        self.previous_error = error;

        let sum = self.p_term as i64
            + (self.i_accumulator >> FP_FRAC_BITS) as i64
            + self.d_term as i64;
        self.output = saturate_i32(sum).clamp(PID_OUTPUT_MIN, PID_OUTPUT_MAX);
        self.output
    }

    /// Set a gain from a UI slider position.
    pub fn set_gain(&mut self, axis: PidAxis, ui: u8) {
        let gain = Fixed::from_ui_gain(ui);
        match axis {
            PidAxis::P => self.kp = gain,
            PidAxis::I => self.ki = gain,
            PidAxis::D => self.kd = gain,
        }
        self.gains_ui[axis as usize] = ui;
    }

    /// Slider positions for p, i, d, as last set.
    pub const fn gains_ui(&self) -> [u8; 3] {
        self.gains_ui
    }

    pub fn gain(&self, axis: PidAxis) -> Fixed {
        match axis {
            PidAxis::P => self.kp,
            PidAxis::I => self.ki,
            PidAxis::D => self.kd,
        }
    }

    /// Set the setpoint, clamped to the loop's range. Zero or below clears
    /// the target. Returns the value applied.
    pub fn set_target(&mut self, value: i32) -> i32 {
        self.target = if value <= 0 {
            0
        } else {
            value.clamp(self.target_min, self.target_max)
        };
        self.target
    }

    /// Drop integrator and derivative history.
    pub fn reset(&mut self) {
        self.error = 0;
        self.previous_error = 0;
        self.p_term = 0;
        self.i_accumulator = 0;
        self.d_term = 0;
        self.output = PID_OUTPUT_MIN;
    }

    pub const fn target(&self) -> i32 {
        self.target
    }

    pub const fn output(&self) -> i32 {
        self.output
    }

    pub const fn i_accumulator(&self) -> i32 {
        self.i_accumulator
    }

    pub fn telemetry(&self) -> PidTelemetry {
        PidTelemetry {
            target: self.target,
            actual: self.actual,
            error: self.error,
            p_term: self.p_term,
            i_term: self.i_accumulator >> FP_FRAC_BITS,
            d_term: self.d_term,
            output: self.output,
            kp_ui: self.gains_ui[PidAxis::P as usize],
            ki_ui: self.gains_ui[PidAxis::I as usize],
            kd_ui: self.gains_ui[PidAxis::D as usize],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // slider positions: 32 = 0.125, 48 = 0.25, 64 = 0.5, 72 = 0.75, 80 = 1.0, 96 = 2.0
    fn loop_with(kp: u8, ki: u8, kd: u8) -> PidState {
        let config = PidConfig {
            target_min: 0,
            target_max: 10_000,
            invert: false,
            gains: [kp, ki, kd],
        };
        PidState::new(&config)
    }

    #[test]
    fn proportional_only() {
        let mut pid = loop_with(64, 0, 0);
        pid.set_target(1000);
        assert_eq!(pid.tick(600), 200);
        assert_eq!(pid.tick(1000), 0);
        // negative drive clamps at the bottom of the range
        assert_eq!(pid.tick(1400), PID_OUTPUT_MIN);
    }

    #[test]
    fn integral_accumulates() {
        let mut pid = loop_with(0, 48, 0);
        pid.set_target(100);
        assert_eq!(pid.tick(0), 25);
        assert_eq!(pid.tick(0), 50);
        assert_eq!(pid.tick(100), 50);
        assert_eq!(pid.i_accumulator(), 50 << 8);
    }

    #[test]
    fn derivative_acts_on_error_change() {
        let mut pid = loop_with(0, 0, 96);
        pid.set_target(1000);
        assert_eq!(pid.tick(900), 200);
        // error unchanged, no derivative action
        assert_eq!(pid.tick(900), 0);
        let t = pid.telemetry();
        assert_eq!(t.d_term, 0);
        assert_eq!(t.error, 100);
    }

    #[test]
    fn inverted_loop() {
        let mut pid = PidState::new(&PidConfig {
            gains: [80, 0, 0],
            ..PidConfig::VACUUM
        });
        pid.set_target(500);
        assert_eq!(pid.tick(800), 300);
        assert_eq!(pid.tick(400), 0);
    }

    #[test]
    fn integrator_winds_up_to_the_clamp_only() {
        let mut pid = loop_with(0, 80, 0);
        pid.set_target(10_000);
        for _ in 0..1000 {
            pid.tick(0);
        }
        assert_eq!(pid.i_accumulator(), PID_OUTPUT_MAX << 8);
        assert_eq!(pid.output(), PID_OUTPUT_MAX);

        // recovery starts on the first reversed step
        pid.set_target(1);
        pid.tick(101);
        assert_eq!(pid.output(), PID_OUTPUT_MAX - 100);
        let mut steps = 1;
        while pid.output() > PID_OUTPUT_MIN {
            pid.tick(101);
            steps += 1;
        }
        assert_eq!(steps, 11);
    }

    #[test]
    fn error_clamps_to_i16() {
        let mut pid = loop_with(80, 0, 0);
        pid.set_target(10_000);
        pid.tick(-1_000_000);
        assert_eq!(pid.telemetry().error, i16::MAX as i32);
    }

    #[test]
    fn identical_inputs_identical_outputs() {
        let inputs = [0, 250, 900, 1400, 1600, 1500, 1450, 1490, 1510, 1500];
        let run = || {
            let mut pid = loop_with(72, 32, 64);
            pid.set_target(1500);
            inputs.iter().map(|&a| pid.tick(a)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn target_clamped_to_range() {
        let mut pid = PidState::new(&PidConfig::RPM);
        assert_eq!(pid.set_target(200), RPM_MIN_SET);
        assert_eq!(pid.set_target(9000), RPM_MAX_SET);
        assert_eq!(pid.set_target(0), 0);
        assert_eq!(pid.set_target(-5), 0);
    }

    #[test]
    fn ui_gains_round_trip() {
        let mut pid = PidState::new(&PidConfig::RPM);
        pid.set_gain(PidAxis::D, 96);
        assert_eq!(pid.gain(PidAxis::D), Fixed::from_ui_gain(96));
        assert_eq!(pid.telemetry().kd_ui, 96);
    }

    #[test]
    fn slider_positions_are_kept_exactly() {
        let mut pid = PidState::new(&PidConfig::RPM);
        // low positions and saturated high ones share gains with neighbours
        pid.set_gain(PidAxis::P, 5);
        pid.set_gain(PidAxis::I, 200);
        pid.set_gain(PidAxis::D, 250);
        assert_eq!(pid.gain(PidAxis::I), pid.gain(PidAxis::D));
        assert_eq!(pid.gains_ui(), [5, 200, 250]);
        let t = pid.telemetry();
        assert_eq!((t.kp_ui, t.ki_ui, t.kd_ui), (5, 200, 250));
    }

    #[test]
    fn presets_match_their_gains() {
        let pid = PidState::new(&PidConfig::RPM);
        assert_eq!(pid.gain(PidAxis::P), Fixed::ONE);
        assert_eq!(pid.gain(PidAxis::I), Fixed::from_f32(0.25));
        assert_eq!(pid.gain(PidAxis::D), Fixed::ZERO);
    }

    #[test]
    fn reset_clears_history() {
        let mut pid = loop_with(80, 80, 80);
        pid.set_target(500);
        pid.tick(0);
        pid.reset();
        assert_eq!(pid.i_accumulator(), 0);
        assert_eq!(pid.output(), PID_OUTPUT_MIN);
        assert_eq!(pid.target(), 500);
        // derivative sees the full error again
        assert_eq!(pid.tick(400), 100 + 100 + 100);
    }
}
