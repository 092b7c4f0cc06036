//! Compile-time timing and capacity constants plus the runtime configuration.

use crate::calibration::CalibrationTable;
use crate::pid::PidConfig;

// ── Timing ────────────────────────────────────────────────────────────────────

/// ADC acquisition period.
pub const FAST_SAMPLE_INTERVAL_MS: u32 = 5;
/// Control period: RPM fold, PID loops, servo update.
pub const SLOW_SAMPLE_INTERVAL_MS: u32 = 50;
/// One data record per update period.
pub const UPDATE_INTERVAL_MS: u32 = 500;
/// The thermocouple converter needs ~220 ms per conversion.
pub const EGT_SAMPLE_INTERVAL_MS: u32 = 250;

pub const NO_OF_FAST_PER_SLOW: u32 = SLOW_SAMPLE_INTERVAL_MS / FAST_SAMPLE_INTERVAL_MS;
pub const NO_OF_SLOW_PER_RECORD: u32 = UPDATE_INTERVAL_MS / SLOW_SAMPLE_INTERVAL_MS;
pub const NO_OF_FAST_PER_RECORD: u32 = UPDATE_INTERVAL_MS / FAST_SAMPLE_INTERVAL_MS;
pub const NO_OF_SLOW_PER_EGT: u32 = EGT_SAMPLE_INTERVAL_MS / SLOW_SAMPLE_INTERVAL_MS;

const _: () = assert!(NO_OF_FAST_PER_SLOW * FAST_SAMPLE_INTERVAL_MS == SLOW_SAMPLE_INTERVAL_MS);
const _: () = assert!(NO_OF_FAST_PER_SLOW * NO_OF_SLOW_PER_RECORD == NO_OF_FAST_PER_RECORD);
const _: () = assert!(NO_OF_SLOW_PER_RECORD % NO_OF_SLOW_PER_EGT == 0);

// ── Sample capacities per record ──────────────────────────────────────────────

pub const FAST_SAMPLES_PER_UPDATE: usize = NO_OF_FAST_PER_RECORD as usize;
pub const SLOW_SAMPLES_PER_UPDATE: usize = NO_OF_SLOW_PER_RECORD as usize;
pub const EGT_SAMPLES_PER_UPDATE: usize = (NO_OF_SLOW_PER_RECORD / NO_OF_SLOW_PER_EGT) as usize;

// ── ADC ───────────────────────────────────────────────────────────────────────

/// Full scale of the 10-bit conversions the calibrations are written against.
pub const ADC_MAX: i32 = 1023;

// ── RPM ───────────────────────────────────────────────────────────────────────

/// Capture tick is `2^TICK_US_BITS` microseconds.
pub const TICK_US_BITS: u32 = 4;
pub const TICK_US: u32 = 1 << TICK_US_BITS;

pub const RPM_MAX_RPM: u32 = 6000;
pub const RPM_MIN_TICK_INTERVAL_MS: u32 = 60_000 / RPM_MAX_RPM;
/// Bound of the tick-interval array in a record.
pub const RPM_MAX_TICKS_PER_UPDATE: usize =
    1 + (UPDATE_INTERVAL_MS / RPM_MIN_TICK_INTERVAL_MS) as usize;
/// Slowest rotation whose interval still fits a `u16` of ticks.
pub const RPM_MIN_DETECTABLE: u32 = (60_000_000 / TICK_US) / u16::MAX as u32 + 1;

/// Range accepted for the RPM loop target.
pub const RPM_MIN_SET: i32 = 1000;
pub const RPM_MAX_SET: i32 = 4500;
/// Average RPM at or above which the engine counts as running.
pub const ENGINE_RUNNING_RPM: u32 = 300;
/// Default time without a flywheel pulse before feedback is declared lost.
pub const MAX_FEEDBACK_MS: u32 = 2000;

// ── Control outputs ───────────────────────────────────────────────────────────

pub const PID_OUTPUT_MIN: i32 = 0;
pub const PID_OUTPUT_MAX: i32 = 1023;

/// Vacuum loop target range, manifold absolute pressure in mbar.
pub const VAC_MIN_SET: i32 = 200;
pub const VAC_MAX_SET: i32 = 1050;

pub const NO_OF_SERVOS: usize = 3;
pub const SERVO_MIN_US: u16 = 750;
pub const SERVO_MAX_US: u16 = 2300;
pub const SERVO_RANGE_US: u16 = SERVO_MAX_US - SERVO_MIN_US;

/// Fast analog inputs: three user inputs, manifold pressure, temperature.
pub const NO_OF_FAST_CHANNELS: usize = 5;
pub const NO_OF_USER_INPUTS: usize = 3;

// ── Runtime configuration ─────────────────────────────────────────────────────

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysMode {
    /// Each servo follows the user input with the same index.
    #[default]
    Direct,
    /// RPM loop drives servo 0; the others follow their user inputs.
    PidRpm,
    /// RPM loop on servo 0 and vacuum loop on servo 1.
    PidRpmVacuum,
}

impl SysMode {
    pub const ALL: [SysMode; 3] = [SysMode::Direct, SysMode::PidRpm, SysMode::PidRpmVacuum];

    pub fn from_index(index: u8) -> Option<SysMode> {
        Self::ALL.get(index as usize).copied()
    }

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn uses_rpm_loop(self) -> bool {
        matches!(self, SysMode::PidRpm | SysMode::PidRpmVacuum)
    }

    pub const fn uses_vacuum_loop(self) -> bool {
        matches!(self, SysMode::PidRpmVacuum)
    }

    pub const fn name(self) -> &'static str {
        match self {
            SysMode::Direct => "DIRECT",
            SysMode::PidRpm => "PID_RPM",
            SysMode::PidRpmVacuum => "PID_RPM_VAC",
        }
    }
}

/// Where records are written; persisted with the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogFlags {
    pub serial_write: bool,
    pub serial_write_hex: bool,
    pub sdcard_write: bool,
    pub sdcard_write_hex: bool,
}

impl LogFlags {
    pub const fn to_bits(self) -> u8 {
        (self.serial_write as u8)
            | (self.serial_write_hex as u8) << 1
            | (self.sdcard_write as u8) << 2
            | (self.sdcard_write_hex as u8) << 3
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self {
            serial_write: bits & 0x01 != 0,
            serial_write_hex: bits & 0x02 != 0,
            sdcard_write: bits & 0x04 != 0,
            sdcard_write_hex: bits & 0x08 != 0,
        }
    }
}

impl Default for LogFlags {
    fn default() -> Self {
        Self {
            serial_write: true,
            serial_write_hex: false,
            sdcard_write: false,
            sdcard_write_hex: false,
        }
    }
}

/// Pulse-width limits of one servo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoCal {
    pub lower_us: u16,
    pub upper_us: u16,
}

impl Default for ServoCal {
    fn default() -> Self {
        Self {
            lower_us: SERVO_MIN_US,
            upper_us: SERVO_MAX_US,
        }
    }
}

/// Everything the scheduler needs at construction.
#[derive(Debug, Clone)]
pub struct EcuConfig {
    pub calibration: CalibrationTable,
    pub servo_cal: [ServoCal; NO_OF_SERVOS],
    pub rpm_loop: PidConfig,
    pub vacuum_loop: PidConfig,
    pub max_feedback_ms: u32,
    pub log: LogFlags,
    pub mode: SysMode,
}

impl Default for EcuConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationTable::DEFAULT,
            servo_cal: [ServoCal::default(); NO_OF_SERVOS],
            rpm_loop: PidConfig::RPM,
            vacuum_loop: PidConfig::VACUUM,
            max_feedback_ms: MAX_FEEDBACK_MS,
            log: LogFlags::default(),
            mode: SysMode::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_ratios() {
        assert_eq!(NO_OF_FAST_PER_SLOW, 10);
        assert_eq!(NO_OF_SLOW_PER_RECORD, 10);
        assert_eq!(FAST_SAMPLES_PER_UPDATE, 100);
        assert_eq!(EGT_SAMPLES_PER_UPDATE, 2);
    }

    #[test]
    fn rpm_bounds() {
        assert_eq!(RPM_MIN_TICK_INTERVAL_MS, 10);
        assert_eq!(RPM_MAX_TICKS_PER_UPDATE, 51);
        assert_eq!(RPM_MIN_DETECTABLE, 58);
    }

    #[test]
    fn log_flag_bits() {
        let flags = LogFlags {
            serial_write: true,
            serial_write_hex: false,
            sdcard_write: true,
            sdcard_write_hex: false,
        };
        assert_eq!(flags.to_bits(), 0b0101);
        assert_eq!(LogFlags::from_bits(flags.to_bits()), flags);
    }

    #[test]
    fn mode_index() {
        for mode in SysMode::ALL {
            assert_eq!(SysMode::from_index(mode.index()), Some(mode));
        }
        assert_eq!(SysMode::from_index(9), None);
    }
}
