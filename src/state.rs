//! Plain data passed between the sampling path and its readers.
//!
//! All types are `Copy` so they can leave a critical section by value.

use crate::calibration::{CalibrationTable, SensorId};
use crate::config::{LogFlags, SysMode, ENGINE_RUNNING_RPM, NO_OF_FAST_CHANNELS, NO_OF_SERVOS};
use crate::pid::PidTelemetry;
use crate::records::{Channel, DataAverages};

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Thermocouple converter result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EgtReading {
    /// Hot junction temperature in 0.25 C steps.
    QuarterDegrees(u16),
    /// The converter reports no thermocouple attached.
    OpenCircuit,
}

/// Everything read from the hardware for one fast tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorFrame {
    /// Raw 10-bit conversions in [`Channel::FAST`] order.
    pub analog: [u16; NO_OF_FAST_CHANNELS],
    /// Newest load cell conversion, when one completed since the last frame.
    pub torque_counts: Option<i16>,
    /// Newest thermocouple conversion, when one completed since the last frame.
    pub egt: Option<EgtReading>,
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickOutcome {
    pub slow: bool,
    pub record_ready: bool,
    /// New servo pulse widths in microseconds, on slow ticks.
    pub servo_us: Option<[u16; NO_OF_SERVOS]>,
}

// ── Derived state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EcuStatus {
    pub engine_running: bool,
    pub feedback_lost: bool,
    pub egt_fault: bool,
}

/// One record's averages in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineSummary {
    pub timestamp_ms: u32,
    pub map_mbar: i32,
    pub tmp_c: i32,
    pub egt_c: i32,
    pub torque_dnm: i32,
    pub power_w: i32,
    pub rpm: u16,
    pub ticks: u16,
}

impl EngineSummary {
    /// Channels without samples in the record read as 0.
    pub fn from_averages(avg: &DataAverages, calibration: &CalibrationTable) -> Self {
        let calibrated = |channel: Channel, sensor: SensorId| {
            let a = avg.channel(channel);
            if a.count == 0 {
                0
            } else {
                calibration.map(sensor, a.mean as i32)
            }
        };

        let torque_dnm = calibrated(Channel::Trq, SensorId::Trq);
        // P = T * 2 pi n / 60, torque in 0.1 Nm
        let power_w = torque_dnm as i64 * avg.rpm as i64 * 1047 / 100_000;

        Self {
            timestamp_ms: avg.timestamp_ms,
            map_mbar: calibrated(Channel::Map, SensorId::Map),
            tmp_c: calibrated(Channel::Tmp, SensorId::Tmp),
            egt_c: avg.channel(Channel::Egt).mean as i32 / 4,
            torque_dnm,
            power_w: crate::math::fixed::saturate_i32(power_w),
            rpm: avg.rpm,
            ticks: avg.rpm_ticks,
        }
    }

    pub fn engine_running(&self) -> bool {
        self.rpm as u32 >= ENGINE_RUNNING_RPM
    }
}

/// What the logging side needs after a record boundary, copied out in one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub mode: SysMode,
    pub log: LogFlags,
    pub status: EcuStatus,
    pub averages: DataAverages,
    pub summary: EngineSummary,
    pub rpm_pid: PidTelemetry,
    pub vacuum_pid: PidTelemetry,
    pub servo_us: [u16; NO_OF_SERVOS],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ChannelAverage;

    #[test]
    fn summary_units() {
        let mut avg = DataAverages {
            timestamp_ms: 1500,
            rpm: 3000,
            rpm_ticks: 50,
            ..Default::default()
        };
        avg.channels[Channel::Map as usize] = ChannelAverage { mean: 969, count: 100 };
        avg.channels[Channel::Tmp as usize] = ChannelAverage { mean: 307, count: 100 };
        avg.channels[Channel::Egt as usize] = ChannelAverage { mean: 2401, count: 2 };
        avg.channels[Channel::Trq as usize] = ChannelAverage { mean: 4000, count: 10 };

        let s = EngineSummary::from_averages(&avg, &CalibrationTable::DEFAULT);
        assert_eq!(s.timestamp_ms, 1500);
        assert_eq!(s.map_mbar, 200);
        assert_eq!(s.tmp_c, 100);
        assert_eq!(s.egt_c, 600);
        assert_eq!(s.torque_dnm, 100);
        // 10 Nm at 3000 rpm
        assert_eq!(s.power_w, 3141);
        assert!(s.engine_running());
    }

    #[test]
    fn empty_channels_read_zero() {
        let s = EngineSummary::from_averages(&DataAverages::default(), &CalibrationTable::DEFAULT);
        assert_eq!(s, EngineSummary::default());
        assert!(!s.engine_running());
    }
}
