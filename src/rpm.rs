//! Flywheel RPM from captured edge-to-edge intervals.

use crate::config::{RPM_MIN_DETECTABLE, SLOW_SAMPLE_INTERVAL_MS, TICK_US, TICK_US_BITS};

/// Ticks in one minute.
const TICKS_PER_MINUTE: u32 = 60_000_000 / TICK_US;

// ── Unit conversions ──────────────────────────────────────────────────────────

pub const fn rpm_from_ticks(ticks: u32) -> u32 {
    if ticks == 0 {
        0
    } else {
        TICKS_PER_MINUTE / ticks
    }
}

pub const fn ticks_from_rpm(rpm: u32) -> u32 {
    if rpm == 0 {
        0
    } else {
        TICKS_PER_MINUTE / rpm
    }
}

pub const fn rpm_from_ms(ms: u32) -> u32 {
    if ms == 0 {
        0
    } else {
        60_000 / ms
    }
}

pub const fn rpm_from_us(us: u32) -> u32 {
    if us == 0 {
        0
    } else {
        60_000_000 / us
    }
}

/// Average speed over one update period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RpmReading {
    pub rpm: u16,
    /// Intervals seen in the period, including those the record had no room for.
    pub ticks: u16,
}

/// Edge-interval accumulator and instantaneous speed tracker.
#[derive(Debug, Clone)]
pub struct RpmEstimator {
    last_edge_us: Option<u32>,
    pending: Option<u16>,
    total_ticks: u32,
    tick_count: u32,
    instant_rpm: u16,
    ms_since_edge: u32,
}

impl RpmEstimator {
    pub const fn new() -> Self {
        Self {
            last_edge_us: None,
            pending: None,
            total_ticks: 0,
            tick_count: 0,
            instant_rpm: 0,
            ms_since_edge: 0,
        }
    }

    /// Register a flywheel edge at `now_us` (free-running, wrapping).
    ///
    /// Returns the interval in ticks when it is measurable. The first edge
    /// only starts a measurement; an interval longer than `u16::MAX` ticks
    /// restarts it.
    pub fn on_edge(&mut self, now_us: u32) -> Option<u16> {
        let Some(last) = self.last_edge_us.replace(now_us) else {
            return None;
        };
        let ticks = now_us.wrapping_sub(last) >> TICK_US_BITS;
        if ticks == 0 || ticks > u16::MAX as u32 {
            return None;
        }

        self.total_ticks = self.total_ticks.saturating_add(ticks);
        self.tick_count = self.tick_count.saturating_add(1);
        self.pending = Some(ticks as u16);
        self.ms_since_edge = 0;
        Some(ticks as u16)
    }

    /// Fold the newest interval into the instantaneous value. Call once per
    /// slow tick; returns whether an edge arrived since the previous call.
    pub fn slow_update(&mut self) -> bool {
        self.ms_since_edge = self.ms_since_edge.saturating_add(SLOW_SAMPLE_INTERVAL_MS);

        if let Some(ticks) = self.pending.take() {
            self.instant_rpm = rpm_from_ticks(ticks as u32).min(u16::MAX as u32) as u16;
            self.ms_since_edge = 0;
            return true;
        }

        if self.instant_rpm > 0 {
            let implied_ms = rpm_from_ms(self.instant_rpm as u32);
            if self.ms_since_edge > implied_ms {
                self.instant_rpm -= self.instant_rpm / 4;
                if (self.instant_rpm as u32) < RPM_MIN_DETECTABLE {
                    self.instant_rpm = 0;
                }
            }
        }
        false
    }

    /// Close the update period and start a new one.
    pub fn finalize(&mut self) -> RpmReading {
        let reading = if self.tick_count == 0 || self.total_ticks == 0 {
            RpmReading::default()
        } else {
            let rpm = TICKS_PER_MINUTE as u64 * self.tick_count as u64 / self.total_ticks as u64;
            RpmReading {
                rpm: rpm.min(u16::MAX as u64) as u16,
                ticks: self.tick_count.min(u16::MAX as u32) as u16,
            }
        };
        self.total_ticks = 0;
        self.tick_count = 0;
        reading
    }

    pub const fn instant_rpm(&self) -> u16 {
        self.instant_rpm
    }

    pub const fn ms_since_edge(&self) -> u32 {
        self.ms_since_edge
    }
}

impl Default for RpmEstimator {
    fn default() -> Self {
        Self::new()
    }
}
