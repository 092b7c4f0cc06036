//! Two-point linear calibration from raw converter counts to physical units.

use crate::config::ADC_MAX;
use crate::error::Error;

/// Two calibration points of a linear sensor transfer function.
///
/// The points need not be ordered; an inverted sensor simply has
/// `raw_high < raw_low` or `unit_high < unit_low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationPoints {
    raw_low: i32,
    raw_high: i32,
    unit_low: i32,
    unit_high: i32,
}

impl CalibrationPoints {
    pub const fn new(
        raw_low: i32,
        raw_high: i32,
        unit_low: i32,
        unit_high: i32,
    ) -> Result<Self, Error> {
        if raw_low == raw_high {
            return Err(Error::ZeroCalibrationSpan);
        }
        Ok(Self {
            raw_low,
            raw_high,
            unit_low,
            unit_high,
        })
    }

    /// Identity over the converter range.
    pub const fn identity() -> Self {
        Self {
            raw_low: 0,
            raw_high: ADC_MAX,
            unit_low: 0,
            unit_high: ADC_MAX,
        }
    }

    /// Map a raw reading to units: add one half, then truncate toward zero.
    ///
    /// Extrapolates past the calibration points. Intermediates are 64 bit, so
    /// any `i32` reading and span is safe.
    pub const fn map_to_units(&self, raw: i32) -> i32 {
        let mut num = (raw as i64 - self.raw_low as i64)
            * (self.unit_high as i64 - self.unit_low as i64);
        let mut den = self.raw_high as i64 - self.raw_low as i64;
        if den < 0 {
            num = -num;
            den = -den;
        }
        // trunc((num / den + unit_low) + 1/2), kept in integers
        let scaled = 2 * (num + self.unit_low as i64 * den) + den;
        let out = scaled / (2 * den);
        crate::math::fixed::saturate_i32(out)
    }

    /// Mapped values at the converter rails, `(at raw 0, at raw ADC_MAX)`,
    /// ordered as `(min, max)`.
    pub const fn bounds(&self) -> (i32, i32) {
        let at_zero = self.map_to_units(0);
        let at_max = self.map_to_units(ADC_MAX);
        if at_zero <= at_max {
            (at_zero, at_max)
        } else {
            (at_max, at_zero)
        }
    }
}

/// Sensors that go through a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorId {
    /// Manifold absolute pressure, mbar.
    Map,
    /// Intake/coolant temperature, degrees Celsius.
    Tmp,
    /// Shaft torque from the load cell, deci-newton metres.
    Trq,
}

impl SensorId {
    pub const ALL: [SensorId; 3] = [SensorId::Map, SensorId::Tmp, SensorId::Trq];
}

/// Lemark LMS184 1 bar MAP sensor: 969 counts at 200 mbar, 39 counts at 1050 mbar.
pub const MAP_LMS184_1BAR: CalibrationPoints = match CalibrationPoints::new(969, 39, 200, 1050) {
    Ok(c) => c,
    Err(_) => panic!("zero span"),
};

/// TMP36 at 5 V reference: 0.5 V at 0 C, 10 mV per degree.
pub const TMP_TMP36: CalibrationPoints = match CalibrationPoints::new(102, 307, 0, 100) {
    Ok(c) => c,
    Err(_) => panic!("zero span"),
};

/// Load cell zero and a 50 Nm reference, in HX711 16-bit counts.
pub const TRQ_DEFAULT: CalibrationPoints = match CalibrationPoints::new(0, 20_000, 0, 500) {
    Ok(c) => c,
    Err(_) => panic!("zero span"),
};

/// Calibration per [`SensorId`], resolved at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTable {
    points: [CalibrationPoints; 3],
}

impl CalibrationTable {
    pub const DEFAULT: CalibrationTable = CalibrationTable {
        points: [MAP_LMS184_1BAR, TMP_TMP36, TRQ_DEFAULT],
    };

    pub const fn get(&self, sensor: SensorId) -> &CalibrationPoints {
        &self.points[sensor as usize]
    }

    pub fn set(&mut self, sensor: SensorId, points: CalibrationPoints) {
        self.points[sensor as usize] = points;
    }

    pub const fn map(&self, sensor: SensorId, raw: i32) -> i32 {
        self.get(sensor).map_to_units(raw)
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal(rl: i32, rh: i32, ul: i32, uh: i32) -> CalibrationPoints {
        CalibrationPoints::new(rl, rh, ul, uh).unwrap()
    }

    #[test]
    fn rejects_zero_span() {
        assert_eq!(
            CalibrationPoints::new(512, 512, 0, 100),
            Err(Error::ZeroCalibrationSpan)
        );
    }

    #[test]
    fn reference_scenario() {
        let c = cal(51, 1023, 150, 1047);
        assert_eq!(c.map_to_units(51), 150);
        assert_eq!(c.map_to_units(1023), 1047);
        // 598.5 exactly, rounds half up
        assert_eq!(c.map_to_units(537), 599);
    }

    #[test]
    fn extrapolates_to_the_rails() {
        let c = cal(51, 1023, 150, 1047);
        let (min, max) = c.bounds();
        assert_eq!(min, c.map_to_units(0));
        assert_eq!(max, c.map_to_units(ADC_MAX));
        // 150 - 51 * 897 / 972 = 102.93...
        assert_eq!(min, 103);
        assert_eq!(max, 1047);
    }

    #[test]
    fn negative_outputs_truncate_toward_zero() {
        // -49.756 + 0.5 = -49.256
        assert_eq!(TMP_TMP36.map_to_units(0), -49);
        assert_eq!(TMP_TMP36.bounds().0, -49);
        // -0.488 + 0.5 = 0.012
        assert_eq!(TMP_TMP36.map_to_units(101), 0);
        // -1.463 + 0.5 = -0.963
        assert_eq!(TMP_TMP36.map_to_units(99), 0);
        // -1.951 + 0.5 = -1.451
        assert_eq!(TMP_TMP36.map_to_units(98), -1);
    }

    #[test]
    fn monotonic_over_adc_range() {
        for c in [cal(51, 1023, 150, 1047), cal(0, 1023, -40, 2000), TMP_TMP36] {
            let mut last = c.map_to_units(0);
            for raw in 1..=ADC_MAX {
                let v = c.map_to_units(raw);
                assert!(v >= last, "raw {} gave {} after {}", raw, v, last);
                last = v;
            }
            assert_eq!(c.bounds(), (c.map_to_units(0), c.map_to_units(ADC_MAX)));
        }
    }

    #[test]
    fn inverted_sensor() {
        let c = MAP_LMS184_1BAR;
        assert_eq!(c.map_to_units(969), 200);
        assert_eq!(c.map_to_units(39), 1050);
        let mut last = c.map_to_units(0);
        for raw in 1..=ADC_MAX {
            let v = c.map_to_units(raw);
            assert!(v <= last);
            last = v;
        }
        let (min, max) = c.bounds();
        assert_eq!(min, c.map_to_units(ADC_MAX));
        assert_eq!(max, c.map_to_units(0));
    }

    #[test]
    fn wide_inputs_do_not_overflow() {
        let c = cal(-8_000_000, 8_000_000, -2000, 2000);
        assert_eq!(c.map_to_units(8_000_000), 2000);
        assert_eq!(c.map_to_units(0), 0);
    }

    #[test]
    fn table_lookup() {
        let mut table = CalibrationTable::DEFAULT;
        assert_eq!(table.map(SensorId::Tmp, 102), 0);
        table.set(SensorId::Tmp, cal(0, 1023, 0, 1023));
        assert_eq!(table.map(SensorId::Tmp, 777), 777);
        assert_eq!(table.get(SensorId::Map), &MAP_LMS184_1BAR);
    }
}
