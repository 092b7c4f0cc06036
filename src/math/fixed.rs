use super::logexp::{log2_approx, pow2_approx};

/// Fractional bits of the Q8.8 format.
pub const FP_FRAC_BITS: u32 = 8;
/// Whole bits, not counting the sign.
pub const FP_WHOLE_BITS: u32 = 7;
pub const FP_ONE: i32 = 1 << FP_FRAC_BITS;
pub const FP_WHOLE_MAX: i32 = (1 << FP_WHOLE_BITS) - 1;
pub const FP_FRAC_MAX: i32 = FP_ONE - 1;
/// Largest representable magnitude, `127 + 255/256`.
pub const FP_MAX: i32 = FP_WHOLE_MAX * FP_ONE + FP_FRAC_MAX;

/// Signed Q8.8 fixed-point value.
///
/// The range is symmetric, `[-FP_MAX, FP_MAX]`; every constructor saturates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fixed(i16);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(FP_ONE as i16);
    pub const MAX: Fixed = Fixed(FP_MAX as i16);
    pub const MIN: Fixed = Fixed(-FP_MAX as i16);

    /// Compile-time conversion, truncating toward zero.
    ///
    /// ```
    /// use geet_ecu::math::Fixed;
    /// const KP: Fixed = Fixed::from_f32(1.5);
    /// assert_eq!(KP.raw(), 384);
    /// ```
    pub const fn from_f32(value: f32) -> Fixed {
        // `as` truncates toward zero and saturates at the i32 bounds
        Fixed::saturating_from_raw((value * FP_ONE as f32) as i32)
    }

    pub const fn saturating_from_raw(raw: i32) -> Fixed {
        if raw > FP_MAX {
            Fixed::MAX
        } else if raw < -FP_MAX {
            Fixed::MIN
        } else {
            Fixed(raw as i16)
        }
    }

    pub const fn from_int(whole: i32) -> Fixed {
        Fixed::saturating_from_raw(whole.saturating_mul(FP_ONE))
    }

    /// Gain for a UI slider position, log scaled through [`pow2_approx`].
    pub fn from_ui_gain(ui: u8) -> Fixed {
        Fixed::saturating_from_raw(pow2_approx(ui) as i32)
    }

    /// Slider position that reproduces this gain; negative gains read as 0.
    pub fn to_ui_gain(self) -> u8 {
        log2_approx(self.0.max(0) as u16)
    }

    pub const fn raw(self) -> i16 {
        self.0
    }

    /// Whole part, rounded toward negative infinity.
    pub const fn to_int(self) -> i32 {
        (self.0 as i32) >> FP_FRAC_BITS
    }

    /// `self * value`, scaled back to integer units.
    ///
    /// Computed in 64 bits and saturated to `i32`; the right shift rounds
    /// toward negative infinity.
    pub const fn mul_int(self, value: i32) -> i32 {
        let product = (self.0 as i64 * value as i64) >> FP_FRAC_BITS;
        saturate_i32(product)
    }

    /// `self * value` without scaling back, i.e. a Q8.8 quantity in `value` units.
    pub const fn mul_int_unscaled(self, value: i32) -> i64 {
        self.0 as i64 * value as i64
    }
}

pub(crate) const fn saturate_i32(value: i64) -> i32 {
    if value > i32::MAX as i64 {
        i32::MAX
    } else if value < i32::MIN as i64 {
        i32::MIN
    } else {
        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_limits() {
        assert_eq!(FP_ONE, 256);
        assert_eq!(FP_MAX, 32767);
        assert_eq!(Fixed::MAX.raw(), i16::MAX);
        assert_eq!(Fixed::MIN.raw(), -i16::MAX);
    }

    #[test]
    fn from_f32_truncates_toward_zero() {
        const HALF: Fixed = Fixed::from_f32(0.5);
        assert_eq!(HALF.raw(), 128);
        assert_eq!(Fixed::from_f32(0.3).raw(), 76);
        assert_eq!(Fixed::from_f32(-0.3).raw(), -76);
        assert_eq!(Fixed::from_f32(-1.0).raw(), -256);
    }

    #[test]
    fn conversions_saturate() {
        assert_eq!(Fixed::from_f32(200.0), Fixed::MAX);
        assert_eq!(Fixed::from_f32(-200.0), Fixed::MIN);
        assert_eq!(Fixed::from_int(1000), Fixed::MAX);
        assert_eq!(Fixed::saturating_from_raw(-40_000), Fixed::MIN);
        assert_eq!(Fixed::from_int(3).to_int(), 3);
    }

    #[test]
    fn multiply_scales_back() {
        assert_eq!(Fixed::ONE.mul_int(1234), 1234);
        assert_eq!(Fixed::from_f32(0.25).mul_int(100), 25);
        assert_eq!(Fixed::from_f32(2.5).mul_int(-10), -25);
        assert_eq!(Fixed::MAX.mul_int(i32::MAX), i32::MAX);
        assert_eq!(Fixed::from_f32(0.25).mul_int_unscaled(100), 6400);
    }

    #[test]
    fn ui_gain_mapping() {
        assert_eq!(Fixed::from_ui_gain(0), Fixed::ZERO);
        // screen 80 is 2^8 in parameter space, i.e. 1.0
        assert_eq!(Fixed::from_ui_gain(80), Fixed::ONE);
        assert_eq!(Fixed::from_ui_gain(u8::MAX), Fixed::MAX);
        assert_eq!(Fixed::ONE.to_ui_gain(), 80);
        assert_eq!(Fixed::from_f32(-1.0).to_ui_gain(), 0);
    }
}
