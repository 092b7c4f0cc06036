//! Piecewise-linear base-2 log/exp between UI "screen space" and gain
//! "parameter space".
//!
//! Screen space is an 8-bit slider position, parameter space a 16-bit value.
//! Each doubling of the parameter is one segment of `STEP` screen positions
//! with linear interpolation inside the segment, so a coarse slider covers a
//! wide dynamic range with perceptually even steps. Parameters below
//! `PAR_MIN` collapse to screen position 0.

/// Bits of the parameter space.
pub const PAR_BITS: u32 = 16;
/// Bits of the screen space.
pub const SCR_BITS: u32 = 8;
/// Each segment spans `2^STEP_BITS` screen positions.
pub const STEP_BITS: u32 = SCR_BITS - 4;
pub const STEP: u32 = 1 << STEP_BITS;
/// Number of full segments across the screen space.
pub const STEPS: u32 = ((1 << SCR_BITS) - 1) / STEP;

const PAR_MIN_BITS: u32 = 3;
/// Smallest non-zero parameter.
pub const PAR_MIN: u16 = 1 << PAR_MIN_BITS;
pub const PAR_MAX: u16 = u16::MAX;

const SCR_LIM: u32 = 1 << SCR_BITS;
/// Screen offset that maps `PAR_MIN` to position 0.
pub const SCR_MIN: u32 = (SCR_LIM / PAR_BITS) * PAR_MIN_BITS;
/// Highest screen position that does not saturate.
pub const SCR_TOP: u8 = (SCR_LIM - 1 - SCR_MIN) as u8;

const Y2X_WHOLE_OFFSET: u32 = STEP_BITS - 2;

#[inline]
fn shift(base: u32, by: i32) -> u32 {
    if by < 0 {
        base >> (-by) as u32
    } else {
        base << by as u32
    }
}

/// Screen position to parameter, `2^x` shaped.
///
/// 0 maps to 0; positions above [`SCR_TOP`] saturate to [`PAR_MAX`].
pub fn pow2_approx(x: u8) -> u16 {
    let x = x as u32 + SCR_MIN;
    if x <= SCR_MIN {
        return 0;
    }
    if x >= SCR_LIM {
        return PAR_MAX;
    }

    let whole = x / STEP;
    let frac = x % STEP;
    let y = shift(frac + STEP, whole as i32 - STEP_BITS as i32);
    y.min(PAR_MAX as u32) as u16
}

/// Parameter to screen position, `log2(y)` shaped. Inverse of [`pow2_approx`].
pub fn log2_approx(y: u16) -> u8 {
    if y < PAR_MIN {
        return 0;
    }

    let base = y >> STEP_BITS;
    // bit length of the part above the interpolation bits
    let n = (u16::BITS - base.leading_zeros()) as i32;
    let frac = shift(y as u32, 1 - n);
    let whole = (Y2X_WHOLE_OFFSET as i32 + n) as u32 * STEP;

    let x = (whole + frac).max(SCR_MIN) - SCR_MIN;
    x.min(u8::MAX as u32) as u8
}
