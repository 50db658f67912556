//! Bit-tolerance comparison for floats and exact comparison for integers.
//!
//! Floats are mapped onto a monotonically ordered unsigned integer so that adjacent
//! representable values differ by one and `+0.0`/`-0.0` coincide. Two values are close when
//! their distance in that space is at most `1 << tolerance_bits`.

use std::fmt;

use thiserror::Error;

/// Allowed number of differing trailing mantissa bits, per float width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceBits {
    pub float: u32,
    pub double: u32,
}

pub const DEFAULT_FLOAT_TOLERANCE_BITS: u32 = 2;
pub const DEFAULT_DOUBLE_TOLERANCE_BITS: u32 = 2;

impl Default for ToleranceBits {
    fn default() -> Self {
        Self {
            float: DEFAULT_FLOAT_TOLERANCE_BITS,
            double: DEFAULT_DOUBLE_TOLERANCE_BITS,
        }
    }
}

impl fmt::Display for ToleranceBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f32={} bits, f64={} bits", self.float, self.double)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToleranceError {
    #[error("expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Float type that supports ordered-integer distance.
pub trait BitTolerance: Copy + PartialOrd + fmt::Display {
    /// Significand precision including the implicit bit (24 for `f32`, 53 for `f64`).
    const MANTISSA_BITS: u32;

    /// Distance in representable steps; `None` when the pair can never be close
    /// (one NaN, or an infinity paired with anything but itself).
    fn ordered_distance(self, other: Self, min_signal: Self) -> Option<u64>;

    fn tolerance_bits(bits: ToleranceBits) -> u32;

    fn to_f64(self) -> f64;
}

macro_rules! impl_bit_tolerance {
    ($float:ty, $bits:ty, $mantissa:expr, $field:ident) => {
        impl BitTolerance for $float {
            const MANTISSA_BITS: u32 = $mantissa;

            fn ordered_distance(self, other: Self, min_signal: Self) -> Option<u64> {
                const SIGN: $bits = 1 << (<$bits>::BITS - 1);

                fn ordered(value: $float) -> $bits {
                    let bits = value.to_bits();
                    if bits & SIGN != 0 {
                        (!bits).wrapping_add(1)
                    } else {
                        bits | SIGN
                    }
                }

                match (self.is_nan(), other.is_nan()) {
                    (true, true) => return Some(0),
                    (true, false) | (false, true) => return None,
                    _ => {}
                }
                if self.is_infinite() || other.is_infinite() {
                    return (self == other).then_some(0);
                }
                if self.abs() < min_signal && other.abs() < min_signal {
                    return Some(0);
                }
                Some(u64::from(ordered(self).abs_diff(ordered(other))))
            }

            fn tolerance_bits(bits: ToleranceBits) -> u32 {
                bits.$field
            }

            fn to_f64(self) -> f64 {
                f64::from(self)
            }
        }
    };
}

impl_bit_tolerance!(f32, u32, 24, float);
impl_bit_tolerance!(f64, u64, 53, double);

fn max_distance(tolerance_bits: u32) -> u64 {
    1u64.checked_shl(tolerance_bits).unwrap_or(u64::MAX)
}

/// Number of leading mantissa bits that still agree at `distance`.
pub fn matching_mantissa_bits<T: BitTolerance>(distance: u64) -> u32 {
    if distance == 0 {
        return T::MANTISSA_BITS;
    }
    let ceil_log2 = u64::BITS - (distance - 1).leading_zeros();
    T::MANTISSA_BITS.saturating_sub(ceil_log2)
}

pub fn close<T: BitTolerance>(expected: T, actual: T, tolerance_bits: u32, min_signal: T) -> bool {
    expected
        .ordered_distance(actual, min_signal)
        .is_some_and(|distance| distance <= max_distance(tolerance_bits))
}

pub fn close_f32(expected: f32, actual: f32, tolerance_bits: u32, min_signal: f32) -> bool {
    close(expected, actual, tolerance_bits, min_signal)
}

pub fn close_f64(expected: f64, actual: f64, tolerance_bits: u32, min_signal: f64) -> bool {
    close(expected, actual, tolerance_bits, min_signal)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatMismatch {
    pub index: usize,
    pub expected: f64,
    pub actual: f64,
    /// `None` when the pair is incomparable (NaN against a number, mismatched infinity).
    pub distance: Option<u64>,
}

/// Summary of an elementwise float comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatComparison {
    pub total: usize,
    pub tolerance_bits: u32,
    pub mismatches: usize,
    pub first_mismatch: Option<FloatMismatch>,
    pub worst_distance: u64,
    pub min_matching_mantissa_bits: u32,
}

impl FloatComparison {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

impl fmt::Display for FloatComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} elements outside 2^{} steps; worst distance {}, min matching mantissa bits {}",
            self.mismatches,
            self.total,
            self.tolerance_bits,
            self.worst_distance,
            self.min_matching_mantissa_bits
        )
    }
}

/// Compares `actual` against `expected` element by element.
pub fn all_close<T: BitTolerance>(
    expected: &[T],
    actual: &[T],
    tolerance_bits: u32,
    min_signal: T,
) -> Result<FloatComparison, ToleranceError> {
    if expected.len() != actual.len() {
        return Err(ToleranceError::LengthMismatch {
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    let limit = max_distance(tolerance_bits);
    let mut report = FloatComparison {
        total: expected.len(),
        tolerance_bits,
        mismatches: 0,
        first_mismatch: None,
        worst_distance: 0,
        min_matching_mantissa_bits: T::MANTISSA_BITS,
    };
    for (index, (&e, &a)) in expected.iter().zip(actual).enumerate() {
        let distance = e.ordered_distance(a, min_signal);
        match distance {
            Some(d) => {
                report.worst_distance = report.worst_distance.max(d);
                report.min_matching_mantissa_bits = report
                    .min_matching_mantissa_bits
                    .min(matching_mantissa_bits::<T>(d));
            }
            None => {
                report.worst_distance = u64::MAX;
                report.min_matching_mantissa_bits = 0;
            }
        }
        if distance.is_some_and(|d| d <= limit) {
            continue;
        }
        report.mismatches += 1;
        if report.first_mismatch.is_none() {
            report.first_mismatch = Some(FloatMismatch {
                index,
                expected: e.to_f64(),
                actual: a.to_f64(),
                distance,
            });
        }
    }
    Ok(report)
}

pub fn all_close_f32(
    expected: &[f32],
    actual: &[f32],
    tolerance_bits: u32,
    min_signal: f32,
) -> Result<FloatComparison, ToleranceError> {
    all_close(expected, actual, tolerance_bits, min_signal)
}

pub fn all_close_f64(
    expected: &[f64],
    actual: &[f64],
    tolerance_bits: u32,
    min_signal: f64,
) -> Result<FloatComparison, ToleranceError> {
    all_close(expected, actual, tolerance_bits, min_signal)
}

/// Index of the first element where the slices differ, for exact (integer) comparison.
pub fn first_difference<T: PartialEq>(
    expected: &[T],
    actual: &[T],
) -> Result<Option<usize>, ToleranceError> {
    if expected.len() != actual.len() {
        return Err(ToleranceError::LengthMismatch {
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    Ok(expected.iter().zip(actual).position(|(e, a)| e != a))
}
