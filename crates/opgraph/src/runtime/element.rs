//! Defines the scalar element trait implemented by host-side tensor values.

use std::fmt::{Debug, Display};

use crate::backend::spec::DType;

/// Native scalar that can be moved in and out of a tensor literal.
///
/// Values are encoded little-endian, `size_in_bytes` of [`Element::DTYPE`] bytes each.
pub trait Element: Copy + Debug + Display + PartialEq + PartialOrd + Send + Sync + 'static {
    /// Element type tag carried by tensors holding this scalar.
    const DTYPE: DType;

    /// Appends the little-endian encoding of `self` to `out`.
    fn write_le(&self, out: &mut Vec<u8>);

    /// Decodes one value; `bytes` holds exactly `DTYPE.size_in_bytes()` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn write_le(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(
    i8 => Si8,
    u8 => Ui8,
    i16 => Si16,
    u16 => Ui16,
    i32 => Si32,
    u32 => Ui32,
    i64 => Si64,
    u64 => Ui64,
    f32 => F32,
    f64 => F64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_dtype_sizes() {
        fn width<T: Element>(value: T) -> usize {
            let mut out = Vec::new();
            value.write_le(&mut out);
            assert_eq!(out.len(), T::DTYPE.size_in_bytes());
            out.len()
        }
        assert_eq!(width(-1i8), 1);
        assert_eq!(width(u16::MAX), 2);
        assert_eq!(width(u32::MAX), 4);
        assert_eq!(width(-17_179_887_632i64), 8);
        assert_eq!(width(-0.0f32), 4);
        assert_eq!(width(f64::INFINITY), 8);
    }

    #[test]
    fn negative_zero_keeps_its_sign_bit() {
        let mut out = Vec::new();
        (-0.0f32).write_le(&mut out);
        let decoded = f32::read_le(&out);
        assert!(decoded.is_sign_negative());
        assert_eq!(decoded, 0.0);
    }
}
