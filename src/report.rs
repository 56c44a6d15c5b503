//! Opaque report payloads.
//!
//! Report contents are never interpreted. A [`ReportData`] is a byte buffer plus
//! the width of the element type it was built from, so callers can hand over
//! `&[u16]` or `&[f32]` the same way they hand over `&[u8]`.

use std::fmt;

/// Fixed-width element types accepted by [`ReportData::from_elements`].
///
/// Elements are laid out little-endian, matching what HID hosts put on the wire.
pub trait ReportElement: Copy {
    /// Element width in bytes.
    const STRIDE: usize;

    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_report_element {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ReportElement for $ty {
                const STRIDE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_report_element!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Raw report bytes plus element stride.
#[derive(Clone, PartialEq, Eq)]
pub struct ReportData {
    bytes: Vec<u8>,
    stride: usize,
}

impl ReportData {
    /// Build from a slice of fixed-width elements.
    pub fn from_elements<T: ReportElement>(elements: &[T]) -> Self {
        let mut bytes = Vec::with_capacity(elements.len() * T::STRIDE);
        for e in elements {
            e.write_le(&mut bytes);
        }
        Self {
            bytes,
            stride: T::STRIDE,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Width in bytes of the element type this buffer was built from.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride.max(1)
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for ReportData {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            stride: 1,
        }
    }
}

impl From<Vec<u8>> for ReportData {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes, stride: 1 }
    }
}

impl From<&[u8]> for ReportData {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for ReportData {
    fn from(bytes: [u8; N]) -> Self {
        Self::from(bytes.to_vec())
    }
}

impl AsRef<[u8]> for ReportData {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ReportData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReportData({:02x?}, stride={})", self.bytes, self.stride())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_elements_are_little_endian() {
        let data = ReportData::from_elements(&[0x0102u16, 0xa0b0]);
        assert_eq!(data.as_bytes(), &[0x02, 0x01, 0xb0, 0xa0]);
        assert_eq!(data.stride(), 2);
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn float_elements_keep_bit_pattern() {
        let data = ReportData::from_elements(&[1.0f32]);
        assert_eq!(data.as_bytes(), &1.0f32.to_le_bytes());
        assert_eq!(data.stride(), 4);
    }

    #[test]
    fn byte_buffers_have_unit_stride() {
        let data = ReportData::from([0x01u8, 0x02]);
        assert_eq!(data.stride(), 1);
        assert_eq!(data.into_bytes(), vec![0x01, 0x02]);
        assert_eq!(ReportData::default().stride(), 1);
        assert!(ReportData::default().is_empty());
    }

    #[test]
    fn default_equals_empty_byte_buffer() {
        assert_eq!(ReportData::default(), ReportData::from(Vec::<u8>::new()));
        assert_ne!(ReportData::default(), ReportData::from_elements::<u16>(&[]));
    }
}
