use std::time::SystemTime;

use x509_cert::Certificate as X509Inner;

use crate::error::FormatError;

pub mod crypto;
pub mod hash;
pub mod kdf;

pub trait Expireable {
    fn valid_at(&self, timestamp: SystemTime) -> bool;
}

impl Expireable for X509Inner {
    /// Validate a single certificate not_before/not_after
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        let nb = self.tbs_certificate.validity.not_before.to_system_time();
        let na = self.tbs_certificate.validity.not_after.to_system_time();
        !(timestamp <= nb || na <= timestamp)
    }
}

/// Removes `std::mem::size_of<T>()` bytes from the front of `bytes` and returns it as a `T`.
///
/// Returns `None` and leaves `bytes` unchanged if it isn't long enough.
pub fn read_from_bytes<T: zerocopy::FromBytes>(bytes: &mut &[u8]) -> Option<T> {
    let front = T::read_from_prefix(bytes)?;
    *bytes = &bytes[std::mem::size_of::<T>()..];
    Some(front)
}

/// Like [`read_from_bytes`] but reports a short buffer as [`FormatError::Truncated`].
pub fn read_record<T: zerocopy::FromBytes>(bytes: &mut &[u8]) -> Result<T, FormatError> {
    let actual = bytes.len();
    read_from_bytes(bytes).ok_or(FormatError::Truncated {
        expected: std::mem::size_of::<T>(),
        actual,
    })
}

/// Removes a slice of `size` from the front of `bytes` and returns it.
///
/// Returns `None` and leaves `bytes` unchanged if it isn't long enough.
pub fn read_bytes<'a>(bytes: &mut &'a [u8], size: usize) -> Option<&'a [u8]> {
    if bytes.len() < size {
        return None;
    }
    let (front, rest) = bytes.split_at(size);
    *bytes = rest;
    Some(front)
}

/// Removes a slice of `N` from the front of `bytes` and copies it into an owned `[u8; N]`.
pub fn read_array<const N: usize>(bytes: &mut &[u8]) -> Option<[u8; N]> {
    let front = read_bytes(bytes, N)?;
    let mut res = [0u8; N];
    res.copy_from_slice(front);
    Some(res)
}

/// Copy a little-endian integer field into a big-endian vector, keeping `len` bytes.
pub fn le_to_be(field: &[u8], len: usize) -> Vec<u8> {
    field[..len.min(field.len())].iter().rev().copied().collect()
}

/// Write a big-endian integer into a zeroed little-endian field.
pub fn be_to_le(value: &[u8], field: &mut [u8]) {
    field.fill(0);
    for (dst, src) in field.iter_mut().zip(value.iter().rev()) {
        *dst = *src;
    }
}

/// Whether every byte of `bytes` past `used` is zero.
pub fn zero_padded(bytes: &[u8], used: usize) -> bool {
    bytes.get(used..).map_or(true, |pad| pad.iter().all(|&b| b == 0))
}

/// Decode a hex field that must be exactly `N` bytes.
pub fn hex_array<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], FormatError> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(value).map_err(|e| FormatError::InvalidField {
        field,
        reason: e.to_string(),
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| FormatError::InvalidField {
        field,
        reason: format!("expected {} bytes, got {}", N, b.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::little_endian;

    #[test]
    fn short_reads_leave_buffer_untouched() {
        let data = [1u8, 2, 3];
        let mut bytes = &data[..];
        assert!(read_bytes(&mut bytes, 4).is_none());
        assert_eq!(bytes.len(), 3);

        let err = read_record::<little_endian::U32>(&mut bytes).unwrap_err();
        assert_eq!(err, FormatError::Truncated { expected: 4, actual: 3 });

        assert_eq!(read_array::<2>(&mut bytes), Some([1, 2]));
        assert_eq!(bytes, &[3]);
    }

    #[test]
    fn endian_helpers_are_inverse() {
        let mut field = [0xffu8; 8];
        be_to_le(&[0x01, 0x02, 0x03], &mut field);
        assert_eq!(field, [0x03, 0x02, 0x01, 0, 0, 0, 0, 0]);
        assert_eq!(le_to_be(&field, 3), vec![0x01, 0x02, 0x03]);
        assert!(zero_padded(&field, 3));
        assert!(!zero_padded(&field, 2));
    }

    #[test]
    fn hex_fields_must_have_exact_length() {
        assert_eq!(hex_array::<2>("policy", "0x0102").unwrap(), [1, 2]);
        assert!(matches!(
            hex_array::<2>("policy", "010203"),
            Err(FormatError::InvalidField { field: "policy", .. })
        ));
        assert!(hex_array::<1>("meas_ctx", "zz").is_err());
    }

    #[test]
    fn only_one_hex_prefix_is_stripped() {
        assert_eq!(hex_array::<1>("build_id", "0x0f").unwrap(), [0x0f]);
        assert!(matches!(
            hex_array::<1>("build_id", "0x0x0f"),
            Err(FormatError::InvalidField { field: "build_id", .. })
        ));
    }
}
