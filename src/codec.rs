use crate::error::FormatError;

/// A record with a fixed binary layout.
///
/// `read` consumes the record from the front of `bytes` and leaves the rest
/// untouched, so trailing data past a fixed-size record is ignored by
/// [`decode`]. `write` appends the canonical encoding and cannot fail.
pub trait Codec: Sized {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError>;

    fn write(&self, out: &mut Vec<u8>);
}

pub fn decode<T: Codec>(bytes: &[u8]) -> Result<T, FormatError> {
    let mut bytes = bytes;
    T::read(&mut bytes)
}

pub fn encode<T: Codec>(record: &T) -> Vec<u8> {
    let mut out = Vec::new();
    record.write(&mut out);
    out
}
