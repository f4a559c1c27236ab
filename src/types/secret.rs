use std::fmt;

use uuid::Uuid;
use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::Codec;
use crate::constants::{
    CIPHER_BLOCK_LEN, SECRET_ENTRY_HEADER_LEN, SECRET_TABLE_GUID, SECRET_TABLE_HEADER_LEN,
};
use crate::error::FormatError;
use crate::utils;

/// Header preceding the ciphertext handed to `LAUNCH_SECRET`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes)]
pub struct SecretHeader {
    pub flags: little_endian::U32,
    pub iv: [u8; 16],
    pub mac: [u8; 32],
}

/// One GUID-keyed secret.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretEntry {
    #[zeroize(skip)]
    pub guid: Uuid,
    pub data: Vec<u8>,
}

impl SecretEntry {
    pub fn new(guid: Uuid, data: impl Into<Vec<u8>>) -> Self {
        SecretEntry { guid, data: data.into() }
    }

    fn encoded_len(&self) -> usize {
        SECRET_ENTRY_HEADER_LEN + self.data.len()
    }
}

impl fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEntry")
            .field("guid", &self.guid)
            .field("len", &self.data.len())
            .finish()
    }
}

/// The table the guest firmware looks for in the injected secret page.
///
/// Layout: table GUID, total length, then `guid | len | data` entries where
/// `len` counts the 20-byte entry header. The encoding is zero padded to the
/// cipher block size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretTable {
    pub entries: Vec<SecretEntry>,
}

impl SecretTable {
    pub fn new(entries: Vec<SecretEntry>) -> Self {
        SecretTable { entries }
    }

    /// Length of the table before padding.
    pub fn table_len(&self) -> usize {
        SECRET_TABLE_HEADER_LEN + self.entries.iter().map(SecretEntry::encoded_len).sum::<usize>()
    }

    pub fn get(&self, guid: &Uuid) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| &e.guid == guid)
            .map(|e| e.data.as_slice())
    }
}

impl Codec for SecretTable {
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        let start = bytes.len();
        let guid = utils::read_array::<16>(bytes).ok_or(FormatError::Truncated {
            expected: SECRET_TABLE_HEADER_LEN,
            actual: start,
        })?;
        if Uuid::from_bytes_le(guid) != Uuid::from_u128(SECRET_TABLE_GUID) {
            return Err(FormatError::InvalidField {
                field: "secret table guid",
                reason: Uuid::from_bytes_le(guid).to_string(),
            });
        }
        let len = utils::read_record::<little_endian::U32>(bytes)?.get() as usize;
        if len < SECRET_TABLE_HEADER_LEN || len > start {
            return Err(FormatError::Truncated { expected: len.max(SECRET_TABLE_HEADER_LEN), actual: start });
        }

        let mut body = utils::read_bytes(bytes, len - SECRET_TABLE_HEADER_LEN).unwrap_or_default();
        let mut entries = Vec::new();
        while !body.is_empty() {
            let guid = utils::read_array::<16>(&mut body);
            let entry_len = utils::read_from_bytes::<little_endian::U32>(&mut body);
            let (Some(guid), Some(entry_len)) = (guid, entry_len) else {
                return Err(FormatError::InvalidField {
                    field: "secret entry",
                    reason: "truncated entry header".into(),
                });
            };
            let data_len = (entry_len.get() as usize)
                .checked_sub(SECRET_ENTRY_HEADER_LEN)
                .filter(|&n| n <= body.len())
                .ok_or_else(|| FormatError::InvalidField {
                    field: "secret entry",
                    reason: format!("length {} out of bounds", entry_len.get()),
                })?;
            let data = utils::read_bytes(&mut body, data_len).unwrap_or_default();
            entries.push(SecretEntry::new(Uuid::from_bytes_le(guid), data));
        }

        // Skip the padding up to the block boundary when it is present.
        let padding = len.next_multiple_of(CIPHER_BLOCK_LEN) - len;
        let _ = utils::read_bytes(bytes, padding.min(bytes.len()));
        Ok(SecretTable { entries })
    }

    fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        let len = self.table_len();
        out.extend_from_slice(&Uuid::from_u128(SECRET_TABLE_GUID).to_bytes_le());
        out.extend_from_slice(&(len as u32).to_le_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.guid.to_bytes_le());
            out.extend_from_slice(&(entry.encoded_len() as u32).to_le_bytes());
            out.extend_from_slice(&entry.data);
        }
        out.resize(start + len.next_multiple_of(CIPHER_BLOCK_LEN), 0);
    }
}

/// Header and ciphertext ready for `LAUNCH_SECRET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPackage {
    pub header: SecretHeader,
    pub ciphertext: Vec<u8>,
}

impl Codec for SecretPackage {
    /// The ciphertext runs to the end of the buffer.
    fn read(bytes: &mut &[u8]) -> Result<Self, FormatError> {
        let header = utils::read_record::<SecretHeader>(bytes)?;
        let ciphertext = bytes.to_vec();
        *bytes = &[];
        Ok(SecretPackage { header, ciphertext })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(&self.ciphertext);
    }
}
