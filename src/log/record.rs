//! Record codec
//!
//! ## Record Format
//! ```text
//! ┌──────────┬──────────────┬───────┬─────────┐
//! │ Len (4)  │ KeyLen (4)   │  Key  │  Value  │
//! └──────────┴──────────────┴───────┴─────────┘
//!             └──────────── Len bytes ───────┘
//! ```
//! All integers are big-endian. `Len` covers the encoded entry only, so a
//! framed record occupies `Len + 4` bytes.

use bytes::{BufMut, BytesMut};

use crate::error::{AtlasError, Result};

/// Size of the length prefix in front of every record
pub const LENGTH_PREFIX: u64 = 4;

/// Size of the key length inside an encoded entry
const KEY_LEN_SIZE: usize = 4;

/// A key/value pair as stored in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Length of the encoded entry, without the length prefix
    pub fn encoded_len(&self) -> usize {
        KEY_LEN_SIZE + self.key.len() + self.value.len()
    }

    /// Bytes this entry occupies once framed
    pub fn framed_len(&self) -> u64 {
        self.encoded_len() as u64 + LENGTH_PREFIX
    }

    /// Frame the entry: length prefix followed by the encoded entry
    pub fn encode(&self) -> BytesMut {
        let len = self.encoded_len();
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX as usize + len);
        buf.put_u32(len as u32);
        buf.put_u32(self.key.len() as u32);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
        buf
    }

    /// Decode an entry from its payload (the bytes after the length prefix)
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < KEY_LEN_SIZE {
            return Err(AtlasError::Corruption(format!(
                "record payload too short: {} bytes",
                payload.len()
            )));
        }

        let key_len =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;

        if payload.len() < KEY_LEN_SIZE + key_len {
            return Err(AtlasError::Corruption(format!(
                "record key truncated (expected {}, got {})",
                key_len,
                payload.len() - KEY_LEN_SIZE
            )));
        }

        let key = payload[KEY_LEN_SIZE..KEY_LEN_SIZE + key_len].to_vec();
        let value = payload[KEY_LEN_SIZE + key_len..].to_vec();

        Ok(Self { key, value })
    }
}
