//! On-disk record framing: `CCR1 | len u32 LE | crc32 u32 LE | bincode(Entry)`.

use crate::entry::Entry;
use crate::errors::CacheError;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

pub const RECORD_MAGIC: [u8; 4] = *b"CCR1";
pub const RECORD_EXT: &str = "rec";
const HEADER_LEN: usize = 12;

pub fn encode_record<K: Serialize, V: Serialize>(entry: &Entry<K, V>) -> Result<Vec<u8>, CacheError> {
    let payload = encode_to_vec(entry, standard())?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CacheError::Encode(format!("record too large: {} bytes", payload.len())))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&RECORD_MAGIC);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode_record<K: DeserializeOwned, V: DeserializeOwned>(
    bytes: &[u8],
) -> Result<Entry<K, V>, CacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::CorruptRecord(format!("short header: {} bytes", bytes.len())));
    }
    if bytes[0..4] != RECORD_MAGIC {
        return Err(CacheError::CorruptRecord("bad magic".into()));
    }
    let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let crc = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != len {
        return Err(CacheError::CorruptRecord(format!(
            "length mismatch: header says {len}, found {}",
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != crc {
        return Err(CacheError::CorruptRecord("checksum mismatch".into()));
    }
    let (entry, _) = decode_from_slice::<Entry<K, V>, _>(payload, standard())?;
    Ok(entry)
}

/// Stable file stem for a key: hex SHA-256 of its bincode encoding.
pub fn key_file_stem<K: Serialize>(key: &K) -> Result<String, CacheError> {
    let bytes = encode_to_vec(key, standard())?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
