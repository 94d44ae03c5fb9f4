//! Encodings for the values the store writes.
//!
//! Two families:
//!
//! - JSON for [`PipFingerprintKeys`] and the opaque input documents.
//! - Little-endian binary for the metadata blobs ([`CacheMissInfo`] lists and
//!   the [`LruEntriesMap`]). Strings in binary blobs carry a 7-bit varint byte
//!   length prefix followed by UTF-8.
//!
//! Decoders never trust counts or lengths read from the blob: every read is
//! checked against the bytes remaining.

use crate::lru::LruEntriesMap;
use crate::records::{CacheMissInfo, CacheMissKind, PipFingerprintKeys};
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialized size of one [`CacheMissInfo`].
const CACHE_MISS_INFO_LEN: usize = 5;

/// Smallest serialized LRU entry: one length byte, empty key, timestamp.
const MIN_LRU_ENTRY_LEN: usize = 1 + 8;

/// Serialize a value to JSON text.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::codec(e.to_string()))
}

/// Parse a value from JSON text.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::codec(e.to_string()))
}

/// Encode fingerprint keys as JSON.
pub fn encode_pip_fingerprint_keys(keys: &PipFingerprintKeys) -> Result<String> {
    encode_json(keys)
}

/// Decode fingerprint keys from JSON.
pub fn decode_pip_fingerprint_keys(bytes: &[u8]) -> Result<PipFingerprintKeys> {
    decode_json(bytes)
}

/// Encode a cache-miss list: `[count: i32]` then `[task_id: u32][kind: u8]` per entry.
pub fn encode_cache_miss_list(list: &[CacheMissInfo]) -> Result<Vec<u8>> {
    let count = i32::try_from(list.len())
        .map_err(|_| Error::codec(format!("cache miss list too long: {}", list.len())))?;

    let mut buf = BytesMut::with_capacity(4 + list.len() * CACHE_MISS_INFO_LEN);
    buf.put_i32_le(count);
    for info in list {
        buf.put_u32_le(info.task_id);
        buf.put_u8(info.kind.into());
    }
    Ok(buf.to_vec())
}

/// Decode a cache-miss list written by [`encode_cache_miss_list`].
pub fn decode_cache_miss_list(mut bytes: &[u8]) -> Result<Vec<CacheMissInfo>> {
    let count = read_count(&mut bytes, CACHE_MISS_INFO_LEN)?;

    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        ensure_remaining(bytes, CACHE_MISS_INFO_LEN, "cache miss entry")?;
        let task_id = bytes.get_u32_le();
        let kind = CacheMissKind::try_from(bytes.get_u8())?;
        list.push(CacheMissInfo::new(task_id, kind));
    }
    ensure_consumed(bytes)?;
    Ok(list)
}

/// Encode an LRU map: `[count: i32]` then `[key][timestamp: i64]` per entry.
pub fn encode_lru_entries(map: &LruEntriesMap) -> Result<Vec<u8>> {
    let count = i32::try_from(map.len())
        .map_err(|_| Error::codec(format!("LRU map too large: {}", map.len())))?;

    let mut buf = BytesMut::with_capacity(4 + map.len() * (MIN_LRU_ENTRY_LEN + 32));
    buf.put_i32_le(count);
    for (key, timestamp) in map.iter() {
        put_string(&mut buf, key)?;
        buf.put_i64_le(timestamp);
    }
    Ok(buf.to_vec())
}

/// Decode an LRU map written by [`encode_lru_entries`].
pub fn decode_lru_entries(mut bytes: &[u8]) -> Result<LruEntriesMap> {
    let count = read_count(&mut bytes, MIN_LRU_ENTRY_LEN)?;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let key = get_string(&mut bytes)?;
        ensure_remaining(bytes, 8, "LRU timestamp")?;
        entries.push((key, bytes.get_i64_le()));
    }
    ensure_consumed(bytes)?;
    Ok(entries.into_iter().collect())
}

/// Read an `i32` element count and check it against the bytes left.
fn read_count(bytes: &mut &[u8], min_entry_len: usize) -> Result<usize> {
    ensure_remaining(bytes, 4, "count")?;
    let count = bytes.get_i32_le();
    let count = usize::try_from(count).map_err(|_| Error::codec(format!("negative count {count}")))?;
    if count.saturating_mul(min_entry_len) > bytes.remaining() {
        return Err(Error::codec(format!(
            "count {count} exceeds remaining {} bytes",
            bytes.remaining()
        )));
    }
    Ok(count)
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| Error::codec(format!("string too long: {} bytes", value.len())))?;
    put_7bit_encoded(buf, len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn get_string(bytes: &mut &[u8]) -> Result<String> {
    let len = get_7bit_encoded(bytes)? as usize;
    ensure_remaining(bytes, len, "string")?;
    let value = std::str::from_utf8(&bytes[..len])
        .map_err(|e| Error::codec(format!("invalid UTF-8 key: {e}")))?
        .to_owned();
    bytes.advance(len);
    Ok(value)
}

fn put_7bit_encoded(buf: &mut BytesMut, mut value: u32) {
    while value >= 0x80 {
        // Truncation keeps the low 7 bits; the high bit marks continuation.
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u8(value as u8);
}

fn get_7bit_encoded(bytes: &mut &[u8]) -> Result<u32> {
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        ensure_remaining(bytes, 1, "length prefix")?;
        let byte = bytes.get_u8();
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::codec("length prefix longer than 5 bytes"))
}

fn ensure_remaining(bytes: &[u8], needed: usize, what: &str) -> Result<()> {
    if bytes.remaining() < needed {
        return Err(Error::codec(format!(
            "truncated {what}: needed {needed} bytes, {} left",
            bytes.remaining()
        )));
    }
    Ok(())
}

fn ensure_consumed(bytes: &[u8]) -> Result<()> {
    if bytes.has_remaining() {
        return Err(Error::codec(format!(
            "{} trailing bytes after record",
            bytes.remaining()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_miss_list_layout() {
        let list = vec![CacheMissInfo::new(0x0102_0304, CacheMissKind::MissForCacheEntry)];
        let bytes = encode_cache_miss_list(&list).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 0x04, 0x03, 0x02, 0x01, 3]);
        assert_eq!(decode_cache_miss_list(&bytes).unwrap(), list);
    }

    #[test]
    fn test_empty_cache_miss_list() {
        let bytes = encode_cache_miss_list(&[]).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert!(decode_cache_miss_list(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_lru_entries_layout() {
        let mut map = LruEntriesMap::new();
        map.touch("ab", 1);
        let bytes = encode_lru_entries(&map).unwrap();
        assert_eq!(
            bytes,
            vec![1, 0, 0, 0, 2, b'a', b'b', 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(decode_lru_entries(&bytes).unwrap(), map);
    }

    #[test]
    fn test_long_key_uses_multibyte_prefix() {
        let key = "k".repeat(300);
        let mut map = LruEntriesMap::new();
        map.touch(key.clone(), -5);
        let bytes = encode_lru_entries(&map).unwrap();
        // 300 = 0b10_0101100 -> [0xAC, 0x02]
        assert_eq!(&bytes[4..6], &[0xAC, 0x02]);
        let decoded = decode_lru_entries(&bytes).unwrap();
        assert_eq!(decoded.get(&key), Some(-5));
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let bytes = (-1i32).to_le_bytes();
        assert!(decode_cache_miss_list(&bytes).is_err());
        assert!(decode_lru_entries(&bytes).is_err());
    }

    #[test]
    fn test_oversized_count_is_rejected() {
        let bytes = i32::MAX.to_le_bytes();
        assert!(decode_cache_miss_list(&bytes).is_err());
        assert!(decode_lru_entries(&bytes).is_err());
    }

    #[test]
    fn test_truncated_and_trailing_bytes_are_rejected() {
        let bytes = encode_cache_miss_list(&[CacheMissInfo::new(1, CacheMissKind::Hit)]).unwrap();
        assert!(decode_cache_miss_list(&bytes[..bytes.len() - 1]).is_err());

        let mut extra = bytes.clone();
        extra.push(0);
        assert!(decode_cache_miss_list(&extra).is_err());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let bytes = vec![1, 0, 0, 0, 7, 0, 0, 0, 42];
        assert!(decode_cache_miss_list(&bytes).is_err());
    }

    #[test]
    fn test_pip_fingerprint_keys_json() {
        let keys = PipFingerprintKeys::new("W1", "S1", "H1");
        let json = encode_pip_fingerprint_keys(&keys).unwrap();
        assert_eq!(decode_pip_fingerprint_keys(json.as_bytes()).unwrap(), keys);
        assert!(decode_pip_fingerprint_keys(b"{not json").is_err());
    }
}
