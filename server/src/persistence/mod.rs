//! The snapshot persister (4.J): a little-endian binary dump of the whole
//! keyspace, written atomically via a temp file and rename, with a CRC32
//! footer so a partially-written file is detected rather than silently
//! loaded.

use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::storage::value::{HashValue, SetValue, StreamValue, TypeTag, Value, ZSetValue};
use crate::storage::Storage;
use crate::util::{now_ms, Error, NanodResult};

const MAGIC: &[u8; 4] = b"MRDB";
const FORMAT_VERSION: u16 = 1;
const YIELD_EVERY_KEYS: usize = 50;
const WRITE_CHUNK: usize = 4 * 1024;
const YIELD_EVERY_CHUNKS: usize = 10;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn type_byte(tag: TypeTag) -> u8 {
    match tag {
        TypeTag::Str => 0,
        TypeTag::Hash => 1,
        TypeTag::List => 2,
        TypeTag::Set => 3,
        TypeTag::ZSet => 4,
        TypeTag::Stream => 5,
    }
}

fn type_from_byte(b: u8) -> NanodResult<TypeTag> {
    Ok(match b {
        0 => TypeTag::Str,
        1 => TypeTag::Hash,
        2 => TypeTag::List,
        3 => TypeTag::Set,
        4 => TypeTag::ZSet,
        5 => TypeTag::Stream,
        other => return Err(Error::Storage(format!("unknown type tag byte {other}"))),
    })
}

fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    match value {
        Value::Str(s) => buf.extend_from_slice(s),
        Value::Hash(h) => {
            buf.put_u16_le(h.len() as u16);
            for (field, val) in h.iter() {
                buf.put_u16_le(field.len() as u16);
                buf.extend_from_slice(field);
                buf.put_u32_le(val.len() as u32);
                buf.extend_from_slice(val);
            }
        }
        Value::List(l) => {
            buf.put_u32_le(l.len() as u32);
            for item in l {
                buf.put_u32_le(item.len() as u32);
                buf.extend_from_slice(item);
            }
        }
        Value::Set(s) => {
            let members = s.members();
            buf.put_u32_le(members.len() as u32);
            for member in &members {
                buf.put_u16_le(member.len() as u16);
                buf.extend_from_slice(member);
            }
        }
        Value::ZSet(z) => {
            buf.put_u32_le(z.len() as u32);
            for (score, member) in z.iter() {
                buf.put_f64_le(*score);
                buf.put_u16_le(member.len() as u16);
                buf.extend_from_slice(member);
            }
        }
        Value::Stream(s) => {
            buf.put_u64_le(s.last_ms);
            buf.put_u64_le(s.last_seq);
            buf.put_u32_le(s.entries.len() as u32);
            for (id, fields) in &s.entries {
                let id_bytes = id.as_bytes();
                buf.put_u16_le(id_bytes.len() as u16);
                buf.extend_from_slice(id_bytes);
                buf.put_u16_le(fields.len() as u16);
                for (f, v) in fields {
                    buf.put_u16_le(f.len() as u16);
                    buf.extend_from_slice(f);
                    buf.put_u32_le(v.len() as u32);
                    buf.extend_from_slice(v);
                }
            }
        }
    }
    buf.to_vec()
}

fn decode_value(tag: TypeTag, mut bytes: &[u8]) -> NanodResult<Value> {
    let bad = || Error::Storage("truncated value payload".to_string());
    match tag {
        TypeTag::Str => Ok(Value::Str(bytes.to_vec())),
        TypeTag::Hash => {
            if bytes.len() < 2 {
                return Err(bad());
            }
            let count = bytes.get_u16_le();
            let mut h = HashValue::new();
            for _ in 0..count {
                if bytes.len() < 2 {
                    return Err(bad());
                }
                let flen = bytes.get_u16_le() as usize;
                if bytes.len() < flen + 4 {
                    return Err(bad());
                }
                let field = bytes[..flen].to_vec();
                bytes.advance(flen);
                let vlen = bytes.get_u32_le() as usize;
                if bytes.len() < vlen {
                    return Err(bad());
                }
                let val = bytes[..vlen].to_vec();
                bytes.advance(vlen);
                h.set(field, val);
            }
            Ok(Value::Hash(h))
        }
        TypeTag::List => {
            if bytes.len() < 4 {
                return Err(bad());
            }
            let count = bytes.get_u32_le();
            let mut l = std::collections::VecDeque::with_capacity(count as usize);
            for _ in 0..count {
                if bytes.len() < 4 {
                    return Err(bad());
                }
                let len = bytes.get_u32_le() as usize;
                if bytes.len() < len {
                    return Err(bad());
                }
                l.push_back(bytes[..len].to_vec());
                bytes.advance(len);
            }
            Ok(Value::List(l))
        }
        TypeTag::Set => {
            if bytes.len() < 4 {
                return Err(bad());
            }
            let count = bytes.get_u32_le();
            let mut s = SetValue::new();
            for _ in 0..count {
                if bytes.len() < 2 {
                    return Err(bad());
                }
                let len = bytes.get_u16_le() as usize;
                if bytes.len() < len {
                    return Err(bad());
                }
                s.insert(bytes[..len].to_vec());
                bytes.advance(len);
            }
            Ok(Value::Set(s))
        }
        TypeTag::ZSet => {
            if bytes.len() < 4 {
                return Err(bad());
            }
            let count = bytes.get_u32_le();
            let mut z = ZSetValue::new();
            for _ in 0..count {
                if bytes.len() < 10 {
                    return Err(bad());
                }
                let score = bytes.get_f64_le();
                let len = bytes.get_u16_le() as usize;
                if bytes.len() < len {
                    return Err(bad());
                }
                z.upsert(bytes[..len].to_vec(), score);
                bytes.advance(len);
            }
            Ok(Value::ZSet(z))
        }
        TypeTag::Stream => {
            if bytes.len() < 16 {
                return Err(bad());
            }
            let last_ms = bytes.get_u64_le();
            let last_seq = bytes.get_u64_le();
            if bytes.len() < 4 {
                return Err(bad());
            }
            let count = bytes.get_u32_le();
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                if bytes.len() < 2 {
                    return Err(bad());
                }
                let idlen = bytes.get_u16_le() as usize;
                if bytes.len() < idlen + 2 {
                    return Err(bad());
                }
                let id = String::from_utf8(bytes[..idlen].to_vec()).map_err(|_| bad())?;
                bytes.advance(idlen);
                let fcount = bytes.get_u16_le();
                let mut fields = Vec::with_capacity(fcount as usize);
                for _ in 0..fcount {
                    if bytes.len() < 2 {
                        return Err(bad());
                    }
                    let flen = bytes.get_u16_le() as usize;
                    if bytes.len() < flen + 4 {
                        return Err(bad());
                    }
                    let field = bytes[..flen].to_vec();
                    bytes.advance(flen);
                    let vlen = bytes.get_u32_le() as usize;
                    if bytes.len() < vlen {
                        return Err(bad());
                    }
                    let val = bytes[..vlen].to_vec();
                    bytes.advance(vlen);
                    fields.push((field, val));
                }
                entries.push((id, fields));
            }
            Ok(Value::Stream(StreamValue {
                entries,
                last_ms,
                last_seq,
            }))
        }
    }
}

/// Serializes the current keyspace into the `MRDB` binary format,
/// yielding to the scheduler periodically so a large save doesn't stall
/// request handling.
pub async fn encode_snapshot(storage: &Storage) -> Vec<u8> {
    let keys: Vec<Vec<u8>> = storage.all_keys_vec();
    let mut body = BytesMut::new();
    for (i, key) in keys.iter().enumerate() {
        let Some(value) = storage.get_raw(key) else {
            continue;
        };
        let deadline = storage.deadline_of(key);
        body.put_u8(type_byte(value.type_tag()));
        body.put_u8(deadline.is_some() as u8);
        if let Some(ms) = deadline {
            body.put_i64_le(ms as i64);
        }
        body.put_u16_le(key.len() as u16);
        body.extend_from_slice(key);
        let encoded = encode_value(value);
        body.put_u32_le(encoded.len() as u32);
        body.extend_from_slice(&encoded);

        if (i + 1) % YIELD_EVERY_KEYS == 0 {
            tokio::task::yield_now().await;
        }
    }

    let mut out = BytesMut::new();
    out.extend_from_slice(MAGIC);
    out.put_u16_le(FORMAT_VERSION);
    out.put_u32_le((now_ms() / 1000) as u32);
    out.put_u32_le(keys.len() as u32);
    out.extend_from_slice(&body);

    let checksum = CRC32.checksum(&out);
    out.put_u32_le(checksum);
    out.to_vec()
}

/// Parses an `MRDB` snapshot into a fresh `Storage`. Rejects wrong magic,
/// unsupported version, truncation, or a CRC mismatch without partially
/// populating the result.
pub fn decode_snapshot(bytes: &[u8], max_keys: usize) -> NanodResult<Storage> {
    if bytes.len() < 4 + 2 + 4 + 4 + 4 {
        return Err(Error::Storage("snapshot truncated".to_string()));
    }
    let (header_and_body, footer) = bytes.split_at(bytes.len() - 4);
    let expected_crc = u32::from_le_bytes(footer.try_into().unwrap());
    let actual_crc = CRC32.checksum(header_and_body);
    if expected_crc != actual_crc {
        return Err(Error::Storage("snapshot CRC mismatch".to_string()));
    }

    let mut cursor = header_and_body;
    if &cursor[..4] != MAGIC {
        return Err(Error::Storage("bad snapshot magic".to_string()));
    }
    cursor = &cursor[4..];
    let version = u16::from_le_bytes(cursor[..2].try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(Error::Storage(format!("unsupported snapshot version {version}")));
    }
    cursor = &cursor[2..];
    let _timestamp = u32::from_le_bytes(cursor[..4].try_into().unwrap());
    cursor = &cursor[4..];
    let key_count = u32::from_le_bytes(cursor[..4].try_into().unwrap());
    cursor = &cursor[4..];

    let mut storage = Storage::new(max_keys);
    let bad = || Error::Storage("snapshot entry truncated".to_string());
    for _ in 0..key_count {
        if cursor.len() < 2 {
            return Err(bad());
        }
        let tag = type_from_byte(cursor[0])?;
        let has_ttl = cursor[1] != 0;
        cursor = &cursor[2..];
        let ttl_ms = if has_ttl {
            if cursor.len() < 8 {
                return Err(bad());
            }
            let v = i64::from_le_bytes(cursor[..8].try_into().unwrap()) as u64;
            cursor = &cursor[8..];
            Some(v)
        } else {
            None
        };
        if cursor.len() < 2 {
            return Err(bad());
        }
        let key_len = u16::from_le_bytes(cursor[..2].try_into().unwrap()) as usize;
        cursor = &cursor[2..];
        if cursor.len() < key_len + 4 {
            return Err(bad());
        }
        let key = cursor[..key_len].to_vec();
        cursor = &cursor[key_len..];
        let value_len = u32::from_le_bytes(cursor[..4].try_into().unwrap()) as usize;
        cursor = &cursor[4..];
        if cursor.len() < value_len {
            return Err(bad());
        }
        let value_bytes = &cursor[..value_len];
        cursor = &cursor[value_len..];
        let value = decode_value(tag, value_bytes)?;
        storage.set_value(&key, value);
        if let Some(ms) = ttl_ms {
            storage.set_expire_at(&key, ms);
        }
    }
    Ok(storage)
}

/// Writes `bytes` to `path` atomically: a `.tmp` sibling is written in
/// chunks (yielding periodically) then renamed over the destination.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> NanodResult<()> {
    let tmp_path: PathBuf = {
        let mut p = path.to_path_buf();
        let name = format!(
            "{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("snapshot")
        );
        p.set_file_name(name);
        p
    };

    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    for (i, chunk) in bytes.chunks(WRITE_CHUNK).enumerate() {
        file.write_all(chunk).await?;
        if (i + 1) % YIELD_EVERY_CHUNKS == 0 {
            tokio::task::yield_now().await;
        }
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn save(storage: &Storage, path: &Path) -> NanodResult<usize> {
    let bytes = encode_snapshot(storage).await;
    let len = bytes.len();
    write_atomic(path, &bytes).await?;
    Ok(len)
}

pub async fn load(path: &Path, max_keys: usize) -> NanodResult<Storage> {
    let bytes = tokio::fs::read(path).await?;
    decode_snapshot(&bytes, max_keys)
}

/// Dual-slot wear-levelling (4.J alternative scheme): instead of rewriting
/// one file in place, saves alternate between two sibling files with a
/// marker tracking which one is current. A crash mid-write leaves the
/// marker pointing at the still-intact previous slot.
fn slot_paths(path: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("dump");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("mrdb");
    (
        dir.join(format!("{stem}_a.{ext}")),
        dir.join(format!("{stem}_b.{ext}")),
        dir.join(format!("{stem}.slot")),
    )
}

/// `0` or `1`, defaulting to `0` if the marker is missing or unreadable.
async fn read_marker(marker: &Path) -> u8 {
    match tokio::fs::read_to_string(marker).await {
        Ok(s) if s.trim() == "1" => 1,
        _ => 0,
    }
}

async fn write_marker(marker: &Path, slot: u8) -> NanodResult<()> {
    tokio::fs::write(marker, slot.to_string()).await?;
    Ok(())
}

/// Writes to the slot opposite the one the marker currently names, then
/// flips the marker -- the slot the marker still named during the write
/// stays untouched and loadable the whole time.
pub async fn save_dual_slot(storage: &Storage, path: &Path) -> NanodResult<usize> {
    let (slot_a, slot_b, marker) = slot_paths(path);
    let current = read_marker(&marker).await;
    let next_path = if current == 0 { &slot_b } else { &slot_a };
    let bytes = encode_snapshot(storage).await;
    let len = bytes.len();
    write_atomic(next_path, &bytes).await?;
    write_marker(&marker, 1 - current).await?;
    Ok(len)
}

/// Reads the slot the marker names, falling back to the other slot if
/// that read or decode fails -- recovers from a crash between the slot
/// write and the marker flip.
pub async fn load_dual_slot(path: &Path, max_keys: usize) -> NanodResult<Storage> {
    let (slot_a, slot_b, marker) = slot_paths(path);
    let current = read_marker(&marker).await;
    let (primary, fallback) = if current == 0 { (&slot_a, &slot_b) } else { (&slot_b, &slot_a) };
    if let Ok(bytes) = tokio::fs::read(primary).await {
        if let Ok(storage) = decode_snapshot(&bytes, max_keys) {
            return Ok(storage);
        }
    }
    let bytes = tokio::fs::read(fallback).await?;
    decode_snapshot(&bytes, max_keys)
}

/// Whether a dual-slot snapshot (either slot file) exists at `path`'s
/// location, used at startup to decide whether there's anything to load.
pub fn dual_slot_exists(path: &Path) -> bool {
    let (slot_a, slot_b, _) = slot_paths(path);
    slot_a.exists() || slot_b.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value::{HashValue, SetValue, ZSetValue};

    fn populated_storage() -> Storage {
        let mut s = Storage::new(crate::storage::DEFAULT_MAX_KEYS);
        s.set_value(b"str", Value::Str(b"hello".to_vec()));
        let mut h = HashValue::new();
        h.set(b"f".to_vec(), b"v".to_vec());
        s.set_value(b"hash", Value::Hash(h));
        let mut set = SetValue::new();
        set.insert(b"m".to_vec());
        s.set_value(b"set", Value::Set(set));
        let mut z = ZSetValue::new();
        z.upsert(b"m".to_vec(), 1.5);
        s.set_value(b"zset", Value::ZSet(z));
        s
    }

    #[tokio::test]
    async fn encode_decode_roundtrip_preserves_values() {
        let storage = populated_storage();
        let bytes = encode_snapshot(&storage).await;
        let mut restored = decode_snapshot(&bytes, crate::storage::DEFAULT_MAX_KEYS).unwrap();
        assert!(matches!(restored.get_value(b"str"), Some(Value::Str(s)) if s == b"hello"));
        assert!(matches!(restored.get_value(b"hash"), Some(Value::Hash(h)) if h.get(b"f") == Some(&b"v"[..])));
        assert!(matches!(restored.get_value(b"set"), Some(Value::Set(s)) if s.contains(b"m")));
        assert!(matches!(restored.get_value(b"zset"), Some(Value::ZSet(z)) if z.score(b"m") == Some(1.5)));
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let mut bytes = vec![];
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0xdead_beefu32.to_le_bytes());
        assert!(decode_snapshot(&bytes, crate::storage::DEFAULT_MAX_KEYS).is_err());
    }

    #[tokio::test]
    async fn dual_slot_save_alternates_and_reloads() {
        let dir = std::env::temp_dir().join(format!("nanod-dualslot-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("dump.mrdb");

        let mut storage = populated_storage();
        save_dual_slot(&storage, &path).await.unwrap();
        let (slot_a, slot_b, marker) = slot_paths(&path);
        assert!(slot_a.exists());
        assert_eq!(read_marker(&marker).await, 1);

        storage.set_value(b"second", Value::Str(b"write".to_vec()));
        save_dual_slot(&storage, &path).await.unwrap();
        assert!(slot_b.exists());
        assert_eq!(read_marker(&marker).await, 0);

        let restored = load_dual_slot(&path, crate::storage::DEFAULT_MAX_KEYS).await.unwrap();
        assert!(restored.get_raw(b"second").is_some());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn dual_slot_load_falls_back_when_marked_slot_is_corrupt() {
        let dir = std::env::temp_dir().join(format!("nanod-dualslot-fallback-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("dump.mrdb");

        let storage = populated_storage();
        save_dual_slot(&storage, &path).await.unwrap();
        // marker now names slot_b; corrupt slot_b so the loader must fall back to slot_a
        let (slot_a, slot_b, _marker) = slot_paths(&path);
        tokio::fs::write(&slot_b, b"not a snapshot").await.unwrap();

        let restored = load_dual_slot(&path, crate::storage::DEFAULT_MAX_KEYS).await.unwrap();
        assert!(restored.get_raw(b"str").is_some());
        assert!(slot_a.exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
