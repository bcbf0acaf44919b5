//! Binary helpers for segment files: varint postings, little-endian integers,
//! and length-prefixed strings.

use roaring::RoaringBitmap;
use std::io::{self, Read, Write};

/// Append `value` as a LEB128 varint
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read one varint from the front of `buf`, returning it with the bytes consumed.
/// `None` on truncation or overflow.
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().take(5).enumerate() {
        let bits = u32::from(byte & 0x7f);
        if i == 4 && bits > 0x0f {
            return None;
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Encode a postings list: strictly ascending doc ids as varint gaps
pub fn encode_postings(doc_ids: &[u32], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &doc_id in doc_ids {
        encode_varint(doc_id - prev, buf);
        prev = doc_id;
    }
}

/// Decode a postings list written by [`encode_postings`]
pub fn decode_postings(buf: &[u8]) -> io::Result<RoaringBitmap> {
    let mut docs = RoaringBitmap::new();
    let mut prev = 0u32;
    let mut pos = 0;

    while pos < buf.len() {
        let (gap, consumed) = decode_varint(&buf[pos..])
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated postings"))?;
        prev = prev
            .checked_add(gap)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "doc id overflow"))?;
        docs.insert(prev);
        pos += consumed;
    }

    Ok(docs)
}

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u32 in little-endian format
pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a u64 in little-endian format
pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u64 in little-endian format
pub fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Write a string prefixed with its u32 byte length
pub fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    write_u32_le(writer, value.len() as u32)?;
    writer.write_all(value.as_bytes())
}

/// Read a string written by [`write_str`]
pub fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_u32_le(reader)? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
