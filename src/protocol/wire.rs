//! Hand-rolled length-prefixed binary framing.
//!
//! A record is a fixed-order sequence of fields, each written as a
//! `u32` little-endian length prefix followed by that many bytes. A
//! decoder that doesn't recognize a trailing field (because it was
//! compiled against an older schema) can still skip it, since the
//! length is self-describing, giving forward/backward compatibility by
//! skipping unknown trailing fields rather than failing to decode.

use crate::error::{RpcError, RpcResult};
use std::io::{Cursor, Read};

/// Appends a length-prefixed field to `out`.
pub fn write_field(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len() as u32;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    write_field(out, &value.to_le_bytes());
}

pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    write_field(out, &value.to_le_bytes());
}

pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    write_field(out, &[value as u8]);
}

pub fn write_str(out: &mut Vec<u8>, value: &str) {
    write_field(out, value.as_bytes());
}

/// Writes a sequence of `(key, value)` string pairs as a count-prefixed
/// field list, used for header maps which allow duplicate keys.
pub fn write_pairs(out: &mut Vec<u8>, pairs: &[(String, String)]) {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
    for (k, v) in pairs {
        write_str(&mut buf, k);
        write_str(&mut buf, v);
    }
    write_field(out, &buf);
}

/// A cursor over a wire-encoded record, reading fields in order. Reading
/// past the last field the decoder knows about is simply not done; any
/// trailing bytes are dropped along with the cursor, which is how
/// unknown trailing fields get "skipped".
pub struct FieldReader<'a> {
    cursor: Cursor<&'a [u8]>,
    path_hint: Option<std::path::PathBuf>,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            path_hint: None,
        }
    }

    pub fn with_path_hint(mut self, path: std::path::PathBuf) -> Self {
        self.path_hint = Some(path);
        self
    }

    fn decode_err(&self, reason: impl Into<String>) -> RpcError {
        RpcError::DecodeError {
            path: self.path_hint.clone(),
            reason: reason.into(),
        }
    }

    /// Reads one length-prefixed field, returning its raw bytes. Returns
    /// an error if the stream is truncated mid-field.
    pub fn read_field(&mut self) -> RpcResult<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.cursor
            .read_exact(&mut len_buf)
            .map_err(|_| self.decode_err("truncated length prefix"))?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| self.decode_err("truncated field body"))?;
        Ok(buf)
    }

    pub fn read_u64(&mut self) -> RpcResult<u64> {
        let bytes = self.read_field()?;
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| self.decode_err("expected 8-byte u64 field"))?;
        Ok(u64::from_le_bytes(arr))
    }

    pub fn read_u16(&mut self) -> RpcResult<u16> {
        let bytes = self.read_field()?;
        let arr: [u8; 2] = bytes
            .try_into()
            .map_err(|_| self.decode_err("expected 2-byte u16 field"))?;
        Ok(u16::from_le_bytes(arr))
    }

    pub fn read_bool(&mut self) -> RpcResult<bool> {
        let bytes = self.read_field()?;
        Ok(bytes.first().copied().unwrap_or(0) != 0)
    }

    pub fn read_str(&mut self) -> RpcResult<String> {
        let bytes = self.read_field()?;
        String::from_utf8(bytes).map_err(|_| self.decode_err("field is not valid UTF-8"))
    }

    pub fn read_pairs(&mut self) -> RpcResult<Vec<(String, String)>> {
        let field = self.read_field()?;
        let mut sub = FieldReader::new(&field);
        let mut count_buf = [0u8; 4];
        sub.cursor
            .read_exact(&mut count_buf)
            .map_err(|_| self.decode_err("truncated pair count"))?;
        let count = u32::from_le_bytes(count_buf);
        let mut pairs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let k = sub.read_str()?;
            let v = sub.read_str()?;
            pairs.push((k, v));
        }
        Ok(pairs)
    }

    /// True if any bytes remain unread (whether known fields left off
    /// early, or unknown trailing fields from a newer schema).
    pub fn has_remaining(&self) -> bool {
        (self.cursor.position() as usize) < self.cursor.get_ref().len()
    }
}

/// Convenience for building a record's encoded form in one pass.
pub fn build(f: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut out = Vec::new();
    f(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_fields() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 42);
        write_str(&mut buf, "hello");
        write_bool(&mut buf, true);

        let mut reader = FieldReader::new(&buf);
        assert_eq!(reader.read_u64().unwrap(), 42);
        assert_eq!(reader.read_str().unwrap(), "hello");
        assert!(reader.read_bool().unwrap());
        assert!(!reader.has_remaining());
    }

    #[test]
    fn round_trips_header_pairs() {
        let mut buf = Vec::new();
        let pairs = vec![
            ("content-type".to_string(), "text/plain".to_string()),
            ("x-dup".to_string(), "1".to_string()),
            ("x-dup".to_string(), "2".to_string()),
        ];
        write_pairs(&mut buf, &pairs);

        let mut reader = FieldReader::new(&buf);
        let decoded = reader.read_pairs().unwrap();
        assert_eq!(decoded, pairs);
    }

    #[test]
    fn decoder_skips_unknown_trailing_field() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 1);
        write_str(&mut buf, "known");
        // Field from a newer schema version this decoder doesn't read.
        write_str(&mut buf, "from-the-future");

        let mut reader = FieldReader::new(&buf);
        assert_eq!(reader.read_u64().unwrap(), 1);
        assert_eq!(reader.read_str().unwrap(), "known");
        // A decoder stops here; the trailing field is simply never read.
        assert!(reader.has_remaining());
    }

    #[test]
    fn truncated_stream_is_a_decode_error() {
        let buf = vec![5, 0, 0, 0, 1, 2];
        let mut reader = FieldReader::new(&buf);
        assert!(reader.read_field().is_err());
    }
}
