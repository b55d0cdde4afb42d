//! Binary primitives shared by every message body.
//!
//! All integers are big-endian. Notation follows the protocol description:
//!
//! - `[string]`: `u16` length followed by that many UTF-8 bytes.
//! - `[long string]`: `u32` length followed by that many UTF-8 bytes.
//! - `[short bytes]`: `u16` length followed by raw bytes.
//! - `[string map]`: `u16` count of `[string]` key/value pairs.
//! - `[string multimap]`: `u16` count of `[string]` keys, each followed by a
//!   `u16` count of `[string]` values.
//! - `[consistency]`: `u16` code, see [`ConsistencyLevel`].
use std::collections::BTreeMap;

use crate::ConsistencyLevel;

use super::ProtocolError;

/// Cursor over a frame body. Every read checks the remaining length first, so
/// a short body surfaces as [`ProtocolError::MalformedFrame`] rather than a panic.
#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], ProtocolError> {
        if len > self.remaining() {
            return Err(ProtocolError::malformed(format!(
                "{what} needs {len} bytes, {} remaining",
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], ProtocolError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, what: &str) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>(what)?[0])
    }

    pub fn read_u16(&mut self, what: &str) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.array(what)?))
    }

    pub fn read_u32(&mut self, what: &str) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.array(what)?))
    }

    pub fn read_i32(&mut self, what: &str) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.array(what)?))
    }

    pub fn read_bool(&mut self, what: &str) -> Result<bool, ProtocolError> {
        Ok(self.read_u8(what)? != 0)
    }

    /// Reads a `[long string]`, rejecting declared lengths above `max`
    /// before touching the payload.
    pub fn read_long_string(&mut self, max: usize, what: &str) -> Result<String, ProtocolError> {
        let len = self.read_u32(what)? as usize;
        if len > max {
            return Err(ProtocolError::malformed(format!(
                "{what} length {len} exceeds maximum of {max}"
            )));
        }
        utf8(self.take(len, what)?, what)
    }

    pub fn read_string(&mut self, what: &str) -> Result<String, ProtocolError> {
        let len = self.read_u16(what)? as usize;
        utf8(self.take(len, what)?, what)
    }

    pub fn read_short_bytes(&mut self, what: &str) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_u16(what)? as usize;
        Ok(self.take(len, what)?.to_vec())
    }

    pub fn read_string_map(&mut self) -> Result<BTreeMap<String, String>, ProtocolError> {
        let count = self.read_u16("string map size")?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string("string map key")?;
            let value = self.read_string("string map value")?;
            map.insert(key, value);
        }
        Ok(map)
    }

    pub fn read_string_multimap(&mut self) -> Result<BTreeMap<String, Vec<String>>, ProtocolError> {
        let count = self.read_u16("string multimap size")?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string("string multimap key")?;
            let values = self.read_u16("string list size")?;
            let values = (0..values)
                .map(|_| self.read_string("string list entry"))
                .collect::<Result<Vec<_>, _>>()?;
            map.insert(key, values);
        }
        Ok(map)
    }

    pub fn read_consistency(&mut self) -> Result<ConsistencyLevel, ProtocolError> {
        ConsistencyLevel::from_code(self.read_u16("consistency")?)
    }
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, ProtocolError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProtocolError::malformed(format!("{what} is not valid UTF-8: {e}")))
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
fn clamp(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub(crate) fn write_long_string(buf: &mut Vec<u8>, s: &str) {
    let s = clamp(s, u32::MAX as usize);
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Writes a `[string]`; text past `u16::MAX` bytes is cut at a character boundary.
pub(crate) fn write_string(buf: &mut Vec<u8>, s: &str) {
    let s = clamp(s, u16::MAX as usize);
    buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

pub(crate) fn write_short_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    let bytes = &bytes[..bytes.len().min(u16::MAX as usize)];
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

pub(crate) fn write_string_map(buf: &mut Vec<u8>, map: &BTreeMap<String, String>) {
    buf.extend_from_slice(&(map.len() as u16).to_be_bytes());
    for (key, value) in map {
        write_string(buf, key);
        write_string(buf, value);
    }
}

pub(crate) fn write_string_multimap(buf: &mut Vec<u8>, map: &BTreeMap<String, Vec<String>>) {
    buf.extend_from_slice(&(map.len() as u16).to_be_bytes());
    for (key, values) in map {
        write_string(buf, key);
        buf.extend_from_slice(&(values.len() as u16).to_be_bytes());
        for value in values {
            write_string(buf, value);
        }
    }
}

pub(crate) fn write_consistency(buf: &mut Vec<u8>, consistency: ConsistencyLevel) {
    buf.extend_from_slice(&consistency.code().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end() {
        let mut reader = ByteReader::new(&[0x00]);
        let err = reader.read_u16("value").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::malformed("value needs 2 bytes, 1 remaining")
        );
    }

    #[test]
    fn long_string_over_maximum() {
        let mut buf = Vec::new();
        write_long_string(&mut buf, "select");
        let mut reader = ByteReader::new(&buf);
        assert!(reader.read_long_string(5, "query").is_err());

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.read_long_string(6, "query").unwrap(), "select");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn invalid_utf8() {
        let body = [0x00, 0x02, 0xC3, 0x28];
        let mut reader = ByteReader::new(&body);
        assert!(matches!(
            reader.read_string("keyspace"),
            Err(ProtocolError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn string_clamped_at_char_boundary() {
        let long = "é".repeat(40_000);
        let mut buf = Vec::new();
        write_string(&mut buf, &long);

        let mut reader = ByteReader::new(&buf);
        let read = reader.read_string("message").unwrap();
        assert_eq!(read.len(), 65_534);
        assert!(long.starts_with(&read));
    }

    #[test]
    fn string_multimap() {
        let mut map = BTreeMap::new();
        map.insert("CQL_VERSION".to_string(), vec!["3.0.0".to_string()]);
        map.insert("COMPRESSION".to_string(), vec![]);

        let mut buf = Vec::new();
        write_string_multimap(&mut buf, &map);
        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.read_string_multimap().unwrap(), map);
    }

    #[test]
    fn consistency_big_endian() {
        let mut buf = Vec::new();
        write_consistency(&mut buf, ConsistencyLevel::LocalOne);
        assert_eq!(buf, vec![0x00, 0x0A]);
    }
}
