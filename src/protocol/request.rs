use std::fmt;

use crate::ConsistencyLevel;

use super::{
    ProtocolError,
    primitives::{ByteReader, write_consistency, write_long_string},
};

/// Largest query text accepted by default; matches the default frame limit.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 256 * 1024 * 1024;

/// Limits applied while decoding message bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    pub max_query_length: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }
}

/// A QUERY message: query text plus the consistency it must be executed at.
///
/// Body layout is `[long string]` query followed by `[consistency]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryRequest {
    query: String,
    consistency: ConsistencyLevel,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, consistency: ConsistencyLevel) -> Self {
        Self {
            query: query.into(),
            consistency,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    /// Decodes a QUERY body. Bytes following the consistency code are ignored.
    pub fn decode(body: &[u8], config: &CodecConfig) -> Result<Self, ProtocolError> {
        let mut reader = ByteReader::new(body);
        let query = reader.read_long_string(config.max_query_length, "query")?;
        let consistency = reader.read_consistency()?;
        Ok(Self { query, consistency })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.query.len() + 2);
        write_long_string(&mut buf, &self.query);
        write_consistency(&mut buf, self.consistency);
        buf
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QUERY {}", self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CodecConfig {
        CodecConfig::default()
    }

    #[test]
    fn select_quorum_round_trip() {
        let request = QueryRequest::new("SELECT * FROM t", ConsistencyLevel::Quorum);
        let body = request.encode();

        assert_eq!(&body[..4], &[0, 0, 0, 15]);
        assert_eq!(&body[body.len() - 2..], &[0x00, 0x04]);
        assert_eq!(QueryRequest::decode(&body, &config()).unwrap(), request);
    }

    #[test]
    fn round_trip_every_level() {
        for level in ConsistencyLevel::levels() {
            for query in ["", "USE ks", "SELECT name FROM users WHERE id = 'ü'"] {
                let request = QueryRequest::new(query, level);
                assert_eq!(
                    QueryRequest::decode(&request.encode(), &config()).unwrap(),
                    request
                );
            }
        }
    }

    #[test]
    #[should_panic(expected = "query needs 10 bytes, 5 remaining")]
    fn declared_length_past_body() {
        let body = [0, 0, 0, 10, b'S', b'E', b'L', b'E', b'C'];
        QueryRequest::decode(&body, &config()).unwrap();
    }

    #[test]
    fn every_truncation_rejected() {
        let body = QueryRequest::new("SELECT * FROM t", ConsistencyLevel::One).encode();
        for end in 0..body.len() {
            assert!(
                matches!(
                    QueryRequest::decode(&body[..end], &config()),
                    Err(ProtocolError::MalformedFrame { .. })
                ),
                "truncated at {end}"
            );
        }
    }

    #[test]
    #[should_panic(expected = "unknown consistency code")]
    fn undefined_consistency_code() {
        let mut body = Vec::new();
        write_long_string(&mut body, "SELECT * FROM t");
        body.extend_from_slice(&9999u16.to_be_bytes());
        QueryRequest::decode(&body, &config()).unwrap();
    }

    #[test]
    #[should_panic(expected = "exceeds maximum of 8")]
    fn query_over_configured_maximum() {
        let body = QueryRequest::new("SELECT * FROM t", ConsistencyLevel::One).encode();
        QueryRequest::decode(&body, &CodecConfig { max_query_length: 8 }).unwrap();
    }

    #[test]
    #[should_panic(expected = "query is not valid UTF-8")]
    fn query_text_not_utf8() {
        let body = [0, 0, 0, 2, 0xC3, 0x28, 0, 1];
        QueryRequest::decode(&body, &config()).unwrap();
    }

    #[test]
    fn trailing_bytes_ignored() {
        let request = QueryRequest::new("SELECT * FROM t", ConsistencyLevel::All);
        let mut body = request.encode();
        body.push(0x00);
        assert_eq!(QueryRequest::decode(&body, &config()).unwrap(), request);
    }

    #[test]
    fn display() {
        let request = QueryRequest::new("SELECT * FROM t", ConsistencyLevel::One);
        assert_eq!(request.to_string(), "QUERY SELECT * FROM t");
    }
}
