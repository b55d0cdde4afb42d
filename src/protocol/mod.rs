//! Client-server communication protocol.
//!
//! This module defines the frames exchanged between quill clients and servers,
//! the QUERY message carried inside them, and the executor that turns a decoded
//! query into a response.
//!
//! # Overview
//!
//! A request travels through the following steps:
//!
//! 1. [`ProtocolTransport`] reads a [`Frame`] from the connection.
//! 2. [`QueryRequest::decode`] parses the frame body.
//! 3. [`QueryExecutor::execute`] hands the query to the [`QueryEngine`](crate::engine::QueryEngine)
//!    together with the connection's [`ClientState`](crate::engine::ClientState).
//!    The server runs this step on a worker pool shared by all connections.
//! 4. The resulting [`Response`] is encoded and written back on the same stream.
//!
//! Decoding and encoding are pure: they only read their input and allocate a
//! fresh output, so they can be called from any number of threads.
//!
//! # Binary Format
//!
//! - Each frame begins with an eight byte header: version, flags, stream id,
//!   opcode and body length.
//! - A QUERY body is a `u32` length prefixed UTF-8 query followed by a `u16`
//!   consistency code.
//! - All integers are big-endian.
//!
//! # Errors
//!
//! A body that cannot be parsed fails with [`ProtocolError::MalformedFrame`];
//! the server answers it with a protocol error on the same stream. Failures
//! raised while executing a well formed query, engine panics included, never
//! surface as errors; they are returned as [`Response::Error`].
mod executor;
mod primitives;
mod request;
mod response;
mod server;
mod thread;
mod transport;

use thiserror::Error;

use thread::WorkerPool;

pub use executor::QueryExecutor;
pub use request::{CodecConfig, DEFAULT_MAX_QUERY_LENGTH, QueryRequest};
pub use response::{ErrorDetails, ErrorKind, ErrorMessage, Response, ResultMessage, WriteType};
pub use server::{CQL_VERSION, QueryServer, ServerConfig};
pub use transport::{
    DEFAULT_MAX_FRAME_LENGTH, Frame, Opcode, PROTOCOL_VERSION, ProtocolTransport, TransportError,
};

pub(crate) use primitives::{ByteReader, write_string_map};

/// Wire data that cannot be parsed into a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
}

impl ProtocolError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::MalformedFrame {
            reason: reason.into(),
        }
    }
}
