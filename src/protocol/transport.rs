use std::io::{self, Read, Write};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};
use log::trace;
use thiserror::Error;

use super::ProtocolError;

/// Version byte of frames sent by clients.
pub const PROTOCOL_VERSION: u8 = 0x01;
/// Set on the version byte of frames sent by servers.
pub const RESPONSE_FLAG: u8 = 0x80;
/// Largest frame body accepted by default.
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 256 * 1024 * 1024;

const HEADER_LENGTH: usize = 8;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode frame header: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode frame header: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("peer closed the connection")]
    Closed,
}

impl TransportError {
    /// True when the peer closed the stream between frames. A stream that ends
    /// inside a frame is an I/O error instead.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Error,
    Startup,
    Ready,
    Options,
    Supported,
    Query,
    Result,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x00 => Ok(Opcode::Error),
            0x01 => Ok(Opcode::Startup),
            0x02 => Ok(Opcode::Ready),
            0x05 => Ok(Opcode::Options),
            0x06 => Ok(Opcode::Supported),
            0x07 => Ok(Opcode::Query),
            0x08 => Ok(Opcode::Result),
            _ => Err(ProtocolError::malformed(format!(
                "unsupported opcode {value:#04x}"
            ))),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Error => 0x00,
            Opcode::Startup => 0x01,
            Opcode::Ready => 0x02,
            Opcode::Options => 0x05,
            Opcode::Supported => 0x06,
            Opcode::Query => 0x07,
            Opcode::Result => 0x08,
        }
    }
}

/// Fixed eight byte header preceding every frame body.
#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct FrameHeader {
    version: u8,
    flags: u8,
    stream: i8,
    opcode: u8,
    length: u32,
}

/// One protocol frame. The opcode is kept raw so that a frame with an
/// unknown opcode can still be answered on its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub stream: i8,
    pub opcode: u8,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn request(stream: i8, opcode: Opcode, body: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            stream,
            opcode: opcode.into(),
            body,
        }
    }

    pub fn response(stream: i8, opcode: Opcode, body: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION | RESPONSE_FLAG,
            stream,
            opcode: opcode.into(),
            body,
        }
    }

    pub fn opcode(&self) -> Result<Opcode, ProtocolError> {
        self.opcode.try_into()
    }

    pub fn is_response(&self) -> bool {
        self.version & RESPONSE_FLAG != 0
    }
}

pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: Configuration<BigEndian, Fixint>,
    max_frame_length: u32,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self::with_max_frame_length(stream, DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_frame_length(stream: T, max_frame_length: u32) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        Self {
            stream,
            config,
            max_frame_length,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let length = u32::try_from(frame.body.len())
            .ok()
            .filter(|len| *len <= self.max_frame_length)
            .ok_or_else(|| {
                ProtocolError::malformed(format!(
                    "frame body of {} bytes exceeds maximum of {}",
                    frame.body.len(),
                    self.max_frame_length
                ))
            })?;
        let header = FrameHeader {
            version: frame.version,
            flags: 0,
            stream: frame.stream,
            opcode: frame.opcode,
            length,
        };
        trace!("writing frame {header:?}");
        let mut out = encode_to_vec(header, self.config)?;
        out.extend_from_slice(&frame.body);
        self.stream.write_all(&out)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let mut raw = [0; HEADER_LENGTH];
        loop {
            match self.stream.read(&mut raw[..1]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.stream.read_exact(&mut raw[1..])?;
        let (header, _): (FrameHeader, usize) = decode_from_slice(&raw, self.config)?;
        trace!("read frame {header:?}");

        if header.version & !RESPONSE_FLAG != PROTOCOL_VERSION {
            return Err(ProtocolError::malformed(format!(
                "unsupported protocol version {:#04x}",
                header.version
            ))
            .into());
        }
        if header.length > self.max_frame_length {
            return Err(ProtocolError::malformed(format!(
                "frame body of {} bytes exceeds maximum of {}",
                header.length, self.max_frame_length
            ))
            .into());
        }

        // Grows with the bytes received, not with the declared length.
        let mut body = Vec::new();
        (&mut self.stream)
            .take(u64::from(header.length))
            .read_to_end(&mut body)?;
        if body.len() < header.length as usize {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("frame body ended after {} of {} bytes", body.len(), header.length),
            )
            .into());
        }
        Ok(Frame {
            version: header.version,
            stream: header.stream,
            opcode: header.opcode,
            body,
        })
    }
}
