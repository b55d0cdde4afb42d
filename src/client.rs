//! Blocking client for a quill server.
//!
//! A [`Client`] owns one TCP connection. [`Client::connect`] performs the
//! STARTUP/READY exchange, after which [`Client::query`] sends one QUERY frame
//! and waits for its answer. Requests are sent one at a time, so the stream id
//! only serves to check that the reply belongs to the request.
use std::{
    collections::BTreeMap,
    net::{TcpStream, ToSocketAddrs},
};

use log::debug;
use thiserror::Error;

use crate::{
    ConsistencyLevel,
    protocol::{
        ByteReader, CQL_VERSION, ErrorMessage, Frame, Opcode, ProtocolError, ProtocolTransport,
        QueryRequest, Response, TransportError, write_string_map,
    },
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("server refused connection: {0}")]
    Refused(ErrorMessage),
    #[error("unexpected {0:?} frame")]
    Unexpected(Opcode),
}

pub struct Client {
    transport: ProtocolTransport<TcpStream>,
    next_stream: i8,
}

impl Client {
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(address).map_err(TransportError::from)?;
        let mut client = Self {
            transport: ProtocolTransport::new(stream),
            next_stream: 0,
        };

        let mut options = BTreeMap::new();
        options.insert("CQL_VERSION".to_string(), CQL_VERSION.to_string());
        let mut body = Vec::new();
        write_string_map(&mut body, &options);

        let reply = client.round_trip(Opcode::Startup, body)?;
        match reply.opcode()? {
            Opcode::Ready => {
                debug!("connection ready");
                Ok(client)
            }
            Opcode::Error => match Response::decode(Opcode::Error, &reply.body)? {
                Response::Error(err) => Err(ClientError::Refused(err)),
                Response::Result(_) => Err(ClientError::Unexpected(Opcode::Result)),
            },
            other => Err(ClientError::Unexpected(other)),
        }
    }

    /// Asks the server which protocol options it supports.
    pub fn options(&mut self) -> Result<BTreeMap<String, Vec<String>>, ClientError> {
        let reply = self.round_trip(Opcode::Options, Vec::new())?;
        match reply.opcode()? {
            Opcode::Supported => Ok(ByteReader::new(&reply.body).read_string_multimap()?),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub fn query(
        &mut self,
        query: &str,
        consistency: ConsistencyLevel,
    ) -> Result<Response, ClientError> {
        let request = QueryRequest::new(query, consistency);
        let reply = self.round_trip(Opcode::Query, request.encode())?;
        Ok(Response::decode(reply.opcode()?, &reply.body)?)
    }

    fn round_trip(&mut self, opcode: Opcode, body: Vec<u8>) -> Result<Frame, ClientError> {
        let stream = self.stream_id();
        self.transport
            .write_frame(&Frame::request(stream, opcode, body))?;

        let reply = self.transport.read_frame()?;
        if reply.stream != stream {
            return Err(ProtocolError::malformed(format!(
                "reply on stream {} to request on stream {stream}",
                reply.stream
            ))
            .into());
        }
        Ok(reply)
    }

    /// Cycles through the non-negative stream ids; negative ids are reserved
    /// for server events.
    fn stream_id(&mut self) -> i8 {
        let id = self.next_stream;
        self.next_stream = if id == i8::MAX { 0 } else { id + 1 };
        id
    }
}
