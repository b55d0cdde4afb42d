use std::{
    collections::BTreeMap,
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{Arc, mpsc},
    thread,
};

use log::{debug, error, info, warn};

use crate::engine::{ClientState, QueryEngine};

use super::{
    ByteReader, CodecConfig, DEFAULT_MAX_FRAME_LENGTH, ErrorKind, Frame, Opcode, ProtocolError,
    ProtocolTransport, QueryExecutor, QueryRequest, Response, ResultMessage, TransportError,
    WorkerPool, primitives::write_string_multimap,
};

/// Query language version advertised in SUPPORTED and sent in STARTUP.
pub const CQL_VERSION: &str = "3.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Queries executed concurrently across all connections.
    pub workers: usize,
    pub max_frame_length: u32,
    pub codec: CodecConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 15,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            codec: CodecConfig::default(),
        }
    }
}

/// Accepts connections and serves each one on its own thread. Queries from
/// every connection share a pool of `workers` threads, so an idle connection
/// never holds a worker.
pub struct QueryServer<E> {
    listener: TcpListener,
    dispatcher: Dispatcher<E>,
    config: ServerConfig,
}

impl<E: QueryEngine + Send + Sync + 'static> QueryServer<E> {
    pub fn bind(
        address: impl ToSocketAddrs,
        engine: Arc<E>,
        config: ServerConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            listener: TcpListener::bind(address)?,
            dispatcher: Dispatcher::new(QueryExecutor::new(engine), config.workers),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails.
    pub fn listen(self) -> Result<(), TransportError> {
        info!(
            "listening at {} with {} workers",
            self.listener.local_addr()?,
            self.dispatcher.pool.size()
        );

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let dispatcher = self.dispatcher.clone();
                    let config = self.config;
                    let spawned = thread::Builder::new()
                        .name("quill-connection".to_string())
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream, dispatcher, config) {
                                warn!("connection closed: {e}");
                            }
                        });
                    if let Err(e) = spawned {
                        warn!("failed to start connection thread: {e}");
                    }
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }
}

/// Hands queries to the shared worker pool and waits for their response.
struct Dispatcher<E> {
    executor: QueryExecutor<E>,
    pool: Arc<WorkerPool>,
}

impl<E> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<E: QueryEngine + Send + Sync + 'static> Dispatcher<E> {
    fn new(executor: QueryExecutor<E>, workers: usize) -> Self {
        Self {
            executor,
            pool: Arc::new(WorkerPool::new(workers)),
        }
    }

    fn execute(&self, request: QueryRequest, state: &ClientState) -> Response {
        let (reply, response) = mpsc::channel();
        let executor = self.executor.clone();
        let state = state.clone();
        self.pool.execute(move || {
            let _ = reply.send(executor.execute(&request, &state));
        });

        response.recv().unwrap_or_else(|_| {
            error!("query dropped before it produced a response");
            Response::error(ErrorKind::ServerError, "query was not executed")
        })
    }
}

fn handle_connection<E: QueryEngine + Send + Sync + 'static>(
    stream: TcpStream,
    dispatcher: Dispatcher<E>,
    config: ServerConfig,
) -> Result<(), TransportError> {
    let remote = stream.peer_addr().ok();
    let mut transport = ProtocolTransport::with_max_frame_length(stream, config.max_frame_length);
    let mut state = ClientState::new(remote);

    loop {
        let frame = match transport.read_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_disconnect() => {
                debug!("{remote:?} disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let reply = respond(&frame, &dispatcher, &mut state, &config.codec);
        transport.write_frame(&reply)?;
    }
}

/// Builds the reply for one request frame. Frames that cannot be parsed are
/// answered with a protocol error on the same stream.
fn respond<E: QueryEngine + Send + Sync + 'static>(
    frame: &Frame,
    dispatcher: &Dispatcher<E>,
    state: &mut ClientState,
    codec: &CodecConfig,
) -> Frame {
    let (opcode, body) = match answer(frame, dispatcher, state, codec) {
        Ok(reply) => reply,
        Err(err) => {
            warn!("rejecting frame on stream {}: {err}", frame.stream);
            let response = Response::error(ErrorKind::Protocol, err.to_string());
            (response.opcode(), response.encode())
        }
    };
    Frame::response(frame.stream, opcode, body)
}

fn answer<E: QueryEngine + Send + Sync + 'static>(
    frame: &Frame,
    dispatcher: &Dispatcher<E>,
    state: &mut ClientState,
    codec: &CodecConfig,
) -> Result<(Opcode, Vec<u8>), ProtocolError> {
    if frame.is_response() {
        return Err(ProtocolError::malformed("response frame sent to server"));
    }

    match frame.opcode()? {
        Opcode::Startup => {
            let options = ByteReader::new(&frame.body).read_string_map()?;
            debug!("startup options: {options:?}");
            Ok((Opcode::Ready, Vec::new()))
        }
        Opcode::Options => {
            let mut supported = BTreeMap::new();
            supported.insert("CQL_VERSION".to_string(), vec![CQL_VERSION.to_string()]);
            supported.insert("COMPRESSION".to_string(), Vec::new());

            let mut body = Vec::new();
            write_string_multimap(&mut body, &supported);
            Ok((Opcode::Supported, body))
        }
        Opcode::Query => {
            let request = QueryRequest::decode(&frame.body, codec)?;
            debug!("received request: {request}");

            let response = dispatcher.execute(request, state);
            if let Response::Result(ResultMessage::SetKeyspace(keyspace)) = &response {
                state.set_keyspace(keyspace.clone());
            }
            Ok((response.opcode(), response.encode()))
        }
        other => Err(ProtocolError::malformed(format!(
            "{other:?} is not a request opcode"
        ))),
    }
}
