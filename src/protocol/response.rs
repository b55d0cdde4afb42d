use std::{fmt, str::FromStr};

use crate::ConsistencyLevel;

use super::{
    Opcode, ProtocolError,
    primitives::{ByteReader, write_consistency, write_short_bytes, write_string},
};

/// Answer to one executed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Result(ResultMessage),
    Error(ErrorMessage),
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error(ErrorMessage::new(kind, message))
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Response::Result(_) => Opcode::Result,
            Response::Error(_) => Opcode::Error,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Response::Result(result) => result.encode_into(&mut buf),
            Response::Error(error) => error.encode_into(&mut buf),
        }
        buf
    }

    pub fn decode(opcode: Opcode, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = ByteReader::new(body);
        match opcode {
            Opcode::Result => Ok(Response::Result(ResultMessage::decode(&mut reader)?)),
            Opcode::Error => Ok(Response::Error(ErrorMessage::decode(&mut reader)?)),
            other => Err(ProtocolError::malformed(format!(
                "opcode {other:?} does not carry a response"
            ))),
        }
    }
}

const RESULT_VOID: u32 = 0x0001;
const RESULT_ROWS: u32 = 0x0002;
const RESULT_SET_KEYSPACE: u32 = 0x0003;
const RESULT_SCHEMA_CHANGE: u32 = 0x0005;

/// Successful outcome produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultMessage {
    Void,
    /// Row metadata and rows, already encoded by the engine.
    Rows(Vec<u8>),
    SetKeyspace(String),
    SchemaChange {
        change: String,
        keyspace: String,
        table: String,
    },
}

impl ResultMessage {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            ResultMessage::Void => buf.extend_from_slice(&RESULT_VOID.to_be_bytes()),
            ResultMessage::Rows(rows) => {
                buf.extend_from_slice(&RESULT_ROWS.to_be_bytes());
                buf.extend_from_slice(rows);
            }
            ResultMessage::SetKeyspace(keyspace) => {
                buf.extend_from_slice(&RESULT_SET_KEYSPACE.to_be_bytes());
                write_string(buf, keyspace);
            }
            ResultMessage::SchemaChange {
                change,
                keyspace,
                table,
            } => {
                buf.extend_from_slice(&RESULT_SCHEMA_CHANGE.to_be_bytes());
                write_string(buf, change);
                write_string(buf, keyspace);
                write_string(buf, table);
            }
        }
    }

    fn decode(reader: &mut ByteReader) -> Result<Self, ProtocolError> {
        match reader.read_u32("result kind")? {
            RESULT_VOID => Ok(ResultMessage::Void),
            RESULT_ROWS => Ok(ResultMessage::Rows(reader.rest().to_vec())),
            RESULT_SET_KEYSPACE => Ok(ResultMessage::SetKeyspace(reader.read_string("keyspace")?)),
            RESULT_SCHEMA_CHANGE => Ok(ResultMessage::SchemaChange {
                change: reader.read_string("schema change")?,
                keyspace: reader.read_string("keyspace")?,
                table: reader.read_string("table")?,
            }),
            kind => Err(ProtocolError::malformed(format!(
                "unknown result kind {kind:#06x}"
            ))),
        }
    }
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ServerError,
    Protocol,
    ConsistencyUnavailable,
    ConsistencyTruncated,
    ConsistencyTimeout,
    ReadFailure,
    WriteFailure,
    Syntax,
    Unauthorized,
    Invalid,
    Unprepared,
}

const ERR_SERVER: u32 = 0x0000;
const ERR_PROTOCOL: u32 = 0x000A;
const ERR_UNAVAILABLE: u32 = 0x1000;
const ERR_TRUNCATE: u32 = 0x1003;
const ERR_WRITE_TIMEOUT: u32 = 0x1100;
const ERR_READ_TIMEOUT: u32 = 0x1200;
const ERR_READ_FAILURE: u32 = 0x1300;
const ERR_WRITE_FAILURE: u32 = 0x1500;
const ERR_SYNTAX: u32 = 0x2000;
const ERR_UNAUTHORIZED: u32 = 0x2100;
const ERR_INVALID: u32 = 0x2200;
const ERR_UNPREPARED: u32 = 0x2500;

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ServerError => "server error",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::ConsistencyUnavailable => "unavailable",
            ErrorKind::ConsistencyTruncated => "truncate error",
            ErrorKind::ConsistencyTimeout => "timeout",
            ErrorKind::ReadFailure => "read failure",
            ErrorKind::WriteFailure => "write failure",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Invalid => "invalid query",
            ErrorKind::Unprepared => "unprepared",
        };
        f.write_str(name)
    }
}

/// Kind of write that timed out or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    Simple,
    Batch,
    UnloggedBatch,
    Counter,
    BatchLog,
    Cas,
    View,
    Cdc,
}

const WRITE_TYPES: [(WriteType, &str); 8] = [
    (WriteType::Simple, "SIMPLE"),
    (WriteType::Batch, "BATCH"),
    (WriteType::UnloggedBatch, "UNLOGGED_BATCH"),
    (WriteType::Counter, "COUNTER"),
    (WriteType::BatchLog, "BATCH_LOG"),
    (WriteType::Cas, "CAS"),
    (WriteType::View, "VIEW"),
    (WriteType::Cdc, "CDC"),
];

impl fmt::Display for WriteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(WRITE_TYPES[*self as usize].1)
    }
}

impl FromStr for WriteType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WRITE_TYPES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(write_type, _)| *write_type)
            .ok_or_else(|| ProtocolError::malformed(format!("unknown write type '{s}'")))
    }
}

/// Extra fields sent after the message for some error codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetails {
    Unavailable {
        consistency: ConsistencyLevel,
        required: i32,
        alive: i32,
    },
    ReadTimeout {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        data_present: bool,
    },
    WriteTimeout {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        write_type: WriteType,
    },
    ReadFailure {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        failures: i32,
        data_present: bool,
    },
    WriteFailure {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        failures: i32,
        write_type: WriteType,
    },
    Unprepared {
        id: Vec<u8>,
    },
}

impl ErrorDetails {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorDetails::Unavailable { .. } => ErrorKind::ConsistencyUnavailable,
            ErrorDetails::ReadTimeout { .. } | ErrorDetails::WriteTimeout { .. } => {
                ErrorKind::ConsistencyTimeout
            }
            ErrorDetails::ReadFailure { .. } => ErrorKind::ReadFailure,
            ErrorDetails::WriteFailure { .. } => ErrorKind::WriteFailure,
            ErrorDetails::Unprepared { .. } => ErrorKind::Unprepared,
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            ErrorDetails::Unavailable {
                consistency,
                required,
                alive,
            } => {
                write_consistency(buf, *consistency);
                buf.extend_from_slice(&required.to_be_bytes());
                buf.extend_from_slice(&alive.to_be_bytes());
            }
            ErrorDetails::ReadTimeout {
                consistency,
                received,
                block_for,
                data_present,
            } => {
                write_consistency(buf, *consistency);
                buf.extend_from_slice(&received.to_be_bytes());
                buf.extend_from_slice(&block_for.to_be_bytes());
                buf.push(u8::from(*data_present));
            }
            ErrorDetails::WriteTimeout {
                consistency,
                received,
                block_for,
                write_type,
            } => {
                write_consistency(buf, *consistency);
                buf.extend_from_slice(&received.to_be_bytes());
                buf.extend_from_slice(&block_for.to_be_bytes());
                write_string(buf, &write_type.to_string());
            }
            ErrorDetails::ReadFailure {
                consistency,
                received,
                block_for,
                failures,
                data_present,
            } => {
                write_consistency(buf, *consistency);
                buf.extend_from_slice(&received.to_be_bytes());
                buf.extend_from_slice(&block_for.to_be_bytes());
                buf.extend_from_slice(&failures.to_be_bytes());
                buf.push(u8::from(*data_present));
            }
            ErrorDetails::WriteFailure {
                consistency,
                received,
                block_for,
                failures,
                write_type,
            } => {
                write_consistency(buf, *consistency);
                buf.extend_from_slice(&received.to_be_bytes());
                buf.extend_from_slice(&block_for.to_be_bytes());
                buf.extend_from_slice(&failures.to_be_bytes());
                write_string(buf, &write_type.to_string());
            }
            ErrorDetails::Unprepared { id } => write_short_bytes(buf, id),
        }
    }

    /// Reads the extra fields defined for `code`, or `None` when the code has none.
    fn decode(code: u32, reader: &mut ByteReader) -> Result<Option<Self>, ProtocolError> {
        let details = match code {
            ERR_UNAVAILABLE => ErrorDetails::Unavailable {
                consistency: reader.read_consistency()?,
                required: reader.read_i32("required replicas")?,
                alive: reader.read_i32("alive replicas")?,
            },
            ERR_READ_TIMEOUT => ErrorDetails::ReadTimeout {
                consistency: reader.read_consistency()?,
                received: reader.read_i32("received")?,
                block_for: reader.read_i32("block for")?,
                data_present: reader.read_bool("data present")?,
            },
            ERR_WRITE_TIMEOUT => ErrorDetails::WriteTimeout {
                consistency: reader.read_consistency()?,
                received: reader.read_i32("received")?,
                block_for: reader.read_i32("block for")?,
                write_type: reader.read_string("write type")?.parse()?,
            },
            ERR_READ_FAILURE => ErrorDetails::ReadFailure {
                consistency: reader.read_consistency()?,
                received: reader.read_i32("received")?,
                block_for: reader.read_i32("block for")?,
                failures: reader.read_i32("failures")?,
                data_present: reader.read_bool("data present")?,
            },
            ERR_WRITE_FAILURE => ErrorDetails::WriteFailure {
                consistency: reader.read_consistency()?,
                received: reader.read_i32("received")?,
                block_for: reader.read_i32("block for")?,
                failures: reader.read_i32("failures")?,
                write_type: reader.read_string("write type")?.parse()?,
            },
            ERR_UNPREPARED => ErrorDetails::Unprepared {
                id: reader.read_short_bytes("statement id")?,
            },
            _ => return Ok(None),
        };
        Ok(Some(details))
    }
}

/// Body of an ERROR frame: `[int]` code, `[string]` message, then the
/// code-specific fields when details are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    kind: ErrorKind,
    message: String,
    details: Option<ErrorDetails>,
}

impl ErrorMessage {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Kind is taken from the details so the two can never disagree.
    pub fn with_details(details: ErrorDetails, message: impl Into<String>) -> Self {
        Self {
            kind: details.kind(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        self.details.as_ref()
    }

    pub fn code(&self) -> u32 {
        match self.kind {
            ErrorKind::ServerError => ERR_SERVER,
            ErrorKind::Protocol => ERR_PROTOCOL,
            ErrorKind::ConsistencyUnavailable => ERR_UNAVAILABLE,
            ErrorKind::ConsistencyTruncated => ERR_TRUNCATE,
            ErrorKind::ConsistencyTimeout => match self.details {
                Some(ErrorDetails::ReadTimeout { .. }) => ERR_READ_TIMEOUT,
                _ => ERR_WRITE_TIMEOUT,
            },
            ErrorKind::ReadFailure => ERR_READ_FAILURE,
            ErrorKind::WriteFailure => ERR_WRITE_FAILURE,
            ErrorKind::Syntax => ERR_SYNTAX,
            ErrorKind::Unauthorized => ERR_UNAUTHORIZED,
            ErrorKind::Invalid => ERR_INVALID,
            ErrorKind::Unprepared => ERR_UNPREPARED,
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.code().to_be_bytes());
        write_string(buf, &self.message);
        if let Some(details) = &self.details {
            details.encode_into(buf);
        }
    }

    fn decode(reader: &mut ByteReader) -> Result<Self, ProtocolError> {
        let code = reader.read_u32("error code")?;
        let kind = match code {
            ERR_SERVER => ErrorKind::ServerError,
            ERR_PROTOCOL => ErrorKind::Protocol,
            ERR_UNAVAILABLE => ErrorKind::ConsistencyUnavailable,
            ERR_TRUNCATE => ErrorKind::ConsistencyTruncated,
            ERR_WRITE_TIMEOUT | ERR_READ_TIMEOUT => ErrorKind::ConsistencyTimeout,
            ERR_READ_FAILURE => ErrorKind::ReadFailure,
            ERR_WRITE_FAILURE => ErrorKind::WriteFailure,
            ERR_SYNTAX => ErrorKind::Syntax,
            ERR_UNAUTHORIZED => ErrorKind::Unauthorized,
            ERR_INVALID => ErrorKind::Invalid,
            ERR_UNPREPARED => ErrorKind::Unprepared,
            code => {
                return Err(ProtocolError::malformed(format!(
                    "unknown error code {code:#06x}"
                )));
            }
        };
        let message = reader.read_string("error message")?;

        let details = if reader.remaining() > 0 {
            ErrorDetails::decode(code, reader)?
        } else if code == ERR_READ_TIMEOUT {
            return Err(ProtocolError::malformed("read timeout without details"));
        } else {
            None
        };

        Ok(Self {
            kind,
            message,
            details,
        })
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:#06x}]: {}", self.kind, self.code(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reencode(response: &Response) -> Response {
        Response::decode(response.opcode(), &response.encode()).unwrap()
    }

    #[test]
    fn void_result_layout() {
        let response = Response::Result(ResultMessage::Void);
        assert_eq!(response.opcode(), Opcode::Result);
        assert_eq!(response.encode(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn results_decode() {
        let results = [
            ResultMessage::Void,
            ResultMessage::Rows(vec![0, 0, 0, 1, 0xFF]),
            ResultMessage::SetKeyspace("ks".into()),
            ResultMessage::SchemaChange {
                change: "CREATED".into(),
                keyspace: "ks".into(),
                table: "users".into(),
            },
        ];
        for result in results {
            let response = Response::Result(result);
            assert_eq!(reencode(&response), response);
        }
    }

    #[test]
    fn syntax_error_layout() {
        let response = Response::error(ErrorKind::Syntax, "line 1:0");
        let mut expected = vec![0x00, 0x00, 0x20, 0x00, 0x00, 0x08];
        expected.extend_from_slice(b"line 1:0");

        assert_eq!(response.opcode(), Opcode::Error);
        assert_eq!(response.encode(), expected);
    }

    #[test]
    fn unavailable_layout() {
        let error = ErrorMessage::with_details(
            ErrorDetails::Unavailable {
                consistency: ConsistencyLevel::Quorum,
                required: 2,
                alive: 1,
            },
            "",
        );
        assert_eq!(error.kind(), ErrorKind::ConsistencyUnavailable);
        assert_eq!(
            Response::Error(error).encode(),
            vec![0, 0, 0x10, 0, 0, 0, 0, 4, 0, 0, 0, 2, 0, 0, 0, 1]
        );
    }

    #[test]
    fn timeout_code_follows_details() {
        let read = ErrorMessage::with_details(
            ErrorDetails::ReadTimeout {
                consistency: ConsistencyLevel::One,
                received: 0,
                block_for: 1,
                data_present: false,
            },
            "read timed out",
        );
        let write = ErrorMessage::with_details(
            ErrorDetails::WriteTimeout {
                consistency: ConsistencyLevel::All,
                received: 1,
                block_for: 3,
                write_type: WriteType::Batch,
            },
            "write timed out",
        );

        assert_eq!(read.code(), 0x1200);
        assert_eq!(write.code(), 0x1100);
        assert_eq!(read.kind(), write.kind());

        for error in [read, write] {
            let response = Response::Error(error);
            assert_eq!(reencode(&response), response);
        }
    }

    #[test]
    fn detailed_errors_decode() {
        let errors = [
            ErrorMessage::with_details(
                ErrorDetails::ReadFailure {
                    consistency: ConsistencyLevel::LocalQuorum,
                    received: 1,
                    block_for: 2,
                    failures: 1,
                    data_present: true,
                },
                "replica failed",
            ),
            ErrorMessage::with_details(
                ErrorDetails::WriteFailure {
                    consistency: ConsistencyLevel::EachQuorum,
                    received: 0,
                    block_for: 4,
                    failures: 2,
                    write_type: WriteType::UnloggedBatch,
                },
                "replica failed",
            ),
            ErrorMessage::with_details(ErrorDetails::Unprepared { id: vec![1, 2, 3] }, "gone"),
            ErrorMessage::new(ErrorKind::ConsistencyTruncated, "truncate failed"),
            ErrorMessage::new(ErrorKind::ServerError, "boom"),
        ];
        for error in errors {
            let response = Response::Error(error);
            assert_eq!(reencode(&response), response);
        }
    }

    #[test]
    #[should_panic(expected = "unknown error code 0x9999")]
    fn unknown_error_code() {
        let body = [0x00, 0x00, 0x99, 0x99, 0x00, 0x00];
        Response::decode(Opcode::Error, &body).unwrap();
    }

    #[test]
    #[should_panic(expected = "unknown write type 'SOMETIMES'")]
    fn unknown_write_type() {
        "SOMETIMES".parse::<WriteType>().unwrap();
    }

    #[test]
    fn display() {
        let error = ErrorMessage::new(ErrorKind::Invalid, "unknown table t");
        assert_eq!(error.to_string(), "invalid query [0x2200]: unknown table t");
    }
}
