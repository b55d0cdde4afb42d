use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, error};

use crate::engine::{ClientState, EngineError, ExecutionError, QueryEngine, ValidationError};

use super::{ErrorDetails, ErrorKind, ErrorMessage, QueryRequest, Response};

/// Runs decoded QUERY requests against an engine.
///
/// Every call yields exactly one [`Response`]; engine failures, panics included,
/// are turned into [`Response::Error`] and never escape to the connection.
pub struct QueryExecutor<E> {
    engine: Arc<E>,
}

impl<E> Clone for QueryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<E: QueryEngine> QueryExecutor<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    pub fn execute(&self, request: &QueryRequest, state: &ClientState) -> Response {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine
                .process(request.query(), request.consistency(), state)
        }));

        match outcome {
            Ok(Ok(result)) => Response::Result(result),
            Ok(Err(err)) => {
                if err.is_expected() {
                    debug!("query failed at {}: {err}", request.consistency());
                } else {
                    error!("unexpected error during query '{}': {err}", request.query());
                }
                Response::Error(err.into())
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("engine panicked during query '{}': {message}", request.query());
                Response::error(ErrorKind::ServerError, message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "engine panicked".to_string()
    }
}

impl From<EngineError> for ErrorMessage {
    fn from(value: EngineError) -> Self {
        let message = value.to_string();
        match value {
            EngineError::Validation(err) => match err {
                ValidationError::Syntax(_) => ErrorMessage::new(ErrorKind::Syntax, message),
                ValidationError::Invalid(_) => ErrorMessage::new(ErrorKind::Invalid, message),
                ValidationError::Unauthorized(_) => {
                    ErrorMessage::new(ErrorKind::Unauthorized, message)
                }
                ValidationError::Unprepared { id, .. } => {
                    ErrorMessage::with_details(ErrorDetails::Unprepared { id }, message)
                }
            },
            EngineError::Execution(err) => match err {
                ExecutionError::Truncate(_) => {
                    ErrorMessage::new(ErrorKind::ConsistencyTruncated, message)
                }
                ExecutionError::Unavailable {
                    consistency,
                    required,
                    alive,
                } => ErrorMessage::with_details(
                    ErrorDetails::Unavailable {
                        consistency,
                        required,
                        alive,
                    },
                    message,
                ),
                ExecutionError::ReadTimeout {
                    consistency,
                    received,
                    block_for,
                    data_present,
                } => ErrorMessage::with_details(
                    ErrorDetails::ReadTimeout {
                        consistency,
                        received,
                        block_for,
                        data_present,
                    },
                    message,
                ),
                ExecutionError::WriteTimeout {
                    consistency,
                    received,
                    block_for,
                    write_type,
                } => ErrorMessage::with_details(
                    ErrorDetails::WriteTimeout {
                        consistency,
                        received,
                        block_for,
                        write_type,
                    },
                    message,
                ),
                ExecutionError::ReadFailure {
                    consistency,
                    received,
                    block_for,
                    failures,
                    data_present,
                } => ErrorMessage::with_details(
                    ErrorDetails::ReadFailure {
                        consistency,
                        received,
                        block_for,
                        failures,
                        data_present,
                    },
                    message,
                ),
                ExecutionError::WriteFailure {
                    consistency,
                    received,
                    block_for,
                    failures,
                    write_type,
                } => ErrorMessage::with_details(
                    ErrorDetails::WriteFailure {
                        consistency,
                        received,
                        block_for,
                        failures,
                        write_type,
                    },
                    message,
                ),
            },
            EngineError::Internal(_) => ErrorMessage::new(ErrorKind::ServerError, message),
        }
    }
}
