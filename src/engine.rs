//! Query engine binding.
//!
//! The engine parses, plans and runs query text; quill only hands it the text,
//! the requested [`ConsistencyLevel`] and the caller's [`ClientState`], and
//! translates whatever comes back into a protocol response.
//!
//! # Failure categories
//!
//! Engines report failures through [`EngineError`], which separates expected
//! outcomes from defects:
//!
//! - [`ValidationError`]: the request itself is wrong (bad syntax, unknown
//!   table, missing permission, stale prepared id).
//! - [`ExecutionError`]: the request was valid but the cluster could not satisfy
//!   its consistency level (not enough replicas, timeouts, replica failures).
//! - [`EngineError::Internal`]: anything else. These are logged as errors by the
//!   executor and answered with a generic server error.
use std::{error, net::SocketAddr};

use thiserror::Error;

use crate::{
    ConsistencyLevel,
    protocol::{ResultMessage, WriteType},
};

/// Processes query text on behalf of a connection.
///
/// Implementations are shared between every connection of a server, so
/// `process` takes `&self` and must not rely on per-call mutable state.
pub trait QueryEngine {
    fn process(
        &self,
        query: &str,
        consistency: ConsistencyLevel,
        state: &ClientState,
    ) -> Result<ResultMessage, EngineError>;
}

/// Connection scoped state handed to the engine with every query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientState {
    remote: Option<SocketAddr>,
    user: Option<String>,
    keyspace: Option<String>,
}

impl ClientState {
    pub fn new(remote: Option<SocketAddr>) -> Self {
        Self {
            remote,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    pub fn set_keyspace(&mut self, keyspace: impl Into<String>) {
        self.keyspace = Some(keyspace.into());
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("{0}")]
    Internal(Box<dyn error::Error + Send + Sync>),
}

impl EngineError {
    pub fn internal(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        EngineError::Internal(err.into())
    }

    /// Validation and execution failures are normal operational outcomes.
    pub fn is_expected(&self) -> bool {
        !matches!(self, EngineError::Internal(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{message}")]
    Unprepared { message: String, id: Vec<u8> },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Cannot achieve consistency level {consistency}")]
    Unavailable {
        consistency: ConsistencyLevel,
        required: i32,
        alive: i32,
    },
    #[error("Operation timed out - received only {received} responses.")]
    ReadTimeout {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        data_present: bool,
    },
    #[error("Operation timed out - received only {received} responses.")]
    WriteTimeout {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        write_type: WriteType,
    },
    #[error("{0}")]
    Truncate(String),
    #[error("Operation failed - received {received} responses and {failures} failures")]
    ReadFailure {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        failures: i32,
        data_present: bool,
    },
    #[error("Operation failed - received {received} responses and {failures} failures")]
    WriteFailure {
        consistency: ConsistencyLevel,
        received: i32,
        block_for: i32,
        failures: i32,
        write_type: WriteType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_is_unexpected() {
        let err = EngineError::internal("disk on fire");
        assert!(!err.is_expected());
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn categories_are_expected() {
        let validation: EngineError = ValidationError::Syntax("line 1:0".into()).into();
        let execution: EngineError = ExecutionError::Truncate("truncate failed".into()).into();
        assert!(validation.is_expected());
        assert!(execution.is_expected());
    }

    #[test]
    fn unavailable_message() {
        let err = ExecutionError::Unavailable {
            consistency: ConsistencyLevel::Quorum,
            required: 2,
            alive: 1,
        };
        assert_eq!(err.to_string(), "Cannot achieve consistency level QUORUM");
    }

    #[test]
    fn client_state_keyspace() {
        let mut state = ClientState::new(None);
        assert_eq!(state.keyspace(), None);
        state.set_keyspace("ks");
        assert_eq!(state.keyspace(), Some("ks"));
    }
}
