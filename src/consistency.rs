//! Consistency levels.
//!
//! A [`ConsistencyLevel`] states how many (and which) replicas must acknowledge a
//! query before it is considered satisfied. On the wire every level is a fixed
//! `u16` code; in memory it is a plain enumerant. Both directions are resolved
//! through a single table, so adding a level means adding one row.
//!
//! Unknown codes are rejected, never mapped to a default level.
//!
//! # Example
//! ```rust
//! use quill::ConsistencyLevel;
//!
//! let level: ConsistencyLevel = "local_quorum".parse().unwrap();
//! assert_eq!(level.code(), 0x0006);
//! assert_eq!(ConsistencyLevel::from_code(0x0006).unwrap(), level);
//! ```
use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

/// Enumerant, wire code and display name of every supported level.
const LEVELS: [(ConsistencyLevel, u16, &str); 11] = [
    (ConsistencyLevel::Any, 0x0000, "ANY"),
    (ConsistencyLevel::One, 0x0001, "ONE"),
    (ConsistencyLevel::Two, 0x0002, "TWO"),
    (ConsistencyLevel::Three, 0x0003, "THREE"),
    (ConsistencyLevel::Quorum, 0x0004, "QUORUM"),
    (ConsistencyLevel::All, 0x0005, "ALL"),
    (ConsistencyLevel::LocalQuorum, 0x0006, "LOCAL_QUORUM"),
    (ConsistencyLevel::EachQuorum, 0x0007, "EACH_QUORUM"),
    (ConsistencyLevel::Serial, 0x0008, "SERIAL"),
    (ConsistencyLevel::LocalSerial, 0x0009, "LOCAL_SERIAL"),
    (ConsistencyLevel::LocalOne, 0x000A, "LOCAL_ONE"),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown consistency level '{0}'")]
pub struct ParseConsistencyError(String);

impl ConsistencyLevel {
    /// Every defined level, in wire code order.
    pub fn levels() -> impl Iterator<Item = ConsistencyLevel> {
        LEVELS.iter().map(|(level, _, _)| *level)
    }

    pub fn code(self) -> u16 {
        self.entry().1
    }

    pub fn name(self) -> &'static str {
        self.entry().2
    }

    pub fn from_code(code: u16) -> Result<Self, ProtocolError> {
        LEVELS
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(level, _, _)| *level)
            .ok_or_else(|| {
                ProtocolError::malformed(format!("unknown consistency code {code:#06x}"))
            })
    }

    // Rows of LEVELS are ordered by discriminant.
    fn entry(self) -> &'static (ConsistencyLevel, u16, &'static str) {
        &LEVELS[self as usize]
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = ParseConsistencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        LEVELS
            .iter()
            .find(|(_, _, n)| n.eq_ignore_ascii_case(name))
            .map(|(level, _, _)| *level)
            .ok_or_else(|| ParseConsistencyError(name.to_string()))
    }
}
