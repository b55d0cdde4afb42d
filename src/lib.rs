pub mod cli;
pub mod client;
pub mod consistency;
pub mod engine;
pub mod protocol;

pub use cli::{Command, prompt};
pub use client::Client;
pub use consistency::ConsistencyLevel;
pub use engine::{ClientState, QueryEngine};
