//! CLI utilities for quill.
//!
//! The utilities present in this module are used by the `quill` shell to read
//! commands from a user and print the server's answers.
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::{
    ConsistencyLevel,
    consistency::ParseConsistencyError,
    protocol::{Response, ResultMessage},
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '.consistency' command, {0}")]
    InvalidConsistency(#[from] ParseConsistencyError),

    #[error("failed to access terminal: {0}")]
    Io(#[from] io::Error),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`, also produced at end of input.
    Exit,
    /// `.consistency <LEVEL>` changes the level used by following queries.
    Consistency(ConsistencyLevel),
    /// Anything not starting with `.` is sent to the server as is.
    Query(String),
}

/// Prompt user for a command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    let line = s.trim();
    if !line.starts_with('.') {
        return Ok(Command::Query(line.to_string()));
    }

    match line.split_once(' ').unwrap_or((line, "")) {
        (".exit", "") => Ok(Command::Exit),
        (".consistency", level) => Ok(Command::Consistency(level.parse()?)),
        _ => Err(CommandError::UnrecognizedCommand(line.to_string())),
    }
}

/// One line summary of a response for the terminal.
pub fn render(response: &Response) -> String {
    match response {
        Response::Result(ResultMessage::Void) => "ok".to_string(),
        Response::Result(ResultMessage::Rows(rows)) => format!("rows ({} bytes)", rows.len()),
        Response::Result(ResultMessage::SetKeyspace(keyspace)) => {
            format!("using keyspace {keyspace}")
        }
        Response::Result(ResultMessage::SchemaChange {
            change,
            keyspace,
            table,
        }) if table.is_empty() => format!("{change} {keyspace}"),
        Response::Result(ResultMessage::SchemaChange {
            change,
            keyspace,
            table,
        }) => format!("{change} {keyspace}.{table}"),
        Response::Error(err) => format!("error: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::ErrorKind;

    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_handles_queries() {
        let input = b"SELECT * FROM t\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Query("SELECT * FROM t".to_string()), res);
    }

    #[test]
    fn prompt_end_of_input_exits() {
        let mut output = Vec::new();
        assert_eq!(prompt(&b""[..], &mut output).unwrap(), Command::Exit);
    }

    #[test]
    fn prompt_changes_consistency() {
        let input = b".consistency local_quorum\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Consistency(ConsistencyLevel::LocalQuorum), res);
    }

    #[test]
    #[should_panic(expected = "ParseConsistencyError(\"sometimes\")")]
    fn prompt_invalid_consistency() {
        let input = b".consistency sometimes\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();
    }

    #[test]
    #[should_panic(expected = "UnrecognizedCommand(\".something_wrong\")")]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();
    }

    #[test]
    #[should_panic(expected = "UnrecognizedCommand(\".consistencyquorum\")")]
    fn prompt_consistency_needs_separate_level() {
        let input = b".consistencyquorum\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();
    }

    #[test]
    fn render_responses() {
        assert_eq!(render(&Response::Result(ResultMessage::Void)), "ok");
        assert_eq!(
            render(&Response::Result(ResultMessage::SchemaChange {
                change: "CREATED".into(),
                keyspace: "ks".into(),
                table: "users".into(),
            })),
            "CREATED ks.users"
        );
        assert_eq!(
            render(&Response::error(ErrorKind::Syntax, "line 1:0 no viable alternative")),
            "error: syntax error [0x2000]: line 1:0 no viable alternative"
        );
    }
}
