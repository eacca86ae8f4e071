//! Newline-delimited JSON messages streamed back for a command.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ANSI sequence opening a stderr chunk.
pub const STDERR_START: &str = "\x1b[31m";
/// ANSI sequence closing a stderr chunk.
pub const STDERR_END: &str = "\x1b[0m";

/// Opaque identifier of one running execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Allocate a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of the exec stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputMessage {
    /// Process output. An empty `data` is a heartbeat.
    Output { data: String },
    /// Execution bookkeeping.
    Meta(Meta),
    /// Terminal failure; nothing follows it.
    Error { data: String },
}

/// Payload of a `meta` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Meta {
    /// Sent once, before any output, when a process has been registered.
    Started { process_id: ExecutionId },
    /// Sent once when the command is done.
    Finished {
        cwd: String,
        user: String,
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
}

impl OutputMessage {
    /// Plain output text.
    #[must_use]
    pub fn output(data: impl Into<String>) -> Self {
        Self::Output { data: data.into() }
    }

    /// Stderr text, wrapped so renderers can tell it apart from stdout.
    #[must_use]
    pub fn stderr(data: &str) -> Self {
        Self::Output {
            data: format!("{STDERR_START}{data}{STDERR_END}"),
        }
    }

    /// Keep-alive line carrying no output.
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self::Output {
            data: String::new(),
        }
    }

    /// Error line.
    #[must_use]
    pub fn error(data: impl Into<String>) -> Self {
        Self::Error { data: data.into() }
    }

    /// Opening meta carrying the execution id.
    #[must_use]
    pub const fn started(process_id: ExecutionId) -> Self {
        Self::Meta(Meta::Started { process_id })
    }

    /// Closing meta.
    #[must_use]
    pub fn finished(cwd: impl Into<String>, user: impl Into<String>, exit_code: i32) -> Self {
        Self::Meta(Meta::Finished {
            cwd: cwd.into(),
            user: user.into(),
            exit_code,
        })
    }

    /// Whether this is an empty keep-alive line.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Output { data } if data.is_empty())
    }

    /// Whether nothing may follow this message on the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Meta(Meta::Finished { .. }))
    }

    /// Serialize as a single `\n`-terminated NDJSON line.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_shapes_match_protocol() {
        let started = OutputMessage::started(ExecutionId::from("abc"));
        assert_eq!(
            serde_json::to_value(&started).unwrap(),
            json!({"type": "meta", "process_id": "abc"})
        );

        let finished = OutputMessage::finished("~/src", "octo", 0);
        assert_eq!(
            serde_json::to_value(&finished).unwrap(),
            json!({"type": "meta", "cwd": "~/src", "user": "octo", "exitCode": 0})
        );

        assert_eq!(
            serde_json::to_value(OutputMessage::output("hello\n")).unwrap(),
            json!({"type": "output", "data": "hello\n"})
        );
        assert_eq!(
            serde_json::to_value(OutputMessage::error("boom")).unwrap(),
            json!({"type": "error", "data": "boom"})
        );
    }

    #[test]
    fn meta_variants_parse_back() {
        let msg: OutputMessage =
            serde_json::from_str(r#"{"type":"meta","cwd":"~","user":"u","exitCode":2}"#).unwrap();
        assert_eq!(msg, OutputMessage::finished("~", "u", 2));
        assert!(msg.is_terminal());

        let msg: OutputMessage =
            serde_json::from_str(r#"{"type":"meta","process_id":"42"}"#).unwrap();
        assert_eq!(msg, OutputMessage::started(ExecutionId::from("42")));
        assert!(!msg.is_terminal());
    }

    #[test]
    fn heartbeat_is_distinguishable_from_output() {
        assert!(OutputMessage::heartbeat().is_heartbeat());
        assert!(!OutputMessage::output(" ").is_heartbeat());
        assert!(!OutputMessage::error("").is_heartbeat());
    }

    #[test]
    fn stderr_is_marked() {
        let OutputMessage::Output { data } = OutputMessage::stderr("oops") else {
            panic!("expected output");
        };
        assert!(data.starts_with(STDERR_START));
        assert!(data.ends_with(STDERR_END));
        assert!(data.contains("oops"));
    }

    #[test]
    fn ndjson_line_is_newline_terminated() {
        let line = OutputMessage::output("x").to_ndjson().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn random_ids_are_opaque_hex() {
        let a = ExecutionId::random();
        let b = ExecutionId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
