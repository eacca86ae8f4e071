//! Wire protocol for client-server communication.
//!
//! Responses from `exec` are NDJSON: one [`OutputMessage`] per line. The
//! other endpoints take and return small JSON objects.

use serde::{Deserialize, Serialize};
use termbridge_core::{ExecutionId, OutputMessage, WorkspaceContext};
use thiserror::Error;

/// Content type of the exec stream.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Body of `POST /api/terminal/exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ExecRequest {
    #[must_use]
    pub fn new(command: impl Into<String>, project_id: Option<String>) -> Self {
        Self {
            command: command.into(),
            project_id,
        }
    }

    /// Workspace context named by the request.
    #[must_use]
    pub fn context(&self) -> WorkspaceContext {
        context_for(self.project_id.as_deref())
    }
}

/// Body of `POST /api/terminal/stdin`.
///
/// Both fields are optional on the wire so a missing id can be reported as
/// a bad request instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdinRequest {
    #[serde(default)]
    pub process_id: Option<ExecutionId>,
    #[serde(default)]
    pub input: String,
}

/// Body of `POST /api/terminal/interrupt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptRequest {
    #[serde(default)]
    pub process_id: Option<ExecutionId>,
}

/// Query of `GET /api/terminal/session`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub project_id: Option<String>,
}

impl SessionQuery {
    #[must_use]
    pub fn context(&self) -> WorkspaceContext {
        context_for(self.project_id.as_deref())
    }
}

/// Prompt information for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub cwd: String,
    pub user: String,
}

/// `{"success": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub const OK: Self = Self { success: true };
}

fn context_for(project_id: Option<&str>) -> WorkspaceContext {
    match project_id.filter(|id| !id.is_empty()) {
        Some(id) => WorkspaceContext::project(id),
        None => WorkspaceContext::none(),
    }
}

/// A line of the exec stream that is not a valid message.
#[derive(Debug, Error)]
#[error("Invalid stream line {line:?}: {source}")]
pub struct DecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

/// Incremental NDJSON decoder.
///
/// Network chunks may split a line anywhere, including inside a multi-byte
/// character; bytes are buffered until the newline arrives.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every message it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<OutputMessage, DecodeError>> {
        self.buf.extend_from_slice(chunk);
        let Some(last_newline) = self.buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Decode whatever is left after the stream ended without a newline.
    pub fn finish(&mut self) -> Option<Result<OutputMessage, DecodeError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }

    /// Bytes waiting for a newline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<OutputMessage, DecodeError>> {
    let line = raw.trim_ascii();
    if line.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(line).map_err(|source| DecodeError {
            line: String::from_utf8_lossy(line).into_owned(),
            source,
        }),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn ok(results: Vec<Result<OutputMessage, DecodeError>>) -> Vec<OutputMessage> {
        results.into_iter().map(Result::unwrap).collect()
    }

    #[test]
    fn lines_split_across_chunks() {
        let mut decoder = NdjsonDecoder::new();
        let stream = "{\"type\":\"output\",\"data\":\"héllo\\n\"}\n{\"type\":\"meta\",\"process_id\":\"ab\"}\n";
        let bytes = stream.as_bytes();
        // Split inside the multi-byte 'é'.
        let cut = stream.find('é').unwrap() + 1;

        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(decoder.pending(), cut);
        let messages = ok(decoder.push(&bytes[cut..]));
        assert_eq!(
            messages,
            vec![
                OutputMessage::output("héllo\n"),
                OutputMessage::started(ExecutionId::from("ab")),
            ]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut decoder = NdjsonDecoder::new();
        let messages = ok(decoder.push(b"\n\r\n{\"type\":\"output\",\"data\":\"\"}\r\n\n"));
        assert_eq!(messages, vec![OutputMessage::heartbeat()]);
    }

    #[test]
    fn bad_lines_do_not_poison_the_stream() {
        let mut decoder = NdjsonDecoder::new();
        let results = decoder.push(b"not json\n{\"type\":\"error\",\"data\":\"boom\"}\n");
        assert_eq!(results.len(), 2);
        let err = results[0].as_ref().unwrap_err();
        assert_eq!(err.line, "not json");
        assert_eq!(
            results[1].as_ref().unwrap(),
            &OutputMessage::error("boom")
        );
    }

    #[test]
    fn finish_flushes_an_unterminated_line() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(b"{\"type\":\"output\",\"data\":\"x\"}").is_empty());
        assert_eq!(
            decoder.finish().unwrap().unwrap(),
            OutputMessage::output("x")
        );
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn stdin_request_tolerates_missing_fields() {
        let req: StdinRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.process_id, None);
        assert_eq!(req.input, "");

        let req: StdinRequest =
            serde_json::from_value(json!({"process_id": "abc", "input": "y\n"})).unwrap();
        assert_eq!(req.process_id, Some(ExecutionId::from("abc")));
    }

    #[test]
    fn empty_project_id_means_no_workspace() {
        let req = ExecRequest::new("ls", Some(String::new()));
        assert_eq!(req.context(), WorkspaceContext::none());
        let req: ExecRequest =
            serde_json::from_value(json!({"command": "ls", "project_id": "demo"})).unwrap();
        assert_eq!(req.context(), WorkspaceContext::project("demo"));
        assert_eq!(
            serde_json::to_value(ExecRequest::new("ls", None)).unwrap(),
            json!({"command": "ls"})
        );
    }

    #[test]
    fn success_shape() {
        assert_eq!(serde_json::to_value(Success::OK).unwrap(), json!({"success": true}));
    }
}
