//! HTTP client for the terminal API.

use std::{collections::VecDeque, pin::Pin};

use futures::{Stream, StreamExt, stream::BoxStream};
use termbridge_core::{ExecutionId, OutputMessage};

use crate::protocol::{
    DecodeError, ExecRequest, InterruptRequest, NdjsonDecoder, SessionInfo, SessionQuery,
    StdinRequest,
};

/// Client error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Messages of one exec call, in arrival order.
pub type MessageStream = BoxStream<'static, Result<OutputMessage, ClientError>>;

/// Client for one server and one bearer token.
#[derive(Debug, Clone)]
pub struct TerminalClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TerminalClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, token)
    }

    #[must_use]
    pub fn with_http(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Run a command and stream its messages.
    ///
    /// # Errors
    /// Returns error if the request is rejected (busy session, bad token).
    pub async fn exec(
        &self,
        command: &str,
        project_id: Option<&str>,
    ) -> Result<MessageStream, ClientError> {
        let body = ExecRequest::new(command, project_id.map(str::to_string));
        let response = self
            .http
            .post(self.url("/api/terminal/exec"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(decode_stream(response.bytes_stream()).boxed())
    }

    /// Send input to a running command.
    ///
    /// # Errors
    /// Returns error if the process id is unknown.
    pub async fn stdin(&self, process_id: &ExecutionId, input: &str) -> Result<(), ClientError> {
        let body = StdinRequest {
            process_id: Some(process_id.clone()),
            input: input.to_string(),
        };
        let response = self
            .http
            .post(self.url("/api/terminal/stdin"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Kill a running command.
    ///
    /// # Errors
    /// Returns error if the process id is unknown.
    pub async fn interrupt(&self, process_id: &ExecutionId) -> Result<(), ClientError> {
        let body = InterruptRequest {
            process_id: Some(process_id.clone()),
        };
        let response = self
            .http
            .post(self.url("/api/terminal/interrupt"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Fetch prompt info for the session.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn session(&self, project_id: Option<&str>) -> Result<SessionInfo, ClientError> {
        let query = SessionQuery {
            project_id: project_id.map(str::to_string),
        };
        let response = self
            .http
            .get(self.url("/api/terminal/session"))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Turn a non-success response into [`ClientError::Server`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<OutputMessage>(&body) {
        Ok(OutputMessage::Error { data }) => data,
        _ => body,
    };
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    ready: VecDeque<Result<OutputMessage, ClientError>>,
    done: bool,
}

/// Decode a byte stream into messages, flushing a trailing partial line.
pub fn decode_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<OutputMessage, ClientError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ClientError>,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: NdjsonDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.ready.extend(
                    state
                        .decoder
                        .push(chunk.as_ref())
                        .into_iter()
                        .map(|r| r.map_err(ClientError::from)),
                ),
                Some(Err(e)) => {
                    state.ready.push_back(Err(e.into()));
                    state.done = true;
                }
                None => {
                    state
                        .ready
                        .extend(state.decoder.finish().map(|r| r.map_err(ClientError::from)));
                    state.done = true;
                }
            }
        }
    })
}
