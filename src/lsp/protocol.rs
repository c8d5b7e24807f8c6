//! JSON-RPC protocol handling for LSP
//!
//! Implements the JSON-RPC 2.0 message format used by LSP,
//! including Content-Length framing for the stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        frame(self)
    }
}

/// JSON-RPC notification (no id, no response expected)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        frame(self)
    }
}

/// JSON-RPC response going back to the server (answers a server request)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponseOut {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub result: Value,
}

impl JsonRpcResponseOut {
    /// Create a success response with null result
    pub fn success_null(id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Value::Null,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        frame(self)
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Any message the server can send us, classified by which fields it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Has `id` and `method`: the server wants an answer.
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    /// Has `id` but no `method`: answers one of our requests.
    Response {
        id: i64,
        outcome: Result<Value, (i32, String)>,
    },
    /// Has `method` but no `id`.
    Notification {
        method: String,
        params: Option<Value>,
    },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

impl IncomingMessage {
    /// Classify a message body. Returns `None` for bodies that are not
    /// JSON-RPC messages we know how to handle.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let raw: RawMessage = serde_json::from_slice(body).ok()?;
        match (raw.id, raw.method) {
            (Some(id), Some(method)) => Some(IncomingMessage::Request {
                id,
                method,
                params: raw.params,
            }),
            (Some(id), None) => {
                let id = id.as_i64()?;
                let outcome = match raw.error {
                    Some(err) => Err((err.code, err.message)),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                Some(IncomingMessage::Response { id, outcome })
            }
            (None, Some(method)) => Some(IncomingMessage::Notification {
                method,
                params: raw.params,
            }),
            (None, None) => None,
        }
    }
}

/// Atomic ID generator for JSON-RPC requests
pub struct IdGenerator(AtomicI64);

impl IdGenerator {
    pub fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn frame<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_string(message)?;
    let message = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
    Ok(message.into_bytes())
}

/// Parse Content-Length header from LSP message headers
///
/// LSP uses HTTP-like headers before the JSON body:
/// ```text
/// Content-Length: 123\r\n
/// \r\n
/// {"jsonrpc": "2.0", ...}
/// ```
pub fn parse_content_length(headers: &str) -> Option<usize> {
    for line in headers.lines() {
        let line = line.trim();
        if line.to_lowercase().starts_with("content-length:") {
            return line
                .split(':')
                .nth(1)
                .and_then(|len| len.trim().parse().ok());
        }
    }
    None
}

/// Outcome of reading one framed message from the server
#[derive(Debug, PartialEq)]
pub enum Frame {
    Message(Vec<u8>),
    /// Headers were unusable or the body exceeded the size limit; the body
    /// (if any) has been consumed so the stream stays aligned.
    Skipped(String),
    Eof,
}

/// Read one Content-Length framed message.
pub async fn read_frame<R>(reader: &mut R, max_body: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(Frame::Eof);
        }
        if line.trim().is_empty() {
            if headers.is_empty() {
                // Stray blank line between messages
                continue;
            }
            break;
        }
        headers.push_str(&line);
    }

    let Some(len) = parse_content_length(&headers) else {
        return Ok(Frame::Skipped("missing Content-Length header".into()));
    };

    if len > max_body {
        let mut limited = (&mut *reader).take(len as u64);
        tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        return Ok(Frame::Skipped(format!(
            "message of {} bytes exceeds limit of {} bytes",
            len, max_body
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Frame::Message(body))
}
