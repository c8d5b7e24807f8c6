//! Host communication channel
//!
//! The bridge only needs a reliable, ordered pipe: one inbound handler and
//! three outbound calls. [`LineChannel`] implements it as newline-delimited
//! JSON over any pair of streams (stdin/stdout in the binary).

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Receives each raw envelope from the host
pub type RequestHandler = Arc<dyn Fn(Value) + Send + Sync>;

pub trait HostChannel: Send + Sync {
    /// Install the single inbound handler, replacing any previous one.
    fn on_request(&self, handler: RequestHandler);

    fn send(&self, message_type: &str, context: Value, payload: Value);

    fn send_error(&self, message_type: &str, context: Value, error: &str);

    /// Blocking, user-visible message (spawn failures, `window/showMessage`)
    fn alert(&self, message: &str);
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    original_context: Value,
}

#[derive(Debug, Serialize)]
struct Outbound<'a> {
    #[serde(rename = "type")]
    message_type: &'a str,
    meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Newline-delimited JSON channel
pub struct LineChannel {
    outbound: mpsc::UnboundedSender<String>,
    handler: Mutex<Option<RequestHandler>>,
}

impl LineChannel {
    /// Create a channel whose outbound lines go to `writer`. Spawns the
    /// writer task on the current runtime.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::writer_loop(writer, rx));
        Self {
            outbound,
            handler: Mutex::new(None),
        }
    }

    pub fn stdio() -> Self {
        Self::new(tokio::io::stdout())
    }

    async fn writer_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Send + Unpin,
    {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                tracing::error!("Host channel write failed: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                tracing::error!("Host channel flush failed: {}", e);
                break;
            }
        }
    }

    /// Feed every inbound line to the registered handler until EOF.
    ///
    /// Lines that are not valid JSON (including invalid UTF-8) are logged
    /// and skipped; only a read error or EOF ends the loop.
    pub async fn run_inbound<R>(&self, reader: R) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let envelope: Value = match serde_json::from_slice(&buf) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Dropping unparseable host message: {}", e);
                    continue;
                }
            };
            let handler = self.handler.lock().ok().and_then(|h| h.clone());
            match handler {
                Some(handler) => handler(envelope),
                None => tracing::warn!("No request handler registered; message dropped"),
            }
        }
        tracing::info!("Host channel closed");
        Ok(())
    }

    fn write(&self, message: &impl Serialize) {
        match serde_json::to_string(message) {
            Ok(line) => {
                if self.outbound.send(line).is_err() {
                    tracing::error!("Host channel writer is gone; message dropped");
                }
            }
            Err(e) => tracing::error!("Failed to encode host message: {}", e),
        }
    }
}

impl HostChannel for LineChannel {
    fn on_request(&self, handler: RequestHandler) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    fn send(&self, message_type: &str, context: Value, payload: Value) {
        self.write(&Outbound {
            message_type,
            meta: Meta {
                original_context: context,
            },
            payload: Some(payload),
            error: None,
        });
    }

    fn send_error(&self, message_type: &str, context: Value, error: &str) {
        self.write(&Outbound {
            message_type,
            meta: Meta {
                original_context: context,
            },
            payload: None,
            error: Some(error),
        });
    }

    fn alert(&self, message: &str) {
        self.write(&json!({ "type": "alert", "payload": { "message": message } }));
    }
}
