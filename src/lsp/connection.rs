//! Structured message connection to a language server process
//!
//! Owns the server's stdio: a writer task serialises outbound frames, a
//! reader task correlates responses with pending requests, answers
//! server-initiated requests and dispatches notifications to handlers
//! registered before listening started.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use super::protocol::{
    read_frame, Frame, IdGenerator, IncomingMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponseOut,
};
use crate::error::{BridgeError, Result};

/// Default per-message ceiling for server output (500 MiB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 500 * 1024 * 1024;

/// Callback for one inbound notification method
pub type NotificationHandler = Box<dyn Fn(Option<Value>) + Send + Sync>;

/// The byte streams of a launched server
pub struct ServerIo {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Killed when the connection is dropped
    pub child: Option<Child>,
}

/// Starts a language server and hands back its streams
pub trait ServerLauncher: Send + Sync {
    fn launch(&self) -> Result<ServerIo>;
}

/// Runs the server from a shell command string
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    command: String,
    working_dir: Option<PathBuf>,
}

impl ShellLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn shell_command(&self) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        }
    }
}

impl ServerLauncher for ShellLauncher {
    fn launch(&self) -> Result<ServerIo> {
        tracing::info!("Spawning language server: {}", self.command);

        let mut cmd = self.shell_command();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::ProcessSpawn(format!("{}: {}", self.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::ProcessSpawn("Failed to get stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::ProcessSpawn("Failed to get stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("language server stderr: {}", line);
                }
            });
        }

        Ok(ServerIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

#[derive(Default)]
struct PendingTable {
    closed: bool,
    waiters: HashMap<i64, oneshot::Sender<Result<Value>>>,
}

type Pending = Arc<Mutex<PendingTable>>;

/// Registers notification handlers, then starts listening
pub struct ConnectionBuilder {
    name: String,
    handlers: HashMap<String, NotificationHandler>,
    max_message_bytes: usize,
}

impl ConnectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    pub fn on_notification(
        mut self,
        method: impl Into<String>,
        handler: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method.into(), Box::new(handler));
        self
    }

    pub fn max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }

    /// Spawn the reader and writer tasks over the server's streams.
    pub fn listen(self, io: ServerIo) -> Connection {
        let pending: Pending = Arc::new(Mutex::new(PendingTable::default()));
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let name = self.name.clone();
        tokio::spawn(Connection::writer_loop(io.writer, writer_rx, name));

        let reader = ReaderLoop {
            name: self.name.clone(),
            pending: pending.clone(),
            handlers: self.handlers,
            writer_tx: writer_tx.clone(),
            max_message_bytes: self.max_message_bytes,
        };
        tokio::spawn(reader.run(io.reader));

        Connection {
            name: self.name,
            writer_tx,
            pending,
            id_gen: IdGenerator::new(),
            _child: std::sync::Mutex::new(io.child),
        }
    }
}

/// Live connection to one language server
pub struct Connection {
    name: String,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    pending: Pending,
    id_gen: IdGenerator,
    _child: std::sync::Mutex<Option<Child>>,
}

impl Connection {
    /// Send a request and wait for the matching response
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.id_gen.next();
        let encoded = JsonRpcRequest::new(id, method, params).encode()?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(BridgeError::Protocol("connection closed".into()));
            }
            pending.waiters.insert(id, tx);
        }

        tracing::debug!("LSP {} -> {} (id={})", self.name, method, id);
        if self.writer_tx.send(encoded).is_err() {
            self.pending.lock().await.waiters.remove(&id);
            return Err(BridgeError::Protocol("writer closed".into()));
        }

        rx.await
            .map_err(|_| BridgeError::Protocol("response channel closed".into()))?
    }

    /// Send a notification (no response expected)
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let encoded = JsonRpcNotification::new(method, params).encode()?;
        tracing::debug!("LSP {} -> {}", self.name, method);
        self.writer_tx
            .send(encoded)
            .map_err(|_| BridgeError::Protocol("writer closed".into()))
    }

    async fn writer_loop(
        mut writer: Box<dyn AsyncWrite + Send + Unpin>,
        mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
        name: String,
    ) {
        while let Some(data) = rx.recv().await {
            if let Err(e) = writer.write_all(&data).await {
                tracing::error!("LSP {} writer error: {}", name, e);
                break;
            }
            if let Err(e) = writer.flush().await {
                tracing::error!("LSP {} flush error: {}", name, e);
                break;
            }
        }
        tracing::debug!("LSP {} writer loop ended", name);
    }
}

struct ReaderLoop {
    name: String,
    pending: Pending,
    handlers: HashMap<String, NotificationHandler>,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    max_message_bytes: usize,
}

impl ReaderLoop {
    async fn run(self, reader: Box<dyn AsyncRead + Send + Unpin>) {
        let mut reader = BufReader::new(reader);

        loop {
            let body = match read_frame(&mut reader, self.max_message_bytes).await {
                Ok(Frame::Message(body)) => body,
                Ok(Frame::Skipped(reason)) => {
                    tracing::warn!("LSP {} skipped message: {}", self.name, reason);
                    continue;
                }
                Ok(Frame::Eof) => {
                    tracing::warn!("LSP {} closed its output", self.name);
                    break;
                }
                Err(e) => {
                    tracing::error!("LSP {} reader error: {}", self.name, e);
                    break;
                }
            };

            match IncomingMessage::parse(&body) {
                Some(message) => self.dispatch(message).await,
                None => {
                    let text = String::from_utf8_lossy(&body);
                    let preview: String = text.chars().take(200).collect();
                    tracing::warn!("LSP {} unparseable message: {}", self.name, preview);
                }
            }
        }

        let mut pending = self.pending.lock().await;
        pending.closed = true;
        for (_, waiter) in pending.waiters.drain() {
            let _ = waiter.send(Err(BridgeError::Protocol("connection closed".into())));
        }
    }

    async fn dispatch(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::Response { id, outcome } => {
                let waiter = self.pending.lock().await.waiters.remove(&id);
                match waiter {
                    Some(tx) => {
                        let result =
                            outcome.map_err(|(code, message)| BridgeError::Rpc { code, message });
                        let _ = tx.send(result);
                    }
                    None => {
                        tracing::debug!("LSP {} response for unknown id {}", self.name, id);
                    }
                }
            }
            IncomingMessage::Request { id, method, .. } => {
                // Nothing the server asks of us needs a real answer; a null
                // result keeps it from waiting.
                tracing::debug!("LSP {} server request {} (id={})", self.name, method, id);
                match JsonRpcResponseOut::success_null(id).encode() {
                    Ok(encoded) => {
                        let _ = self.writer_tx.send(encoded);
                    }
                    Err(e) => tracing::error!("LSP {} failed to encode reply: {}", self.name, e),
                }
            }
            IncomingMessage::Notification { method, params } => {
                match self.handlers.get(&method) {
                    Some(handler) => handler(params),
                    None => tracing::trace!("LSP {} unhandled notification: {}", self.name, method),
                }
            }
        }
    }
}
