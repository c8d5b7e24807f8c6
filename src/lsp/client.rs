//! Language client for a single language server
//!
//! Ties the [`Sequencer`], the server [`Connection`] and the
//! [`DocumentSyncTracker`] together. Everything that touches the server is
//! queued on the sequencer at call time, so buffer syncs and feature
//! requests reach the server in exactly the order the editor produced them.

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};

use super::connection::{Connection, ConnectionBuilder, ServerLauncher, DEFAULT_MAX_MESSAGE_BYTES};
use super::document::DocumentSyncTracker;
use super::sequencer::Sequencer;
use super::types::*;
use crate::error::{BridgeError, Result};
use crate::plugin::channel::HostChannel;
use crate::plugin::service::LanguageService;
use crate::plugin::types::{
    BufferUpdate, CompletionDetails, CompletionEntry, Completions, DefinitionPosition,
    EvaluateBlock, EventContext, FormattingEdit, FormattingEdits, QuickInfo, References,
};

/// Caller-supplied `initialize` parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializationParams {
    pub root_path: String,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Largest single message accepted from the server
    pub max_output_buffer_bytes: usize,
    /// Method used for `evaluate-block` requests
    pub evaluate_method: String,
    pub formatting: FormattingOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_output_buffer_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            evaluate_method: "$/evaluateBlock".to_string(),
            formatting: FormattingOptions {
                tab_size: 4,
                insert_spaces: true,
            },
        }
    }
}

type ConnectionSlot = Arc<OnceLock<Arc<Connection>>>;

pub struct LanguageClient {
    name: String,
    launcher: Arc<dyn ServerLauncher>,
    params: InitializationParams,
    options: Arc<ClientOptions>,
    channel: Arc<dyn HostChannel>,
    sequencer: Sequencer,
    connection: ConnectionSlot,
    documents: Arc<Mutex<DocumentSyncTracker>>,
}

impl LanguageClient {
    /// Create a client. Must be called inside a tokio runtime (the
    /// sequencer worker is spawned here). Nothing is launched until
    /// [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        launcher: Arc<dyn ServerLauncher>,
        params: InitializationParams,
        options: ClientOptions,
        channel: Arc<dyn HostChannel>,
    ) -> Self {
        let connection: ConnectionSlot = Arc::new(OnceLock::new());
        let gate = connection.clone();
        Self {
            name: name.into(),
            launcher,
            params,
            options: Arc::new(options),
            channel,
            sequencer: Sequencer::new(Arc::new(move || gate.get().is_some())),
            connection,
            documents: Arc::new(Mutex::new(DocumentSyncTracker::new())),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.get().is_some()
    }

    /// Launch the server and send `initialize`.
    ///
    /// Queued like any other task but allowed to run without a connection,
    /// since establishing one is its job. A spawn failure is also raised to
    /// the user as a host alert.
    pub fn start(&self) -> BoxFuture<'static, Result<InitializeResult>> {
        let name = self.name.clone();
        let launcher = self.launcher.clone();
        let root_path = self.params.root_path.clone();
        let max_message_bytes = self.options.max_output_buffer_bytes;
        let channel = self.channel.clone();
        let slot = self.connection.clone();
        let documents = self.documents.clone();

        self.sequencer
            .enqueue(
                move || async move {
                    if slot.get().is_some() {
                        return Err(BridgeError::AlreadyStarted);
                    }

                    let io = match launcher.launch() {
                        Ok(io) => io,
                        Err(e) => {
                            tracing::error!("LSP {} failed to start: {}", name, e);
                            channel.alert(&format!("Unable to start language server {}: {}", name, e));
                            return Err(e);
                        }
                    };

                    let log_name = name.clone();
                    let alerts = channel.clone();
                    let connection = ConnectionBuilder::new(name.clone())
                        .max_message_bytes(max_message_bytes)
                        .on_notification("window/logMessage", move |params| {
                            log_server_message(&log_name, params)
                        })
                        .on_notification("window/showMessage", move |params| {
                            if let Some(message) = parse_message(params) {
                                alerts.alert(&message.message);
                            }
                        })
                        .listen(io);

                    let connection = Arc::new(connection);
                    if slot.set(connection.clone()).is_err() {
                        return Err(BridgeError::AlreadyStarted);
                    }
                    documents
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .reset();

                    let params = json!({
                        "processId": std::process::id(),
                        "rootPath": root_path,
                        "rootUri": DocumentSyncTracker::path_to_uri(&root_path),
                        "capabilities": {}
                    });
                    tracing::debug!("LSP {} sending initialize", name);
                    let result = connection.send_request("initialize", Some(params)).await?;
                    let result: InitializeResult = serde_json::from_value(result)?;

                    match &result.server_info {
                        Some(info) => tracing::info!(
                            "LSP {} initialized: {} {}",
                            name,
                            info.name,
                            info.version.as_deref().unwrap_or_default()
                        ),
                        None => tracing::info!("LSP {} initialized", name),
                    }
                    Ok(result)
                },
                false,
            )
            .boxed()
    }

    /// Sync a buffer update to the server (didOpen or didChange)
    pub fn on_buffer_update(&self, update: BufferUpdate) -> BoxFuture<'static, Result<()>> {
        let documents = self.documents.clone();
        self.with_connection(move |connection| async move {
            let notification = documents
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_buffer_update(&update.event_context, &update.buffer_lines);
            connection
                .send_notification(notification.method(), Some(notification.params()?))
                .await
        })
    }

    /// Queue `op` to run against the live connection
    fn with_connection<T, F, Fut>(&self, op: F) -> BoxFuture<'static, Result<T>>
    where
        F: FnOnce(Arc<Connection>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.connection.clone();
        self.sequencer
            .enqueue(
                move || async move {
                    let connection = slot.get().cloned().ok_or(BridgeError::NotConnected)?;
                    op(connection).await
                },
                true,
            )
            .boxed()
    }

    /// Queue a single request and hand its raw result to `map`
    fn request<T, M>(&self, method: &'static str, params: Value, map: M) -> BoxFuture<'static, Result<T>>
    where
        M: FnOnce(Value) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_connection(move |connection| async move {
            let result = connection.send_request(method, Some(params)).await?;
            map(result)
        })
    }
}

fn position_params(context: &EventContext) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier::new(DocumentSyncTracker::path_to_uri(
            &context.buffer_full_path,
        )),
        position: Position::from_one_indexed(context.line, context.column),
    }
}

fn to_params(params: &impl serde::Serialize) -> Value {
    // These are plain structs of strings and integers
    serde_json::to_value(params).unwrap_or(Value::Null)
}

fn parse_message(params: Option<Value>) -> Option<MessageParams> {
    params.and_then(|p| serde_json::from_value(p).ok())
}

fn log_server_message(server: &str, params: Option<Value>) {
    let Some(message) = parse_message(params) else {
        tracing::trace!("LSP {} sent a malformed logMessage", server);
        return;
    };
    match message.typ {
        MessageType::Error => tracing::error!("LSP {}: {}", server, message.message),
        MessageType::Warning => tracing::warn!("LSP {}: {}", server, message.message),
        MessageType::Info => tracing::info!("LSP {}: {}", server, message.message),
        MessageType::Log => tracing::debug!("LSP {}: {}", server, message.message),
    }
}

impl LanguageService for LanguageClient {
    fn get_quick_info(&self, context: &EventContext) -> BoxFuture<'static, Result<QuickInfo>> {
        let params = to_params(&position_params(context));
        self.request("textDocument/hover", params, |result| {
            let hover: Option<Hover> = serde_json::from_value(result)?;
            let title = hover
                .map(|h| h.contents.to_text().trim().to_string())
                .unwrap_or_default();
            if title.is_empty() {
                return Err(BridgeError::no_information("quickinfo"));
            }
            Ok(QuickInfo {
                title,
                description: String::new(),
            })
        })
    }

    fn get_definition(
        &self,
        context: &EventContext,
    ) -> BoxFuture<'static, Result<DefinitionPosition>> {
        let params = to_params(&position_params(context));
        self.request("textDocument/definition", params, |result| {
            let response: Option<GotoDefinitionResponse> = serde_json::from_value(result)?;
            let location = response
                .and_then(|r| r.into_locations().into_iter().next())
                .ok_or_else(|| BridgeError::no_information("definition"))?;
            let (line, column) = location.range.start.to_one_indexed();
            Ok(DefinitionPosition {
                file_path: location.file_path().to_string(),
                line,
                column,
            })
        })
    }

    fn find_all_references(&self, context: &EventContext) -> BoxFuture<'static, Result<References>> {
        let params = to_params(&ReferenceParams {
            text_document_position: position_params(context),
            context: ReferenceContext {
                include_declaration: true,
            },
        });
        self.request("textDocument/references", params, |result| {
            let locations: Option<Vec<Location>> = serde_json::from_value(result)?;
            Ok(locations
                .unwrap_or_default()
                .iter()
                .map(Location::to_display)
                .collect())
        })
    }

    fn get_completions(&self, context: &EventContext) -> BoxFuture<'static, Result<Completions>> {
        let params = to_params(&position_params(context));
        self.request("textDocument/completion", params, |result| {
            let response: Option<CompletionResponse> = serde_json::from_value(result)?;
            let list = response.map(CompletionResponse::into_list);
            let (is_incomplete, items) = match list {
                Some(list) => (list.is_incomplete, list.items),
                None => (false, Vec::new()),
            };
            Ok(Completions {
                is_incomplete,
                items: items.into_iter().map(CompletionEntry::from).collect(),
            })
        })
    }

    fn get_completion_details(
        &self,
        _context: &EventContext,
        item: &Value,
    ) -> BoxFuture<'static, Result<CompletionDetails>> {
        self.request("completionItem/resolve", item.clone(), |result| {
            let item: CompletionItem = serde_json::from_value(result)?;
            Ok(CompletionDetails::from(item))
        })
    }

    fn get_formatting_edits(
        &self,
        context: &EventContext,
    ) -> BoxFuture<'static, Result<FormattingEdits>> {
        let params = to_params(&DocumentFormattingParams {
            text_document: TextDocumentIdentifier::new(DocumentSyncTracker::path_to_uri(
                &context.buffer_full_path,
            )),
            options: self.options.formatting.clone(),
        });
        let file_path = context.buffer_full_path.clone();
        let version = context.version;
        self.request("textDocument/formatting", params, move |result| {
            let edits: Option<Vec<TextEdit>> = serde_json::from_value(result)?;
            Ok(FormattingEdits {
                file_path,
                version,
                edits: edits
                    .unwrap_or_default()
                    .into_iter()
                    .map(FormattingEdit::from)
                    .collect(),
            })
        })
    }

    fn evaluate_block(
        &self,
        context: &EventContext,
        block: &EvaluateBlock,
    ) -> BoxFuture<'static, Result<Value>> {
        let method = self.options.evaluate_method.clone();
        let params = json!({
            "textDocument": { "uri": DocumentSyncTracker::path_to_uri(&context.buffer_full_path) },
            "id": block.id,
            "fileName": block.file_name,
            "code": block.code,
        });
        self.with_connection(move |connection| async move {
            connection.send_request(&method, Some(params)).await
        })
    }

    fn get_signature_help(&self, context: &EventContext) -> BoxFuture<'static, Result<Value>> {
        let params = to_params(&position_params(context));
        self.request("textDocument/signatureHelp", params, |result| {
            if result.is_null() {
                return Err(BridgeError::no_information("signature help"));
            }
            Ok(result)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeServer;
    use super::*;
    use crate::lsp::connection::ShellLauncher;
    use crate::lsp::document::LINE_ENDING;
    use crate::plugin::channel::recording::{RecordingChannel, Sent};
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn context(path: &str, line: u32, column: u32) -> EventContext {
        EventContext {
            buffer_full_path: path.to_string(),
            line,
            column,
            filetype: "typescript".to_string(),
            version: 1,
        }
    }

    fn update(path: &str, lines: &[&str]) -> BufferUpdate {
        BufferUpdate {
            event_context: context(path, 1, 1),
            buffer_lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn client_for(server: FakeServer) -> (LanguageClient, mpsc::UnboundedReceiver<Value>, Arc<RecordingChannel>) {
        let (launcher, seen) = server.spawn();
        let channel = RecordingChannel::new();
        let client = LanguageClient::new(
            "fake",
            Arc::new(launcher),
            InitializationParams {
                root_path: "/project".into(),
            },
            ClientOptions::default(),
            channel.clone(),
        );
        (client, seen, channel)
    }

    async fn started(server: FakeServer) -> (LanguageClient, mpsc::UnboundedReceiver<Value>, Arc<RecordingChannel>) {
        let (client, mut seen, channel) = client_for(server);
        client.start().await.unwrap();
        let init = seen.recv().await.unwrap();
        assert_eq!(init["method"], "initialize");
        (client, seen, channel)
    }

    #[tokio::test]
    async fn test_start_sync_and_hover_reach_server_in_call_order() {
        let (client, mut seen, _channel) =
            client_for(FakeServer::new().respond("textDocument/hover", json!({"contents": "const x: number"})));

        // Submit everything before awaiting anything
        let start = client.start();
        let sync = client.on_buffer_update(update("/f.ts", &["a", "b"]));
        let info = client.get_quick_info(&context("/f.ts", 1, 1));

        let init = start.await.unwrap();
        sync.await.unwrap();
        let info = info.await.unwrap();

        assert_eq!(init.server_info.unwrap().name, "fake");
        assert_eq!(info.title, "const x: number");

        let first = seen.recv().await.unwrap();
        let second = seen.recv().await.unwrap();
        let third = seen.recv().await.unwrap();

        assert_eq!(first["method"], "initialize");
        assert_eq!(first["params"]["rootPath"], "/project");
        assert_eq!(second["method"], "textDocument/didOpen");
        assert_eq!(
            second["params"]["textDocument"]["text"],
            format!("a{}b", LINE_ENDING)
        );
        assert_eq!(second["params"]["textDocument"]["uri"], "file:////f.ts");
        assert_eq!(third["method"], "textDocument/hover");
        assert_eq!(third["params"]["position"], json!({"line": 0, "character": 0}));
    }

    #[tokio::test]
    async fn test_buffer_switches_reopen_documents() {
        let (client, mut seen, _channel) = started(FakeServer::new()).await;

        for path in ["/a.ts", "/a.ts", "/b.ts", "/a.ts"] {
            client.on_buffer_update(update(path, &["x"])).await.unwrap();
        }

        let mut methods = Vec::new();
        for _ in 0..4 {
            let message = seen.recv().await.unwrap();
            methods.push((
                message["method"].as_str().unwrap().to_string(),
                message["params"]["textDocument"]["uri"].as_str().unwrap().to_string(),
            ));
        }
        assert_eq!(
            methods,
            vec![
                ("textDocument/didOpen".to_string(), "file:////a.ts".to_string()),
                ("textDocument/didChange".to_string(), "file:////a.ts".to_string()),
                ("textDocument/didOpen".to_string(), "file:////b.ts".to_string()),
                ("textDocument/didOpen".to_string(), "file:////a.ts".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_requests_before_start_are_not_connected() {
        let (client, _seen, channel) = client_for(FakeServer::new());

        assert!(matches!(
            client.get_quick_info(&context("/f.ts", 1, 1)).await,
            Err(BridgeError::NotConnected)
        ));
        assert!(matches!(
            client.on_buffer_update(update("/f.ts", &["a"])).await,
            Err(BridgeError::NotConnected)
        ));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_alerts_and_leaves_client_disconnected() {
        let channel = RecordingChannel::new();
        let launcher = ShellLauncher::new("true").with_working_dir("/definitely/not/a/dir");
        let client = LanguageClient::new(
            "broken",
            Arc::new(launcher),
            InitializationParams {
                root_path: "/".into(),
            },
            ClientOptions::default(),
            channel.clone(),
        );

        assert!(matches!(client.start().await, Err(BridgeError::ProcessSpawn(_))));
        assert!(!client.is_connected());
        assert!(matches!(channel.sent().as_slice(), [Sent::Alert(_)]));

        assert!(matches!(
            client.get_definition(&context("/f.ts", 1, 1)).await,
            Err(BridgeError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (client, _seen, _channel) = started(FakeServer::new()).await;
        assert!(matches!(client.start().await, Err(BridgeError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_whitespace_hover_is_no_information() {
        let (client, _seen, _channel) =
            started(FakeServer::new().respond("textDocument/hover", json!({"contents": "  \n "}))).await;

        assert!(matches!(
            client.get_quick_info(&context("/f.ts", 1, 1)).await,
            Err(BridgeError::NoInformation(_))
        ));
        // Null hover as well
        let (client, _seen, _channel) = started(FakeServer::new()).await;
        assert!(matches!(
            client.get_quick_info(&context("/f.ts", 1, 1)).await,
            Err(BridgeError::NoInformation(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_task_does_not_block_the_next() {
        let (client, _seen, _channel) = started(
            FakeServer::new().respond(
                "textDocument/definition",
                json!([{"uri": "file:///src/lib.ts", "range": {"start": {"line": 9, "character": 2}, "end": {"line": 9, "character": 8}}}]),
            ),
        )
        .await;

        let failing = client.get_quick_info(&context("/f.ts", 1, 1));
        let next = client.get_definition(&context("/f.ts", 5, 10));

        assert!(failing.await.is_err());
        assert_eq!(
            next.await.unwrap(),
            DefinitionPosition {
                file_path: "/src/lib.ts".into(),
                line: 10,
                column: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_definition_position_conversion_and_empty_result() {
        let (client, mut seen, _channel) = started(FakeServer::new()).await;

        let result = client.get_definition(&context("/f.ts", 5, 10)).await;
        assert!(matches!(result, Err(BridgeError::NoInformation(_))));

        let request = seen.recv().await.unwrap();
        assert_eq!(request["params"]["position"], json!({"line": 4, "character": 9}));
    }

    #[tokio::test]
    async fn test_references_include_declaration() {
        let (client, mut seen, _channel) = started(FakeServer::new().respond(
            "textDocument/references",
            json!([
                {"uri": "file:///a.ts", "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 3}}},
                {"uri": "file:///b.ts", "range": {"start": {"line": 4, "character": 1}, "end": {"line": 4, "character": 4}}}
            ]),
        ))
        .await;

        let references = client.find_all_references(&context("/a.ts", 1, 1)).await.unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(references[1].file, "/b.ts");
        assert_eq!((references[1].line, references[1].character), (5, 2));

        let request = seen.recv().await.unwrap();
        assert_eq!(request["params"]["context"], json!({"includeDeclaration": true}));
    }

    #[tokio::test]
    async fn test_completions_accept_bare_arrays() {
        let (client, _seen, _channel) = started(FakeServer::new().respond(
            "textDocument/completion",
            json!([{"label": "log", "kind": 2}, {"label": "error", "kind": 2, "data": {"id": 7}}]),
        ))
        .await;

        let completions = client.get_completions(&context("/f.ts", 2, 9)).await.unwrap();
        assert!(!completions.is_incomplete);
        let labels: Vec<_> = completions.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["log", "error"]);
        assert_eq!(completions.items[1].data, Some(json!({"id": 7})));
    }

    #[tokio::test]
    async fn test_completion_details_resolve_host_item() {
        let (client, mut seen, _channel) = started(FakeServer::new().respond(
            "completionItem/resolve",
            json!({"label": "log", "kind": 2, "detail": "(method) log(): void", "documentation": "Prints"}),
        ))
        .await;

        let item = json!({"label": "log", "data": {"id": 7}});
        let details = client
            .get_completion_details(&context("/f.ts", 1, 1), &item)
            .await
            .unwrap();
        assert_eq!(details.detail.as_deref(), Some("(method) log(): void"));
        assert_eq!(details.documentation.as_deref(), Some("Prints"));

        let request = seen.recv().await.unwrap();
        assert_eq!(request["params"], item);
    }

    #[tokio::test]
    async fn test_formatting_edits_are_one_based() {
        let (client, mut seen, _channel) = started(FakeServer::new().respond(
            "textDocument/formatting",
            json!([{"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 2}}, "newText": "    "}]),
        ))
        .await;

        let mut ctx = context("/f.ts", 1, 1);
        ctx.version = 12;
        let edits = client.get_formatting_edits(&ctx).await.unwrap();
        assert_eq!(edits.file_path, "/f.ts");
        assert_eq!(edits.version, 12);
        assert_eq!(edits.edits[0].start.line, 1);
        assert_eq!(edits.edits[0].end.column, 3);

        let request = seen.recv().await.unwrap();
        assert_eq!(request["params"]["options"], json!({"tabSize": 4, "insertSpaces": true}));
    }

    #[tokio::test]
    async fn test_evaluate_block_uses_configured_method() {
        let (client, mut seen, _channel) =
            started(FakeServer::new().respond("$/evaluateBlock", json!({"result": 2}))).await;

        let block = EvaluateBlock {
            id: json!(3),
            file_name: "/f.ts".into(),
            code: "1 + 1".into(),
        };
        let value = client.evaluate_block(&context("/f.ts", 1, 1), &block).await.unwrap();
        assert_eq!(value, json!({"result": 2}));

        let request = seen.recv().await.unwrap();
        assert_eq!(request["method"], "$/evaluateBlock");
        assert_eq!(request["params"]["code"], "1 + 1");
        assert_eq!(request["params"]["textDocument"]["uri"], "file:////f.ts");
    }

    #[tokio::test]
    async fn test_signature_help_passthrough_and_null() {
        let help = json!({"signatures": [{"label": "f(a: number)"}], "activeSignature": 0});
        let (client, _seen, _channel) =
            started(FakeServer::new().respond("textDocument/signatureHelp", help.clone())).await;
        assert_eq!(client.get_signature_help(&context("/f.ts", 1, 3)).await.unwrap(), help);

        let (client, _seen, _channel) = started(FakeServer::new()).await;
        assert!(matches!(
            client.get_signature_help(&context("/f.ts", 1, 3)).await,
            Err(BridgeError::NoInformation(_))
        ));
    }

    #[tokio::test]
    async fn test_show_message_becomes_alert() {
        let (_client, _seen, channel) = started(
            FakeServer::new().notify_after_initialize("window/showMessage", json!({"type": 1, "message": "tsconfig.json not found"})),
        )
        .await;

        let sent = channel.wait_for(1).await;
        assert_eq!(sent, vec![Sent::Alert("tsconfig.json not found".into())]);
    }
}
