//! Host-facing plugin API
//!
//! [`PluginApi`] owns the inbound side of the host channel. Each envelope
//! is decoded once and routed: editor events go to the event bus, commands
//! to the command registry, and feature requests to the current
//! [`CapabilityProvider`], whose answers are sent back tagged with the
//! request's original context.

use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};

use super::channel::HostChannel;
use super::commands::Commands;
use super::envelope::{CapabilityRequest, ChannelEnvelope, EditorEvent, RequestEnvelope};
use super::events::{EventBus, EventKind, EventPayload};
use super::service::{CapabilityProvider, LanguageService};
use crate::error::{BridgeError, Result};
use crate::lsp::client::{ClientOptions, InitializationParams, LanguageClient};
use crate::lsp::connection::{ServerLauncher, ShellLauncher};

/// What happens when a capability future fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorRouting {
    /// Answer the host with an error response
    Report,
    /// Only log it
    LogOnly,
}

pub struct PluginApi {
    channel: Arc<dyn HostChannel>,
    events: EventBus,
    commands: Commands,
    provider: RwLock<CapabilityProvider>,
}

impl PluginApi {
    /// Create the API and take over the channel's inbound handler
    pub fn new(channel: Arc<dyn HostChannel>) -> Arc<Self> {
        let api = Arc::new(Self {
            channel,
            events: EventBus::new(),
            commands: Commands::new(),
            provider: RwLock::new(CapabilityProvider::NoProvider),
        });

        let weak = Arc::downgrade(&api);
        api.channel.on_request(Arc::new(move |raw: Value| {
            if let Some(api) = weak.upgrade() {
                api.handle_envelope(raw);
            }
        }));
        api
    }

    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    pub fn subscribe(&self, kind: EventKind, handler: impl Fn(&EventPayload) + Send + Sync + 'static) {
        self.events.subscribe(kind, handler);
    }

    /// Make `service` answer all subsequent feature requests
    pub fn register_language_service(&self, service: Arc<dyn LanguageService>) {
        *self.provider.write().unwrap_or_else(PoisonError::into_inner) =
            CapabilityProvider::Provider(service);
    }

    /// Create a language client for a shell command, keep it fed with
    /// buffer updates and make it the capability provider.
    pub fn create_language_client(
        &self,
        command: &str,
        params: InitializationParams,
        options: ClientOptions,
    ) -> Arc<LanguageClient> {
        let name = command.split_whitespace().next().unwrap_or(command).to_string();
        self.create_language_client_with(name, Arc::new(ShellLauncher::new(command)), params, options)
    }

    pub fn create_language_client_with(
        &self,
        name: impl Into<String>,
        launcher: Arc<dyn ServerLauncher>,
        params: InitializationParams,
        options: ClientOptions,
    ) -> Arc<LanguageClient> {
        let client = Arc::new(LanguageClient::new(
            name,
            launcher,
            params,
            options,
            self.channel.clone(),
        ));

        let subscriber = client.clone();
        self.events.subscribe(EventKind::BufferUpdate, move |payload| {
            if let EventPayload::BufferUpdate(update) = payload {
                // Queued now; failures are logged by the sequencer
                tokio::spawn(subscriber.on_buffer_update(update.clone()));
            }
        });

        self.register_language_service(client.clone());
        client
    }

    pub fn set_highlights(&self, file: &str, key: &str, highlights: Value) {
        self.channel.send(
            "set-syntax-highlights",
            Value::Null,
            json!({ "file": file, "key": key, "highlights": highlights }),
        );
    }

    pub fn clear_highlights(&self, file: &str, key: &str) {
        self.channel.send(
            "clear-syntax-highlights",
            Value::Null,
            json!({ "file": file, "key": key }),
        );
    }

    /// Route one raw envelope from the host
    pub fn handle_envelope(&self, raw: Value) {
        let envelope = match ChannelEnvelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(BridgeError::UnknownEnvelope(tag)) => {
                tracing::warn!("Unknown notification type: {}", tag);
                return;
            }
            Err(e) => {
                tracing::warn!("Dropping envelope: {}", e);
                return;
            }
        };

        match envelope {
            ChannelEnvelope::BufferUpdate(update) => {
                self.events
                    .emit(EventKind::BufferUpdate, &EventPayload::BufferUpdate(update));
            }
            ChannelEnvelope::BufferUpdateIncremental(payload) => {
                self.events
                    .emit(EventKind::BufferUpdateIncremental, &EventPayload::Raw(payload));
            }
            ChannelEnvelope::Event(event) => self.route_event(event),
            ChannelEnvelope::Command(invocation) => {
                self.commands.on_command(&invocation.command, &invocation.args);
            }
            ChannelEnvelope::Request(request) => self.dispatch(request),
        }
    }

    fn route_event(&self, event: EditorEvent) {
        let (kinds, context) = match event {
            EditorEvent::CursorMoved(context) => {
                ([EventKind::CursorMoved, EventKind::CursorMovedAutocmd], context)
            }
            EditorEvent::BufWritePost(context) => {
                ([EventKind::BufferSaved, EventKind::BufWritePost], context)
            }
            EditorEvent::BufEnter(context) => ([EventKind::BufferEnter, EventKind::BufEnter], context),
            EditorEvent::Other(name) => {
                tracing::trace!("Ignoring editor event {}", name);
                return;
            }
        };

        let payload = EventPayload::Context(context);
        for kind in kinds {
            self.events.emit(kind, &payload);
        }
    }

    fn dispatch(&self, envelope: RequestEnvelope) {
        let RequestEnvelope {
            original_context,
            request,
        } = envelope;

        let service = self
            .provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .service();
        let Some(service) = service else {
            tracing::debug!("No language service; dropping {} request", request.response_type());
            return;
        };

        let message_type = request.response_type().to_string();
        match request {
            CapabilityRequest::QuickInfo(context) => {
                let pending = service.get_quick_info(&context);
                self.respond(message_type, original_context, pending, ErrorRouting::Report, |info| {
                    // An empty title is not worth showing
                    (!info.title.is_empty()).then(|| {
                        json!({ "info": info.title, "documentation": info.description })
                    })
                });
            }
            CapabilityRequest::GotoDefinition(context) => {
                let pending = service.get_definition(&context);
                self.respond(message_type, original_context, pending, ErrorRouting::LogOnly, to_payload);
            }
            CapabilityRequest::FindAllReferences(context) => {
                let pending = service.find_all_references(&context);
                self.respond(message_type, original_context, pending, ErrorRouting::LogOnly, |references| {
                    Some(json!({ "references": references }))
                });
            }
            CapabilityRequest::Completions(context) => {
                let pending = service.get_completions(&context);
                self.respond(message_type, original_context, pending, ErrorRouting::Report, to_payload);
            }
            CapabilityRequest::CompletionItemSelected { context, item } => {
                let pending = service.get_completion_details(&context, &item);
                self.respond(message_type, original_context, pending, ErrorRouting::LogOnly, |details| {
                    Some(json!({ "details": details }))
                });
            }
            CapabilityRequest::Format(context) => {
                let pending = service.get_formatting_edits(&context);
                self.respond(message_type, original_context, pending, ErrorRouting::LogOnly, to_payload);
            }
            CapabilityRequest::EvaluateBlock { context, block } => {
                let pending = service.evaluate_block(&context, &block);
                self.respond(message_type, original_context, pending, ErrorRouting::LogOnly, Some);
            }
            CapabilityRequest::SignatureHelp(context) => {
                let pending = service.get_signature_help(&context);
                self.respond(message_type, original_context, pending, ErrorRouting::Report, Some);
            }
            CapabilityRequest::Unknown(name) => {
                tracing::warn!("Unknown request type: {}", name);
            }
        }
    }

    /// Await `pending` off the routing path and post the outcome
    fn respond<T, F>(
        &self,
        message_type: String,
        context: Value,
        pending: BoxFuture<'static, Result<T>>,
        routing: ErrorRouting,
        payload: F,
    ) where
        T: Send + 'static,
        F: FnOnce(T) -> Option<Value> + Send + 'static,
    {
        let channel = self.channel.clone();
        tokio::spawn(async move {
            match pending.await {
                Ok(result) => {
                    if let Some(payload) = payload(result) {
                        channel.send(&message_type, context, payload);
                    }
                }
                Err(e) => match routing {
                    ErrorRouting::Report => channel.send_error(&message_type, context, &e.to_string()),
                    ErrorRouting::LogOnly => {
                        tracing::debug!("{} request failed: {}", message_type, e)
                    }
                },
            }
        });
    }
}

fn to_payload<T: Serialize>(value: T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("Failed to encode response: {}", e);
            None
        }
    }
}
