//! Inbound host envelopes
//!
//! Every message from the host is `{ "type": ..., "payload": ... }`. It is
//! decoded once, at the channel boundary, into [`ChannelEnvelope`]; nothing
//! downstream touches raw JSON fields.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::types::{BufferUpdate, EvaluateBlock, EventContext};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEnvelope {
    BufferUpdate(BufferUpdate),
    /// Passed through to subscribers untouched
    BufferUpdateIncremental(Value),
    Event(EditorEvent),
    Command(CommandInvocation),
    Request(RequestEnvelope),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    CursorMoved(EventContext),
    BufWritePost(EventContext),
    BufEnter(EventContext),
    /// Any autocommand we do not route
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandInvocation {
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

/// A feature request plus the raw context the host wants echoed back
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub original_context: Value,
    pub request: CapabilityRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityRequest {
    QuickInfo(EventContext),
    GotoDefinition(EventContext),
    FindAllReferences(EventContext),
    Completions(EventContext),
    CompletionItemSelected { context: EventContext, item: Value },
    Format(EventContext),
    EvaluateBlock { context: EventContext, block: EvaluateBlock },
    SignatureHelp(EventContext),
    Unknown(String),
}

impl CapabilityRequest {
    /// Message type used when answering this request
    pub fn response_type(&self) -> &str {
        match self {
            CapabilityRequest::QuickInfo(_) => "show-quick-info",
            CapabilityRequest::GotoDefinition(_) => "goto-definition",
            CapabilityRequest::FindAllReferences(_) => "find-all-references",
            CapabilityRequest::Completions(_) => "completion-provider",
            CapabilityRequest::CompletionItemSelected { .. } => "completion-provider-item-selected",
            CapabilityRequest::Format(_) => "format",
            CapabilityRequest::EvaluateBlock { .. } => "evaluate-block-result",
            CapabilityRequest::SignatureHelp(_) => "signature-help-response",
            CapabilityRequest::Unknown(name) => name,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    name: String,
    #[serde(default)]
    context: Value,
    #[serde(default)]
    item: Value,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
struct RawEvent {
    name: String,
    #[serde(default)]
    context: Value,
}

fn payload_as<T: DeserializeOwned>(tag: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| BridgeError::Decode(format!("{}: {}", tag, e)))
}

impl ChannelEnvelope {
    /// Decode a raw host message.
    ///
    /// Unrecognised tags yield [`BridgeError::UnknownEnvelope`]; recognised
    /// tags with a payload of the wrong shape yield [`BridgeError::Decode`].
    pub fn decode(raw: Value) -> Result<Self> {
        let Value::Object(mut fields) = raw else {
            return Err(BridgeError::Decode("envelope is not an object".into()));
        };
        let tag = match fields.remove("type") {
            Some(Value::String(tag)) => tag,
            _ => return Err(BridgeError::Decode("missing \"type\"".into())),
        };
        let payload = fields.remove("payload").unwrap_or(Value::Null);

        let envelope = match tag.as_str() {
            "buffer-update" => ChannelEnvelope::BufferUpdate(payload_as(&tag, payload)?),
            "buffer-update-incremental" => ChannelEnvelope::BufferUpdateIncremental(payload),
            "event" => ChannelEnvelope::Event(Self::decode_event(payload_as(&tag, payload)?)?),
            "command" => ChannelEnvelope::Command(payload_as(&tag, payload)?),
            "request" => ChannelEnvelope::Request(Self::decode_request(payload_as(&tag, payload)?)?),
            _ => return Err(BridgeError::UnknownEnvelope(tag)),
        };
        Ok(envelope)
    }

    fn decode_event(raw: RawEvent) -> Result<EditorEvent> {
        let event = match raw.name.as_str() {
            "CursorMoved" => EditorEvent::CursorMoved(payload_as(&raw.name, raw.context)?),
            "BufWritePost" => EditorEvent::BufWritePost(payload_as(&raw.name, raw.context)?),
            "BufEnter" => EditorEvent::BufEnter(payload_as(&raw.name, raw.context)?),
            _ => EditorEvent::Other(raw.name),
        };
        Ok(event)
    }

    fn decode_request(raw: RawRequest) -> Result<RequestEnvelope> {
        let original_context = raw.context.clone();
        let context = || payload_as::<EventContext>(&raw.name, raw.context.clone());

        let request = match raw.name.as_str() {
            "quick-info" => CapabilityRequest::QuickInfo(context()?),
            "goto-definition" => CapabilityRequest::GotoDefinition(context()?),
            "find-all-references" => CapabilityRequest::FindAllReferences(context()?),
            "completion-provider" => CapabilityRequest::Completions(context()?),
            "completion-provider-item-selected" => CapabilityRequest::CompletionItemSelected {
                context: context()?,
                item: raw.item.clone(),
            },
            "format" => CapabilityRequest::Format(context()?),
            "evaluate-block" => CapabilityRequest::EvaluateBlock {
                context: context()?,
                block: EvaluateBlock {
                    id: raw.id.clone(),
                    file_name: raw.file_name.clone(),
                    code: raw.code.clone(),
                },
            },
            "signature-help" => CapabilityRequest::SignatureHelp(context()?),
            _ => CapabilityRequest::Unknown(raw.name.clone()),
        };

        Ok(RequestEnvelope {
            original_context,
            request,
        })
    }
}
