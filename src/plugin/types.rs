//! Editor-facing data shapes
//!
//! Positions here are 1-based, as the editor reports them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lsp::types::{CompletionItem, CompletionItemKind, LocationDisplay, TextEdit};

/// Where the editor was when it raised an event or request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub buffer_full_path: String,
    /// 1-based
    #[serde(default)]
    pub line: u32,
    /// 1-based
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub filetype: String,
    #[serde(default)]
    pub version: i64,
}

/// Payload of a `buffer-update` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferUpdate {
    pub event_context: EventContext,
    #[serde(default)]
    pub buffer_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickInfo {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionPosition {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
}

pub type References = Vec<LocationDisplay>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntry {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CompletionItemKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
    /// Round-tripped to the server when the entry is selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completions {
    pub is_incomplete: bool,
    pub items: Vec<CompletionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDetails {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CompletionItemKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl From<CompletionItem> for CompletionEntry {
    fn from(item: CompletionItem) -> Self {
        Self {
            documentation: item.documentation.as_ref().map(|d| d.to_text().to_string()),
            label: item.label,
            kind: item.kind,
            detail: item.detail,
            insert_text: item.insert_text,
            data: item.data,
        }
    }
}

impl From<CompletionItem> for CompletionDetails {
    fn from(item: CompletionItem) -> Self {
        Self {
            documentation: item.documentation.as_ref().map(|d| d.to_text().to_string()),
            label: item.label,
            kind: item.kind,
            detail: item.detail,
        }
    }
}

/// 1-based position in an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorPosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingEdit {
    pub start: EditorPosition,
    pub end: EditorPosition,
    pub new_value: String,
}

impl From<TextEdit> for FormattingEdit {
    fn from(edit: TextEdit) -> Self {
        let (start_line, start_col) = edit.range.start.to_one_indexed();
        let (end_line, end_col) = edit.range.end.to_one_indexed();
        Self {
            start: EditorPosition {
                line: start_line,
                column: start_col,
            },
            end: EditorPosition {
                line: end_line,
                column: end_col,
            },
            new_value: edit.new_text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingEdits {
    pub file_path: String,
    pub version: i64,
    pub edits: Vec<FormattingEdit>,
}

/// Arguments of an `evaluate-block` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateBlock {
    pub id: Value,
    pub file_name: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::types::{Position, Range};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_event_context_from_editor_json() {
        let ctx: EventContext = serde_json::from_value(json!({
            "bufferFullPath": "/f.ts",
            "line": 5,
            "column": 10,
            "filetype": "typescript",
            "version": 7,
            "bufferNumber": 3
        }))
        .unwrap();

        assert_eq!(ctx.buffer_full_path, "/f.ts");
        assert_eq!((ctx.line, ctx.column, ctx.version), (5, 10, 7));
    }

    #[test]
    fn test_completion_item_documentation_flattened() {
        let item: CompletionItem = serde_json::from_value(json!({
            "label": "push",
            "kind": 2,
            "documentation": {"kind": "markdown", "value": "Appends an element"}
        }))
        .unwrap();

        let details = CompletionDetails::from(item);
        assert_eq!(details.documentation.as_deref(), Some("Appends an element"));
        assert_eq!(details.kind, Some(CompletionItemKind::Method));
    }

    #[test]
    fn test_text_edit_becomes_one_based() {
        let edit = TextEdit {
            range: Range::new(Position::new(0, 0), Position::new(1, 4)),
            new_text: "  ".into(),
        };
        assert_eq!(
            serde_json::to_value(FormattingEdit::from(edit)).unwrap(),
            json!({
                "start": {"line": 1, "column": 1},
                "end": {"line": 2, "column": 5},
                "newValue": "  "
            })
        );
    }
}
