//! Pluggable language capabilities

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::types::{
    CompletionDetails, Completions, DefinitionPosition, EvaluateBlock, EventContext, FormattingEdits,
    QuickInfo, References,
};
use crate::error::Result;

/// The eight editor features a provider answers.
///
/// Implementations must start their work (or queue it) before returning
/// the future, so that calls made in order are served in order.
pub trait LanguageService: Send + Sync {
    fn get_quick_info(&self, context: &EventContext) -> BoxFuture<'static, Result<QuickInfo>>;

    fn get_definition(&self, context: &EventContext)
        -> BoxFuture<'static, Result<DefinitionPosition>>;

    fn find_all_references(&self, context: &EventContext) -> BoxFuture<'static, Result<References>>;

    fn get_completions(&self, context: &EventContext) -> BoxFuture<'static, Result<Completions>>;

    fn get_completion_details(
        &self,
        context: &EventContext,
        item: &Value,
    ) -> BoxFuture<'static, Result<CompletionDetails>>;

    fn get_formatting_edits(&self, context: &EventContext)
        -> BoxFuture<'static, Result<FormattingEdits>>;

    fn evaluate_block(
        &self,
        context: &EventContext,
        block: &EvaluateBlock,
    ) -> BoxFuture<'static, Result<Value>>;

    fn get_signature_help(&self, context: &EventContext) -> BoxFuture<'static, Result<Value>>;
}

/// Who answers feature requests right now
#[derive(Clone, Default)]
pub enum CapabilityProvider {
    #[default]
    NoProvider,
    Provider(Arc<dyn LanguageService>),
}

impl CapabilityProvider {
    pub fn service(&self) -> Option<Arc<dyn LanguageService>> {
        match self {
            CapabilityProvider::NoProvider => None,
            CapabilityProvider::Provider(service) => Some(service.clone()),
        }
    }
}

impl std::fmt::Debug for CapabilityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityProvider::NoProvider => write!(f, "NoProvider"),
            CapabilityProvider::Provider(_) => write!(f, "Provider(..)"),
        }
    }
}
