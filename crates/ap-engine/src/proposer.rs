//! The reasoning provider contract.

use ap_action::ProposedAction;
use async_trait::async_trait;

use crate::context::ProposerContext;
use crate::error::ProviderError;

/// Turns a context snapshot into candidate actions.
///
/// Every context value is opaque data to forward to the reasoning call.
/// Implementations must not panic on failure; return a [`ProviderError`]
/// and the controller rests and tries again later.
#[async_trait]
pub trait ActionProposer: Send + Sync {
    /// Up to `desired_count` candidate actions, each with type, priority
    /// and rationale.
    async fn generate_actions(
        &self,
        context: &ProposerContext,
        desired_count: usize,
    ) -> Result<Vec<ProposedAction>, ProviderError>;

    /// A single narrative observation about the current context.
    async fn observe(&self, context: &ProposerContext) -> Result<String, ProviderError>;
}
