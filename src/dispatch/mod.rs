//! Delivery to publishing targets.
//!
//! This module provides:
//! - `Dispatcher`: the capability trait every publishing target implements
//! - `DispatchOutcome`: the two-case result the retry policy consumes
//! - `DispatchRegistry`: the static name-to-dispatcher mapping built at startup
//! - `AssetReleaser`: the hook invoked once a content item's jobs all finish
//!
//! Dispatcher errors and panics are normalized into
//! `DispatchOutcome::Failure` by [`dispatch_guarded`] so the retry policy
//! only ever sees two cases.

pub mod log;
pub mod registry;
pub mod release;
pub mod webhook;

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;

use crate::content::ContentItem;
use crate::error::DispatchError;

pub use self::log::LogDispatcher;
pub use registry::DispatchRegistry;
pub use release::{AssetReleaser, LocalFileReleaser, NoopReleaser};
pub use webhook::WebhookDispatcher;

/// A publishing target capable of delivering content.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Short name of the dispatcher kind, used in logs.
    fn kind(&self) -> &str;

    /// Delivers `content` to `target`.
    ///
    /// Returns the target's reference to the published item, if it gives one.
    async fn dispatch(
        &self,
        target: &str,
        content: &ContentItem,
    ) -> Result<Option<String>, DispatchError>;
}

/// Normalized result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success { result_reference: Option<String> },
    Failure { message: String },
}

impl DispatchOutcome {
    /// Success without a reference.
    pub fn success() -> Self {
        Self::Success {
            result_reference: None,
        }
    }

    /// Success carrying the target's reference.
    pub fn success_with(reference: impl Into<String>) -> Self {
        Self::Success {
            result_reference: Some(reference.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Error message of a failure.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failure { message } => Some(message),
            Self::Success { .. } => None,
        }
    }

    /// Reference returned on success.
    pub fn result_reference(&self) -> Option<&str> {
        match self {
            Self::Success { result_reference } => result_reference.as_deref(),
            Self::Failure { .. } => None,
        }
    }
}

impl From<Result<Option<String>, DispatchError>> for DispatchOutcome {
    fn from(result: Result<Option<String>, DispatchError>) -> Self {
        match result {
            Ok(result_reference) => Self::Success { result_reference },
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Runs a dispatcher, turning errors and panics into a failure outcome.
pub async fn dispatch_guarded(
    dispatcher: &dyn Dispatcher,
    target: &str,
    content: &ContentItem,
) -> DispatchOutcome {
    match AssertUnwindSafe(dispatcher.dispatch(target, content))
        .catch_unwind()
        .await
    {
        Ok(result) => DispatchOutcome::from(result),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());

            tracing::error!(
                target_name = %target,
                kind = dispatcher.kind(),
                panic = %message,
                "Dispatcher panicked"
            );
            DispatchOutcome::failure(format!("dispatcher panicked: {}", message))
        }
    }
}
