//! Target eligibility by media kind.

use std::collections::HashSet;

use super::item::{ContentItem, MediaKind};

/// Decides which targets may receive a content item.
///
/// The returned order is the order jobs are staggered in.
pub trait Eligibility: Send + Sync {
    fn eligible_targets(&self, item: &ContentItem) -> Vec<String>;
}

/// Routes content to targets according to the media kinds each accepts.
#[derive(Debug, Clone, Default)]
pub struct MediaKindEligibility {
    /// Targets in configuration order with their accepted kinds.
    /// An empty set accepts every kind.
    routes: Vec<(String, HashSet<MediaKind>)>,
}

impl MediaKindEligibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target accepting the given kinds.
    pub fn with_target(
        mut self,
        name: impl Into<String>,
        kinds: impl IntoIterator<Item = MediaKind>,
    ) -> Self {
        self.routes.push((name.into(), kinds.into_iter().collect()));
        self
    }

    /// Number of configured targets.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Eligibility for MediaKindEligibility {
    fn eligible_targets(&self, item: &ContentItem) -> Vec<String> {
        let targets: Vec<String> = self
            .routes
            .iter()
            .filter(|(_, kinds)| kinds.is_empty() || kinds.contains(&item.kind))
            .map(|(name, _)| name.clone())
            .collect();

        tracing::debug!(
            kind = %item.kind,
            count = targets.len(),
            targets = ?targets,
            "Resolved eligible targets"
        );

        targets
    }
}
