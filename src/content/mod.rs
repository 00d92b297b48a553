//! Content items and target eligibility.
//!
//! A `ContentItem` is the immutable payload fanned out to publishing
//! targets. Its JSON form is what the job store keeps as the content
//! snapshot. `Eligibility` decides which targets may receive an item.

pub mod eligibility;
pub mod item;

pub use eligibility::{Eligibility, MediaKindEligibility};
pub use item::{ContentItem, MediaKind};
