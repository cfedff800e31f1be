//! Field-level merging
//!
//! Three layers:
//! - `apply_authoritative` takes every non-empty field of a trusted answer.
//! - `merge_candidate` applies one matched candidate onto a draft.
//! - `merge_ranked` folds one adapter's result into the stage draft under
//!   per-field source ranks, so a more authoritative source wins regardless
//!   of completion order.

use crate::types::{is_empty_value, Draft, Field};
use std::collections::HashMap;

/// Publication values that never replace a known venue
const SUPPRESSED_PUBLICATIONS: [&str; 2] = ["arXiv", "CoRR"];

/// True when writing `incoming`'s publication over `current` must be suppressed
fn suppressed(current: &Draft, incoming: &Draft, field: Field) -> bool {
    field == Field::Publication
        && SUPPRESSED_PUBLICATIONS.contains(&incoming.publication.trim())
        && !is_empty_value(&current.publication)
}

/// Apply every non-empty field of an authoritative answer, placeholders included
pub fn apply_authoritative(mut draft: Draft, answer: &Draft) -> Draft {
    for field in Field::ALL {
        if !answer.is_field_empty(field) {
            draft.copy_field(answer, field);
        }
    }
    draft
}

/// Apply every non-empty candidate field onto the draft
pub fn merge_candidate(mut draft: Draft, candidate: &Draft) -> Draft {
    for field in Field::ALL {
        if candidate.is_field_empty(field) || suppressed(&draft, candidate, field) {
            continue;
        }
        draft.copy_field(candidate, field);
    }
    draft
}

/// Lowest rank that has set each field so far
///
/// Unset fields behave as rank infinity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePriorityLevel {
    levels: HashMap<Field, i32>,
}

impl MergePriorityLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rank that last set `field`, `None` when never set
    pub fn get(&self, field: Field) -> Option<i32> {
        self.levels.get(&field).copied()
    }

    /// True when a source of `rank` outranks whatever set `field`
    pub fn admits(&self, field: Field, rank: i32) -> bool {
        self.get(field).map_or(true, |level| rank < level)
    }

    fn lower(&mut self, field: Field, rank: i32) {
        self.levels.insert(field, rank);
    }
}

/// Fold one adapter's result into the running draft
///
/// A field is taken from `scraped` when it is non-empty, differs from the
/// stage-entry snapshot `origin`, `rank` beats the recorded level, and the
/// publication suppression rule does not fire. Returns the fields taken.
pub fn merge_ranked(
    origin: &Draft,
    draft: &mut Draft,
    scraped: &Draft,
    levels: &mut MergePriorityLevel,
    rank: i32,
) -> Vec<Field> {
    let mut taken = Vec::new();
    for field in Field::ALL {
        if scraped.is_field_empty(field)
            || scraped.field_eq(origin, field)
            || !levels.admits(field, rank)
            || suppressed(draft, scraped, field)
        {
            continue;
        }
        draft.copy_field(scraped, field);
        levels.lower(field, rank);
        taken.push(field);
    }
    taken
}
