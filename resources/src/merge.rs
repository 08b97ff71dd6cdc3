//! Applying acknowledged mutations to the local page.
//!
//! These run only after the server confirmed the change; the page is
//! patched instead of refetched. Identity is [`RecordId`] equality, so `7`
//! and `"7"` match.

use crate::id::RecordId;
use crate::types::{Patch, Record};

/// Copy of `items` with the first record matching `id` patched
///
/// Length and order are unchanged. Without a match the copy equals `items`.
#[must_use]
pub fn merge(items: &[Record], id: &RecordId, patch: &Patch) -> Vec<Record> {
    let mut merged = items.to_vec();
    merge_in_place(&mut merged, id, patch);
    merged
}

/// Copy of `items` without the first record matching `id`
#[must_use]
pub fn remove(items: &[Record], id: &RecordId) -> Vec<Record> {
    let mut remaining = items.to_vec();
    remove_in_place(&mut remaining, id);
    remaining
}

/// Patch the first record matching `id`; returns whether one matched
pub fn merge_in_place(items: &mut [Record], id: &RecordId, patch: &Patch) -> bool {
    match items.iter_mut().find(|record| record.has_id(id)) {
        Some(record) => {
            record.apply(patch);
            true
        },
        None => false,
    }
}

/// Drop the first record matching `id`; returns whether one matched
pub fn remove_in_place(items: &mut Vec<Record>, id: &RecordId) -> bool {
    match items.iter().position(|record| record.has_id(id)) {
        Some(index) => {
            items.remove(index);
            true
        },
        None => false,
    }
}
