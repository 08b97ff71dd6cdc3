//! Normalization of pagination metadata into a [`PaginationCursor`].
//!
//! The cursor always reports the offset that was requested. When the
//! response carries a total, `has_more` is recomputed from it and any
//! server-sent flag is ignored; a flag is only trusted when there is no
//! total to check it against.

use crate::envelope::{ListEnvelope, PageMeta};
use crate::types::PaginationCursor;
use serde_json::Value;

/// Normalize a raw list response for the requested window
///
/// `resource` is the plural key some endpoints wrap their items in.
#[must_use]
pub fn normalize(raw: Option<&Value>, resource: &str, limit: u64, offset: u64) -> PaginationCursor {
    normalize_envelope(&ListEnvelope::decode(raw, resource), limit, offset)
}

/// Normalize an already decoded envelope
#[must_use]
pub fn normalize_envelope(envelope: &ListEnvelope, limit: u64, offset: u64) -> PaginationCursor {
    let item_count = envelope.items().len() as u64;
    let Some(meta) = envelope.meta() else {
        return PaginationCursor::asserted(item_count, limit, offset, false);
    };

    if meta.offset.is_some_and(|echoed| echoed != offset) {
        tracing::debug!(
            requested = offset,
            echoed = meta.offset,
            "Server echoed a different offset; keeping the requested one"
        );
    }

    from_meta(meta, item_count, limit, offset)
}

fn from_meta(meta: &PageMeta, item_count: u64, requested_limit: u64, offset: u64) -> PaginationCursor {
    // Servers clamp page sizes; their limit is what the next page will use
    let limit = meta.limit.filter(|l| *l > 0).unwrap_or(requested_limit).max(1);

    if let Some(total) = meta.total {
        return PaginationCursor::new(total, limit, offset);
    }

    if let (Some(page), Some(last_page)) = (meta.page, meta.last_page) {
        let total = if page < last_page {
            last_page.saturating_mul(limit)
        } else {
            offset.saturating_add(item_count)
        };
        return PaginationCursor::new(total, limit, offset);
    }

    let seen = offset.saturating_add(item_count);
    PaginationCursor::asserted(seen, limit, offset, meta.has_more.unwrap_or(false))
}
