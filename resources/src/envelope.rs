//! Decoding of list and record response bodies.
//!
//! The admin API wraps lists in several shapes. [`ListEnvelope::decode`]
//! tries them in a fixed order and always returns a variant, so callers
//! never look fields up themselves:
//!
//! 1. a bare array
//! 2. `{"data": [...]}`, or `{"data": {...}}` holding one of these shapes
//! 3. `{"<resource>": [...]}`
//! 4. `{"results": [...]}`
//!
//! Pagination metadata is read from `pagination`, then `meta`, then from
//! count fields (`total`, `totalCount`, ...) sitting next to the items.

use crate::id::RecordId;
use crate::types::Record;
use serde_json::{Map, Value};

/// Field of a wrapper object that held the items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemsField {
    /// `data`
    Data,
    /// The resource's own plural name, e.g. `withdrawals`
    Resource(String),
    /// `results`
    Results,
}

/// Pagination metadata as found on the wire, before normalization
///
/// Every field is optional; numbers may arrive as JSON strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    /// `total`, `totalCount`, `total_count`, `totalItems`, `count`
    pub total: Option<u64>,
    /// `limit`, `per_page`, `perPage`, `pageSize`, `page_size`
    pub limit: Option<u64>,
    /// `offset`, `skip`
    pub offset: Option<u64>,
    /// `page`, `current_page`, `currentPage`
    pub page: Option<u64>,
    /// `last_page`, `lastPage`, `totalPages`, `total_pages`
    pub last_page: Option<u64>,
    /// `hasMore`, `has_more`
    pub has_more: Option<bool>,
}

const TOTAL_KEYS: &[&str] = &["total", "totalCount", "total_count", "totalItems", "total_items", "count"];
const LIMIT_KEYS: &[&str] = &["limit", "per_page", "perPage", "pageSize", "page_size"];
const OFFSET_KEYS: &[&str] = &["offset", "skip"];
const PAGE_KEYS: &[&str] = &["page", "current_page", "currentPage"];
const LAST_PAGE_KEYS: &[&str] = &["last_page", "lastPage", "totalPages", "total_pages"];
const HAS_MORE_KEYS: &[&str] = &["hasMore", "has_more"];

impl PageMeta {
    /// Read metadata fields from an object, ignoring anything unrecognized
    #[must_use]
    pub fn from_object(map: &Map<String, Value>) -> Self {
        Self {
            total: first(map, TOTAL_KEYS, lenient_u64),
            limit: first(map, LIMIT_KEYS, lenient_u64),
            offset: first(map, OFFSET_KEYS, lenient_u64),
            page: first(map, PAGE_KEYS, lenient_u64),
            last_page: first(map, LAST_PAGE_KEYS, lenient_u64),
            has_more: first(map, HAS_MORE_KEYS, lenient_bool),
        }
    }

    /// Whether no recognized field was present
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total.is_none()
            && self.limit.is_none()
            && self.offset.is_none()
            && self.page.is_none()
            && self.last_page.is_none()
            && self.has_more.is_none()
    }

    /// Look for metadata in a wrapper object
    fn find(map: &Map<String, Value>) -> Option<Self> {
        for key in ["pagination", "meta"] {
            if let Some(Value::Object(inner)) = map.get(key) {
                let meta = Self::from_object(inner);
                if !meta.is_empty() {
                    return Some(meta);
                }
            }
        }

        // Count fields next to the items; `page`/`limit` alone are usually echoes
        let meta = Self::from_object(map);
        (meta.total.is_some() || meta.has_more.is_some() || meta.last_page.is_some())
            .then_some(meta)
    }
}

fn first<T>(map: &Map<String, Value>, keys: &[&str], read: fn(&Value) -> Option<T>) -> Option<T> {
    keys.iter().find_map(|key| map.get(*key).and_then(read))
}

/// Read a non-negative integer from a number or numeric string
#[must_use]
pub fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let whole = f as u64;
                    whole
                })
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a boolean from `true`/`false`, `"true"`/`"false"` or `1`/`0`
#[must_use]
pub fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_u64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// A list response, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum ListEnvelope {
    /// A bare JSON array
    Bare(Vec<Value>),
    /// An object with the items under `field` and no metadata
    Wrapped {
        /// Where the items were found
        field: ItemsField,
        /// The items
        items: Vec<Value>,
    },
    /// An object with the items under `field` and pagination metadata
    PaginatedWrapped {
        /// Where the items were found
        field: ItemsField,
        /// The items
        items: Vec<Value>,
        /// Raw metadata
        meta: PageMeta,
    },
    /// No body, or a body in none of the known shapes
    Unrecognized,
}

impl ListEnvelope {
    /// Classify a response body
    ///
    /// `resource` is the plural key some endpoints use, e.g. `withdrawals`.
    #[must_use]
    pub fn decode(body: Option<&Value>, resource: &str) -> Self {
        match body {
            Some(Value::Array(items)) => Self::Bare(items.clone()),
            Some(Value::Object(map)) => Self::decode_object(map, resource),
            _ => Self::Unrecognized,
        }
    }

    fn decode_object(map: &Map<String, Value>, resource: &str) -> Self {
        let candidates = [
            ("data", ItemsField::Data),
            (resource, ItemsField::Resource(resource.to_string())),
            ("results", ItemsField::Results),
        ];

        for (key, field) in candidates {
            match map.get(key) {
                Some(Value::Array(items)) => {
                    return match PageMeta::find(map) {
                        Some(meta) => Self::PaginatedWrapped {
                            field,
                            items: items.clone(),
                            meta,
                        },
                        None => Self::Wrapped {
                            field,
                            items: items.clone(),
                        },
                    };
                },
                Some(Value::Object(inner)) if key == "data" => {
                    let nested = Self::decode_object(inner, resource);
                    if nested != Self::Unrecognized {
                        return nested.with_outer_meta(map);
                    }
                },
                _ => {},
            }
        }

        Self::Unrecognized
    }

    /// Attach metadata found on an outer wrapper when the inner one had none
    fn with_outer_meta(self, outer: &Map<String, Value>) -> Self {
        match self {
            Self::Wrapped { field, items } => match PageMeta::find(outer) {
                Some(meta) => Self::PaginatedWrapped { field, items, meta },
                None => Self::Wrapped { field, items },
            },
            other => other,
        }
    }

    /// The raw items, empty when unrecognized
    #[must_use]
    pub fn items(&self) -> &[Value] {
        match self {
            Self::Bare(items)
            | Self::Wrapped { items, .. }
            | Self::PaginatedWrapped { items, .. } => items,
            Self::Unrecognized => &[],
        }
    }

    /// Pagination metadata, if the response carried any
    #[must_use]
    pub const fn meta(&self) -> Option<&PageMeta> {
        match self {
            Self::PaginatedWrapped { meta, .. } => Some(meta),
            _ => None,
        }
    }

    /// Items as records; entries that are not JSON objects are dropped
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        let items = match self {
            Self::Bare(items)
            | Self::Wrapped { items, .. }
            | Self::PaginatedWrapped { items, .. } => items,
            Self::Unrecognized => return Vec::new(),
        };

        let total = items.len();
        let records: Vec<Record> = items.into_iter().filter_map(Record::from_value).collect();
        if records.len() != total {
            tracing::warn!(
                dropped = total - records.len(),
                "List response contained non-object items"
            );
        }
        records
    }
}

/// Decode the record returned by a mutation endpoint
///
/// The updated record is either under `data` or the body itself, and only
/// counts when it carries the id of the record that was patched. Anything
/// else (empty bodies, `{"success": true}`-style acks, `data` holding a
/// message) yields `None`.
#[must_use]
pub fn decode_record(body: Option<&Value>, id: &RecordId) -> Option<Record> {
    let Value::Object(map) = body? else {
        return None;
    };

    let record = match map.get("data") {
        Some(Value::Object(data)) => Record::new(data.clone()),
        _ => Record::new(map.clone()),
    };
    if record.has_id(id) {
        Some(record)
    } else {
        tracing::debug!(%id, "Mutation response carries no matching record");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array() {
        let body = json!([{"id": 1}, {"id": 2}]);
        let envelope = ListEnvelope::decode(Some(&body), "users");
        assert!(matches!(envelope, ListEnvelope::Bare(ref items) if items.len() == 2));
        assert!(envelope.meta().is_none());
    }

    #[test]
    fn data_with_pagination() {
        let body = json!({
            "data": [{"id": 1}, {"id": 2}, {"id": 3}],
            "pagination": {"total": 3, "limit": 10, "offset": 0}
        });
        let envelope = ListEnvelope::decode(Some(&body), "withdrawals");
        assert_eq!(envelope.items().len(), 3);
        assert_eq!(
            envelope.meta(),
            Some(&PageMeta {
                total: Some(3),
                limit: Some(10),
                offset: Some(0),
                ..PageMeta::default()
            })
        );
    }

    #[test]
    fn resource_key_and_results() {
        let body = json!({"withdrawals": [{"id": 9}]});
        assert_eq!(
            ListEnvelope::decode(Some(&body), "withdrawals"),
            ListEnvelope::Wrapped {
                field: ItemsField::Resource("withdrawals".to_string()),
                items: vec![json!({"id": 9})],
            }
        );

        let body = json!({"results": [], "count": 0});
        let envelope = ListEnvelope::decode(Some(&body), "beats");
        assert!(matches!(
            envelope,
            ListEnvelope::PaginatedWrapped { field: ItemsField::Results, .. }
        ));
    }

    #[test]
    fn data_wins_over_other_keys() {
        let body = json!({"data": [{"id": 1}], "results": [{"id": 2}, {"id": 3}]});
        let envelope = ListEnvelope::decode(Some(&body), "beats");
        assert_eq!(envelope.items(), &[json!({"id": 1})]);
    }

    #[test]
    fn nested_data_object() {
        let body = json!({
            "success": true,
            "data": {
                "purchases": [{"id": "a"}, {"id": "b"}],
                "pagination": {"current_page": "2", "per_page": "2", "last_page": 5, "total": "10"}
            }
        });
        let envelope = ListEnvelope::decode(Some(&body), "purchases");
        assert_eq!(envelope.items().len(), 2);
        let meta = envelope.meta().copied().unwrap_or_default();
        assert_eq!(meta.total, Some(10));
        assert_eq!(meta.page, Some(2));
        assert_eq!(meta.limit, Some(2));
        assert_eq!(meta.last_page, Some(5));
    }

    #[test]
    fn nested_data_takes_outer_meta() {
        let body = json!({
            "data": {"users": [{"id": 1}]},
            "meta": {"has_more": "true"}
        });
        let envelope = ListEnvelope::decode(Some(&body), "users");
        assert_eq!(envelope.meta().and_then(|m| m.has_more), Some(true));
    }

    #[test]
    fn top_level_total_is_metadata() {
        let body = json!({"data": [{"id": 1}], "total": 41});
        let envelope = ListEnvelope::decode(Some(&body), "deposits");
        assert_eq!(envelope.meta().and_then(|m| m.total), Some(41));
    }

    #[test]
    fn unknown_shapes_are_empty() {
        for body in [json!({"message": "ok"}), json!("text"), json!(null), json!({"data": 5})] {
            let envelope = ListEnvelope::decode(Some(&body), "users");
            assert_eq!(envelope, ListEnvelope::Unrecognized);
            assert!(envelope.items().is_empty());
        }
        assert_eq!(ListEnvelope::decode(None, "users"), ListEnvelope::Unrecognized);
    }

    #[test]
    fn into_records_drops_non_objects() {
        let body = json!([{"id": 1}, 7, "x", {"id": 2}]);
        let records = ListEnvelope::decode(Some(&body), "users").into_records();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(lenient_u64(&json!(5)), Some(5));
        assert_eq!(lenient_u64(&json!("12")), Some(12));
        assert_eq!(lenient_u64(&json!(3.0)), Some(3));
        assert_eq!(lenient_u64(&json!(-1)), None);
        assert_eq!(lenient_u64(&json!("many")), None);
        assert_eq!(lenient_bool(&json!("false")), Some(false));
        assert_eq!(lenient_bool(&json!(1)), Some(true));
        assert_eq!(lenient_bool(&json!("maybe")), None);
    }

    #[test]
    fn mutation_bodies() {
        let id = RecordId::from(7);
        let wrapped = json!({"success": true, "data": {"id": 7, "status": "approved"}});
        assert_eq!(
            decode_record(Some(&wrapped), &id).map(Record::into_value),
            Some(json!({"id": 7, "status": "approved"}))
        );

        let bare = json!({"id": "7", "status": "approved"});
        assert_eq!(
            decode_record(Some(&bare), &id).map(Record::into_value),
            Some(bare.clone())
        );

        assert_eq!(decode_record(Some(&json!({"success": true})), &id), None);
        assert_eq!(decode_record(None, &id), None);
    }

    #[test]
    fn acks_without_the_record_are_not_records() {
        let id = RecordId::from(7);
        let message = json!({"success": true, "data": {"message": "Status updated"}});
        assert_eq!(decode_record(Some(&message), &id), None);

        let other = json!({"data": {"id": 8, "status": "approved"}});
        assert_eq!(decode_record(Some(&other), &id), None);
    }
}
