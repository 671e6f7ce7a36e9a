//! Normalisation of the reference encodings found in stored documents.
//!
//! A link to another document may be stored as a raw `ObjectId`, a DBRef
//! (`{"$ref": .., "$id": ..}`), an extended-JSON wrapper (`{"$oid": ..}`), an
//! embedded document carrying `_id` or `id`, or a plain 24-hex string. Every
//! consumer goes through [`resolve_id`] instead of sniffing types itself.

use bson::{doc, oid::ObjectId, Bson, Document};
use std::collections::HashSet;
use thiserror::Error;

/// Nesting guard for embedded-id documents.
const MAX_DEPTH: usize = 4;

/// Resolve any supported reference encoding to an `ObjectId`.
///
/// Returns `None` for anything that is not a valid identifier; callers treat
/// that as "unlinked", never as an error.
pub fn resolve_id(value: &Bson) -> Option<ObjectId> {
    resolve_at_depth(value, 0)
}

fn resolve_at_depth(value: &Bson, depth: usize) -> Option<ObjectId> {
    match value {
        Bson::ObjectId(oid) => Some(*oid),
        Bson::String(s) => parse_object_id(s),
        Bson::DbPointer(_) => None,
        Bson::Document(doc) if depth < MAX_DEPTH => ["$id", "$oid", "_id", "id"]
            .iter()
            .find_map(|key| doc.get(*key))
            .and_then(|inner| resolve_at_depth(inner, depth + 1)),
        _ => None,
    }
}

/// Resolve the reference stored under `field`.
pub fn resolve_field(doc: &Document, field: &str) -> Option<ObjectId> {
    doc.get(field).and_then(resolve_id)
}

/// Resolve a list-of-references field, skipping entries that do not resolve.
pub fn resolve_list(doc: &Document, field: &str) -> Vec<ObjectId> {
    match doc.get(field) {
        Some(Bson::Array(items)) => items.iter().filter_map(resolve_id).collect(),
        Some(single) => resolve_id(single).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Strict parse of a 24-character hex identifier.
pub fn parse_object_id(raw: &str) -> Option<ObjectId> {
    let trimmed = raw.trim();
    if trimmed.len() != 24 {
        return None;
    }
    ObjectId::parse_str(trimmed).ok()
}

/// Filter matching documents whose `field` references any of `ids`, whether
/// stored as a raw id or as a DBRef.
pub fn ref_in(field: &str, ids: &[ObjectId]) -> Document {
    let ids: Vec<Bson> = ids.iter().map(|id| Bson::ObjectId(*id)).collect();
    doc! {
        "$or": [
            { field: { "$in": ids.clone() } },
            { format!("{field}.$id"): { "$in": ids } },
        ]
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("'{label}' is required and must not be empty")]
    Empty { label: String },

    #[error("Invalid ObjectId in '{label}': {value}")]
    Malformed { label: String, value: String },

    #[error("'{label}' accepts at most {max} ids, got {count}")]
    TooMany { label: String, max: usize, count: usize },
}

/// Validate a client-supplied id list: every value must parse, duplicates are
/// dropped keeping the first occurrence, and the distinct count is capped.
pub fn validate_ids<S: AsRef<str>>(
    raw: &[S],
    label: &str,
    max: usize,
    allow_empty: bool,
) -> Result<Vec<ObjectId>, IdError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(raw.len());
    for value in raw {
        let value = value.as_ref();
        let oid = parse_object_id(value).ok_or_else(|| IdError::Malformed {
            label: label.to_string(),
            value: value.to_string(),
        })?;
        if seen.insert(oid) {
            ids.push(oid);
        }
    }

    if ids.is_empty() && !allow_empty {
        return Err(IdError::Empty { label: label.to_string() });
    }
    if ids.len() > max {
        return Err(IdError::TooMany {
            label: label.to_string(),
            max,
            count: ids.len(),
        });
    }
    Ok(ids)
}

/// Split a comma separated query parameter into trimmed, non-empty parts.
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
