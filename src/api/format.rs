use bson::{oid::ObjectId, Bson, Document};
use serde::Serializer;
use serde_json::{Map, Number, Value};

use crate::database::models::deforestation::format_timestamp;

/// Serialize an ObjectId as its plain 24-hex string instead of `{"$oid": ..}`.
pub fn serialize_oid<S: Serializer>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_hex())
}

pub fn serialize_oid_opt<S: Serializer>(id: &Option<ObjectId>, serializer: S) -> Result<S::Ok, S::Error> {
    match id {
        Some(id) => serializer.serialize_str(&id.to_hex()),
        None => serializer.serialize_none(),
    }
}

/// Convert a stored value into the public wire format.
///
/// ObjectIds become hex strings, reference wrappers (`{"$ref", "$id"}`)
/// collapse to the id they point at and datetimes render as naive ISO-8601.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(v) => Value::from(*v),
        Bson::Int64(v) => Value::from(*v),
        Bson::Double(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(dt) => Value::String(format_timestamp(&dt.to_chrono().naive_utc())),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => match reference_target(doc) {
            Some(id) => Value::String(id),
            None => Value::Object(map_of(doc)),
        },
        other => other.clone().into_relaxed_extjson(),
    }
}

/// Like [`bson_to_json`] for a whole record, renaming `_id` to `id`.
pub fn document_to_json(doc: &Document) -> Value {
    let mut out = Map::with_capacity(doc.len());
    for (key, value) in doc {
        let key = if key == "_id" { "id" } else { key.as_str() };
        out.insert(key.to_string(), bson_to_json(value));
    }
    Value::Object(out)
}

fn map_of(doc: &Document) -> Map<String, Value> {
    doc.iter()
        .map(|(k, v)| (k.clone(), bson_to_json(v)))
        .collect()
}

fn reference_target(doc: &Document) -> Option<String> {
    if !doc.contains_key("$ref") {
        return None;
    }
    match doc.get("$id")? {
        Bson::ObjectId(id) => Some(id.to_hex()),
        Bson::String(s) => Some(s.clone()),
        _ => None,
    }
}
