use bson::{oid::ObjectId, Bson, Document};
use serde::Serialize;

use super::{get_flag, get_string};
use crate::database::reference::{resolve_field, resolve_list};

/// Local account linked to an identity-provider subject through `ext_id`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: ObjectId,
    pub ext_id: Option<String>,
    pub admin: bool,
    pub roles: Vec<ObjectId>,
}

impl User {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            ext_id: get_string(doc, "ext_id"),
            admin: get_flag(doc, "admin"),
            roles: resolve_list(doc, "role"),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    #[serde(serialize_with = "crate::api::format::serialize_oid")]
    pub id: ObjectId,
    pub name: Option<String>,
    pub actions: Vec<String>,
    pub options: Vec<String>,
}

impl Role {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            name: get_string(doc, "name"),
            actions: string_list(doc, "actions"),
            options: string_list(doc, "options"),
        })
    }
}

fn string_list(doc: &Document, key: &str) -> Vec<String> {
    match doc.get(key) {
        Some(Bson::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
