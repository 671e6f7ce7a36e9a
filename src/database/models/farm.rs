use bson::{oid::ObjectId, Bson, Document};
use serde::Serialize;

use super::get_string;
use crate::database::reference::resolve_field;

/// Source tag of the external registry whose codes are reported as SIT codes.
pub const SIT_CODE_SOURCE: &str = "SIT_CODE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtId {
    pub source: Option<String>,
    pub ext_code: Option<String>,
}

impl ExtId {
    fn from_bson(value: &Bson) -> Option<Self> {
        let doc = value.as_document()?;
        Some(Self {
            source: get_string(doc, "source").or_else(|| get_string(doc, "label")),
            ext_code: get_string(doc, "ext_code"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Farm {
    pub id: ObjectId,
    pub adm3_id: Option<ObjectId>,
    pub ext_ids: Vec<ExtId>,
    pub farm_source: Option<String>,
}

impl Farm {
    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            adm3_id: resolve_field(doc, "adm3_id"),
            ext_ids: ext_ids(doc),
            farm_source: get_string(doc, "farm_source"),
        })
    }

    pub fn sit_codes(&self) -> impl Iterator<Item = &str> {
        self.ext_ids
            .iter()
            .filter(|e| e.source.as_deref() == Some(SIT_CODE_SOURCE))
            .filter_map(|e| e.ext_code.as_deref())
            .filter(|code| !code.is_empty())
    }
}

pub fn ext_ids(doc: &Document) -> Vec<ExtId> {
    match doc.get("ext_id") {
        Some(Bson::Array(items)) => items.iter().filter_map(ExtId::from_bson).collect(),
        Some(single @ Bson::Document(_)) => ExtId::from_bson(single).into_iter().collect(),
        _ => Vec::new(),
    }
}
