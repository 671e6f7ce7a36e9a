use bson::{oid::ObjectId, Document};

use super::get_string;
use crate::database::reference::resolve_field;

#[derive(Debug, Clone)]
pub struct Adm3 {
    pub id: ObjectId,
    pub adm2_id: Option<ObjectId>,
    pub name: Option<String>,
    pub label: Option<String>,
}

impl Adm3 {
    pub const FIELDS: [&'static str; 3] = ["adm2_id", "name", "label"];

    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            adm2_id: resolve_field(doc, "adm2_id"),
            name: get_string(doc, "name"),
            label: get_string(doc, "label"),
        })
    }
}
