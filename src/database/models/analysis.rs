use bson::{oid::ObjectId, Document};
use chrono::NaiveDateTime;

use super::get_datetime;
use crate::database::reference::resolve_field;

/// A pinned risk computation run: one deforestation dataset plus optional
/// area layers.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub id: ObjectId,
    pub deforestation_id: Option<ObjectId>,
    pub protected_areas_id: Option<ObjectId>,
    pub farming_areas_id: Option<ObjectId>,
    pub user_id: Option<ObjectId>,
    pub date: Option<NaiveDateTime>,
}

impl Analysis {
    pub const FIELDS: [&'static str; 5] = [
        "deforestation_id",
        "protected_areas_id",
        "farming_areas_id",
        "user_id",
        "date",
    ];

    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            deforestation_id: resolve_field(doc, "deforestation_id"),
            protected_areas_id: resolve_field(doc, "protected_areas_id"),
            farming_areas_id: resolve_field(doc, "farming_areas_id"),
            user_id: resolve_field(doc, "user_id"),
            date: get_datetime(doc, "date"),
        })
    }
}
