use bson::{doc, oid::ObjectId, Document};
use chrono::{NaiveDateTime, TimeZone, Utc};

use super::{get_datetime, get_flag, get_string};
use crate::database::reference::resolve_field;

/// Field audit of a FarmRisk row. The only collection this service writes.
#[derive(Debug, Clone)]
pub struct FarmRiskVerification {
    pub id: Option<ObjectId>,
    pub user_id: Option<ObjectId>,
    pub farmrisk_id: Option<ObjectId>,
    pub verification: Option<NaiveDateTime>,
    pub observation: Option<String>,
    pub status: bool,
}

impl FarmRiskVerification {
    pub const FIELDS: [&'static str; 5] = ["user_id", "farmrisk", "verification", "observation", "status"];

    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: resolve_field(doc, "_id"),
            user_id: resolve_field(doc, "user_id"),
            farmrisk_id: resolve_field(doc, "farmrisk"),
            verification: get_datetime(doc, "verification"),
            observation: get_string(doc, "observation"),
            status: get_flag(doc, "status"),
        }
    }

    pub fn to_document(&self) -> Document {
        let mut out = doc! {
            "user_id": self.user_id,
            "farmrisk": self.farmrisk_id,
            "observation": self.observation.clone(),
            "status": self.status,
        };
        if let Some(at) = self.verification {
            out.insert("verification", bson::DateTime::from_chrono(Utc.from_utc_datetime(&at)));
        }
        out
    }
}
