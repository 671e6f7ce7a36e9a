//! Read-only views over the externally owned collections.
//!
//! The documents are written by an upstream pipeline, so every accessor is
//! lenient: missing or oddly typed fields fall back to `None`/zero rather than
//! failing the request.

pub mod adm;
pub mod analysis;
pub mod deforestation;
pub mod farm;
pub mod risk;
pub mod user;
pub mod verification;

pub use adm::Adm3;
pub use analysis::Analysis;
pub use deforestation::{Deforestation, DeforestationType, Period};
pub use farm::{ExtId, Farm};
pub use risk::{Adm3Risk, AreaMeasure, EnterpriseRisk, FarmRisk};
pub use user::{Role, User};
pub use verification::FarmRiskVerification;

use bson::{Bson, Document};
use chrono::{DateTime, NaiveDateTime};

/// Collection names as stored by the upstream pipeline.
pub mod collections {
    pub const ADM1: &str = "adm1";
    pub const ADM2: &str = "adm2";
    pub const ADM3: &str = "adm3";
    pub const FARM: &str = "farm";
    pub const FARM_POLYGONS: &str = "farmpolygons";
    pub const ENTERPRISE: &str = "enterprise";
    pub const SUPPLIERS: &str = "suppliers";
    pub const DEFORESTATION: &str = "deforestation";
    pub const PROTECTED_AREAS: &str = "protectedareas";
    pub const FARMING_AREAS: &str = "farmingareas";
    pub const ANALYSIS: &str = "analysis";
    pub const ADM3_RISK: &str = "adm3risk";
    pub const FARM_RISK: &str = "farmrisk";
    pub const ENTERPRISE_RISK: &str = "enterpriserisk";
    pub const MOVEMENT: &str = "movement";
    pub const FARM_RISK_VERIFICATION: &str = "farmriskverification";
    pub const USER: &str = "user";
    pub const ROLE: &str = "role";
    pub const USER_VERIFIER: &str = "userverifier";
}

pub fn get_f64(doc: &Document, key: &str) -> Option<f64> {
    match doc.get(key)? {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn get_i64(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(*v as i64),
        Bson::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truthiness the way the pipeline writes flags: booleans, or 0/1 numbers.
pub fn get_flag(doc: &Document, key: &str) -> bool {
    match doc.get(key) {
        Some(Bson::Boolean(b)) => *b,
        Some(Bson::Int32(v)) => *v != 0,
        Some(Bson::Int64(v)) => *v != 0,
        Some(Bson::Double(v)) => *v != 0.0,
        _ => false,
    }
}

pub fn get_string(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key)? {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(v) => Some(v.to_string()),
        Bson::Int64(v) => Some(v.to_string()),
        _ => None,
    }
}

pub fn get_datetime(doc: &Document, key: &str) -> Option<NaiveDateTime> {
    match doc.get(key)? {
        Bson::DateTime(dt) => Some(dt.to_chrono().naive_utc()),
        Bson::String(s) => parse_datetime(s),
        _ => None,
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok())
}

pub fn get_document<'a>(doc: &'a Document, key: &str) -> Option<&'a Document> {
    doc.get(key).and_then(Bson::as_document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use chrono::TimeZone;

    #[test]
    fn numeric_accessors_are_lenient() {
        let d = doc! { "a": 1, "b": 2.5, "c": "3.5", "d": true, "e": 0 };
        assert_eq!(get_f64(&d, "a"), Some(1.0));
        assert_eq!(get_f64(&d, "c"), Some(3.5));
        assert_eq!(get_i64(&d, "b"), Some(2));
        assert_eq!(get_f64(&d, "missing"), None);
        assert!(get_flag(&d, "d"));
        assert!(!get_flag(&d, "e"));
        assert!(!get_flag(&d, "missing"));
    }

    #[test]
    fn datetime_from_bson_and_string() {
        let when = chrono::NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(5, 6, 7)
            .unwrap();
        let d = doc! {
            "a": bson::DateTime::from_chrono(chrono::Utc.from_utc_datetime(&when)),
            "b": "2021-03-04T05:06:07",
            "c": "2021-03-04T05:06:07Z",
        };
        assert_eq!(get_datetime(&d, "a"), Some(when));
        assert_eq!(get_datetime(&d, "b"), Some(when));
        assert_eq!(get_datetime(&d, "c"), Some(when));
    }
}
