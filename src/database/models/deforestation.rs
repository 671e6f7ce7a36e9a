use bson::{oid::ObjectId, Document};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::{get_datetime, get_i64, get_string};
use crate::database::reference::resolve_field;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn serialize_timestamp<S: Serializer>(ts: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeforestationType {
    Annual,
    Cumulative,
    Warning,
    Quarter,
}

impl DeforestationType {
    pub const ALL: [DeforestationType; 4] = [
        DeforestationType::Annual,
        DeforestationType::Cumulative,
        DeforestationType::Warning,
        DeforestationType::Quarter,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            DeforestationType::Annual => "annual",
            DeforestationType::Cumulative => "cumulative",
            DeforestationType::Warning => "warning",
            DeforestationType::Quarter => "quarter",
        }
    }
}

impl fmt::Display for DeforestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeforestationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                format!("Invalid deforestation type '{}'. Allowed: {}", s, allowed.join(", "))
            })
    }
}

/// A deforestation dataset's validity window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Period {
    #[serde(rename = "period_start", serialize_with = "serialize_timestamp")]
    pub start: Option<NaiveDateTime>,
    #[serde(rename = "period_end", serialize_with = "serialize_timestamp")]
    pub end: Option<NaiveDateTime>,
}

impl Period {
    /// Explicit `period_start`/`period_end` win; legacy documents carrying only
    /// `year_start`/`year_end` get Jan 1 00:00:00 through Dec 31 23:59:59.
    pub fn from_document(doc: &Document) -> Self {
        let start = get_datetime(doc, "period_start").or_else(|| {
            get_i64(doc, "year_start")
                .and_then(|y| NaiveDate::from_ymd_opt(i32::try_from(y).ok()?, 1, 1))
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
        let end = get_datetime(doc, "period_end").or_else(|| {
            get_i64(doc, "year_end")
                .and_then(|y| NaiveDate::from_ymd_opt(i32::try_from(y).ok()?, 12, 31))
                .and_then(|d| d.and_hms_opt(23, 59, 59))
        });
        Self { start, end }
    }
}

#[derive(Debug, Clone)]
pub struct Deforestation {
    pub id: ObjectId,
    pub source: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub period: Period,
}

impl Deforestation {
    pub const FIELDS: [&'static str; 9] = [
        "deforestation_source",
        "deforestation_type",
        "name",
        "path",
        "period_start",
        "period_end",
        "year_start",
        "year_end",
        "_id",
    ];

    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            source: get_string(doc, "deforestation_source"),
            kind: get_string(doc, "deforestation_type"),
            name: get_string(doc, "name"),
            path: get_string(doc, "path"),
            period: Period::from_document(doc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn legacy_years_synthesize_period() {
        let period = Period::from_document(&doc! { "year_start": 2010, "year_end": 2012 });
        assert_eq!(period.start.map(|t| format_timestamp(&t)).as_deref(), Some("2010-01-01T00:00:00"));
        assert_eq!(period.end.map(|t| format_timestamp(&t)).as_deref(), Some("2012-12-31T23:59:59"));
    }

    #[test]
    fn explicit_period_wins_over_years() {
        let period = Period::from_document(&doc! {
            "period_start": "2020-06-01T00:00:00",
            "period_end": "2020-06-30T23:59:59",
            "year_start": 2010,
            "year_end": 2012,
        });
        assert_eq!(period.start.map(|t| format_timestamp(&t)).as_deref(), Some("2020-06-01T00:00:00"));
        assert_eq!(period.end.map(|t| format_timestamp(&t)).as_deref(), Some("2020-06-30T23:59:59"));
    }

    #[test]
    fn missing_everything_is_open() {
        assert_eq!(Period::from_document(&doc! {}), Period::default());
    }

    #[test]
    fn period_serializes_with_timestamp_format() {
        let period = Period::from_document(&doc! { "year_start": 2015, "year_end": 2015 });
        let json = serde_json::to_value(period).unwrap();
        assert_eq!(json["period_start"], "2015-01-01T00:00:00");
        assert_eq!(json["period_end"], "2015-12-31T23:59:59");
    }

    #[test]
    fn parses_type_case_insensitively() {
        assert_eq!("Annual".parse::<DeforestationType>(), Ok(DeforestationType::Annual));
        assert!("yearly".parse::<DeforestationType>().unwrap_err().contains("annual"));
    }
}
