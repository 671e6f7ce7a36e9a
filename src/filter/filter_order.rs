use bson::Document;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Parse `order_by=name,-ugg_size` against a whitelist. A leading `-`
    /// sorts descending; unknown fields are rejected, never ignored.
    pub fn validate_and_parse(order_by: &str, allowed: &[&str]) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in order_by.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (field, sort) = match trimmed.strip_prefix('-') {
                Some(rest) => (rest.trim(), SortDirection::Desc),
                None => (trimmed.trim_start_matches('+').trim(), SortDirection::Asc),
            };
            if !allowed.contains(&field) {
                return Err(FilterError::InvalidSortField {
                    field: field.to_string(),
                    allowed: allowed.join(", "),
                });
            }
            out.push(FilterOrderInfo {
                field: field.to_string(),
                sort,
            });
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> Document {
        let mut sort = Document::new();
        for info in infos {
            sort.insert(info.field.clone(), info.sort.to_mongo());
        }
        sort
    }
}
