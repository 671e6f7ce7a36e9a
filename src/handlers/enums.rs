use axum::{extract::Query, Json};
use serde::Deserialize;

use crate::enums;
use crate::error::{ApiError, ApiResult};
use crate::filter::FilterError;

#[derive(Debug, Deserialize)]
pub struct EnumQuery {
    pub enum_name: Option<String>,
}

/// GET /enums/?enum_name=Species
pub async fn values(Query(query): Query<EnumQuery>) -> ApiResult<Vec<&'static str>> {
    let name = query
        .enum_name
        .ok_or_else(|| FilterError::MissingParameter("enum_name".to_string()))?;
    let def = enums::lookup(&name).ok_or_else(|| ApiError::not_found(format!("Enumeration '{}' not found", name)))?;
    Ok(Json(def.values.to_vec()))
}
