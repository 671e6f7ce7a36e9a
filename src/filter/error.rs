use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("Too many search terms: {count} given, maximum is {max}")]
    TooManyTerms { count: usize, max: usize },

    #[error("Search is too broad ({combinations} term/field combinations, maximum is {max}). Reduce number of terms or fields.")]
    SearchTooBroad { combinations: usize, max: usize },

    #[error("No valid search fields. Allowed: {allowed}")]
    NoSearchFields { allowed: String },

    #[error("Invalid sort field: {field}. Allowed: {allowed}")]
    InvalidSortField { field: String, allowed: String },

    #[error("Invalid {field}: {values}. Valid options: {allowed}")]
    InvalidOption { field: String, values: String, allowed: String },

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid page: {0}")]
    InvalidPage(String),
}
