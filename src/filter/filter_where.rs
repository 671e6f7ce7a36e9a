use bson::{doc, Bson, Document};

use super::error::FilterError;
use crate::config::QueryConfig;

/// Builds case-insensitive partial-match conditions, OR-combined across the
/// cross product of terms and fields.
pub struct FilterWhere;

impl FilterWhere {
    /// `{"$or": [{field: {"$regex": escaped, "$options": "i"}}, ...]}`
    pub fn search(terms: &[String], fields: &[&str]) -> Document {
        let branches: Vec<Bson> = terms
            .iter()
            .flat_map(|term| {
                let pattern = regex::escape(term);
                fields.iter().map(move |field| {
                    Bson::Document(doc! { *field: { "$regex": pattern.clone(), "$options": "i" } })
                })
            })
            .collect();
        doc! { "$or": branches }
    }

    /// Split a comma separated search parameter, truncating each term.
    pub fn parse_terms(raw: &str, max_len: usize) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().take(max_len).collect())
            .collect()
    }

    /// The `paged/` search: `search_fields` defaults to the whole whitelist
    /// and unknown names are dropped. Caps are enforced before any query runs.
    pub fn paged_search(
        search: Option<&str>,
        search_fields: Option<&str>,
        allowed: &[&'static str],
        limits: &QueryConfig,
    ) -> Result<Option<Document>, FilterError> {
        let Some(search) = search.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let fields: Vec<&str> = match search_fields {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter_map(|f| allowed.iter().copied().find(|a| *a == f))
                .collect(),
            None => allowed.to_vec(),
        };
        if fields.is_empty() {
            return Err(FilterError::NoSearchFields {
                allowed: allowed.join(", "),
            });
        }

        let terms = Self::parse_terms(search, limits.search_max_term_len);
        if terms.is_empty() {
            return Ok(None);
        }
        if terms.len() > limits.search_max_terms {
            return Err(FilterError::TooManyTerms {
                count: terms.len(),
                max: limits.search_max_terms,
            });
        }
        let combinations = terms.len() * fields.len();
        if combinations > limits.search_max_combinations {
            return Err(FilterError::SearchTooBroad {
                combinations,
                max: limits.search_max_combinations,
            });
        }

        Ok(Some(Self::search(&terms, &fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> QueryConfig {
        QueryConfig::default()
    }

    #[test]
    fn escapes_regex_metacharacters() {
        let filter = FilterWhere::search(&["a.b(".to_string()], &["name"]);
        let branch = filter.get_array("$or").unwrap()[0].as_document().unwrap().clone();
        assert_eq!(branch, doc! { "name": { "$regex": "a\\.b\\(", "$options": "i" } });
    }

    #[test]
    fn terms_are_truncated() {
        let long = "x".repeat(40);
        let terms = FilterWhere::parse_terms(&format!("{long}, ab ,"), 25);
        assert_eq!(terms, vec!["x".repeat(25), "ab".to_string()]);
    }

    #[test]
    fn cross_product_of_terms_and_fields() {
        let filter = FilterWhere::paged_search(Some("a,b"), Some("name,ext_id,bogus"), &["name", "ext_id"], &limits())
            .unwrap()
            .unwrap();
        assert_eq!(filter.get_array("$or").unwrap().len(), 4);
    }

    #[test]
    fn too_many_terms_is_rejected() {
        let err = FilterWhere::paged_search(Some("a,b,c,d,e,f"), None, &["name"], &limits()).unwrap_err();
        assert_eq!(err, FilterError::TooManyTerms { count: 6, max: 5 });
    }

    #[test]
    fn too_broad_is_rejected() {
        let fields: Vec<&'static str> = vec![
            "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10",
        ];
        let err = FilterWhere::paged_search(Some("a,b,c,d,e"), None, &fields, &limits()).unwrap_err();
        assert_eq!(err, FilterError::SearchTooBroad { combinations: 55, max: 50 });
    }

    #[test]
    fn only_unknown_fields_is_rejected() {
        let err = FilterWhere::paged_search(Some("a"), Some("secret"), &["name"], &limits()).unwrap_err();
        assert!(matches!(err, FilterError::NoSearchFields { .. }));
    }

    #[test]
    fn no_search_is_no_filter() {
        assert_eq!(FilterWhere::paged_search(None, None, &["name"], &limits()), Ok(None));
        assert_eq!(FilterWhere::paged_search(Some("  "), None, &["name"], &limits()), Ok(None));
    }
}
