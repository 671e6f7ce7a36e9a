use bson::Document;
use tracing::warn;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterOrderInfo, PageParams, PageWindow, Paginated};
use crate::config::QueryConfig;
use crate::database::{DatabaseError, DocumentStore, FindQuery};

/// Builder for a paginated, searchable, sortable listing of one collection.
pub struct Filter {
    collection: String,
    base: Document,
    search: Option<Document>,
    order_data: Vec<FilterOrderInfo>,
    projection: Vec<&'static str>,
    window: PageWindow,
}

impl Filter {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            base: Document::new(),
            search: None,
            order_data: vec![],
            projection: vec![],
            window: PageWindow::first(10),
        }
    }

    /// Apply the standard `paged/` parameters against a field whitelist.
    pub fn assign(
        &mut self,
        params: &PageParams,
        allowed: &[&'static str],
        limits: &QueryConfig,
    ) -> Result<&mut Self, FilterError> {
        self.search = FilterWhere::paged_search(
            params.search.as_deref(),
            params.search_fields.as_deref(),
            allowed,
            limits,
        )?;
        if let Some(order_by) = params.order_by.as_deref() {
            self.order(order_by, allowed)?;
        }
        self.page(
            params.page.unwrap_or(1),
            params.limit.unwrap_or(limits.page_default_limit),
            params.skip,
            limits.page_max_limit,
        )?;
        Ok(self)
    }

    pub fn where_clause(&mut self, base: Document) -> &mut Self {
        self.base = base;
        self
    }

    pub fn order(&mut self, order_by: &str, allowed: &[&str]) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(order_by, allowed)?;
        Ok(self)
    }

    pub fn select(&mut self, fields: &[&'static str]) -> &mut Self {
        self.projection = fields.to_vec();
        self
    }

    pub fn page(&mut self, page: u64, limit: u64, skip: Option<u64>, max_limit: u64) -> Result<&mut Self, FilterError> {
        if page == 0 {
            return Err(FilterError::InvalidPage("page must be at least 1".to_string()));
        }
        if limit == 0 {
            return Err(FilterError::InvalidLimit("limit must be at least 1".to_string()));
        }
        let limit = if limit > max_limit {
            warn!(requested = limit, max = max_limit, "limit capped");
            max_limit
        } else {
            limit
        };
        self.window = PageWindow::new(page, limit, skip)?;
        Ok(self)
    }

    /// Combined filter document: base conditions AND search.
    pub fn filter_document(&self) -> Document {
        match (&self.search, self.base.is_empty()) {
            (None, _) => self.base.clone(),
            (Some(search), true) => search.clone(),
            (Some(search), false) => bson::doc! { "$and": [self.base.clone(), search.clone()] },
        }
    }

    pub async fn paginate(&self, store: &dyn DocumentStore) -> Result<Paginated<Document>, DatabaseError> {
        let filter = self.filter_document();
        let total = store.count(&self.collection, filter.clone()).await?;

        let query = FindQuery::new(filter)
            .project(&self.projection)
            .sort(FilterOrder::generate(&self.order_data))
            .skip(self.window.skip)
            .limit(self.window.limit as i64);
        let results = store.find(&self.collection, query).await?;

        Ok(Paginated::new(self.window, total, results))
    }
}
