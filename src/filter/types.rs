use serde::{Deserialize, Serialize};

use super::error::FilterError;

/// Largest offset the store accepts (a signed 64-bit skip).
pub const MAX_SKIP: u64 = i64::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_mongo(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub field: String,
    pub sort: SortDirection,
}

/// Query-string parameters shared by every `paged/` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub search: Option<String>,
    pub search_fields: Option<String>,
    pub order_by: Option<String>,
}

/// Resolved slice of a result set. `skip` overrides `page` when both are given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
    pub skip_given: bool,
}

impl PageWindow {
    /// The first page of `limit` rows.
    pub const fn first(limit: u64) -> Self {
        Self {
            page: 1,
            limit,
            skip: 0,
            skip_given: false,
        }
    }

    pub fn new(page: u64, limit: u64, skip: Option<u64>) -> Result<Self, FilterError> {
        let limit = limit.max(1);
        let page = page.max(1);
        match skip {
            Some(skip) => {
                if skip > MAX_SKIP {
                    return Err(FilterError::InvalidPage(format!("skip must be at most {}", MAX_SKIP)));
                }
                Ok(Self {
                    page: skip / limit + 1,
                    limit,
                    skip,
                    skip_given: true,
                })
            }
            None => Ok(Self {
                page,
                limit,
                skip: Self::offset(page, limit)?,
                skip_given: false,
            }),
        }
    }

    /// Rows before `page`, rejected when it does not fit a store offset.
    pub fn offset(page: u64, limit: u64) -> Result<u64, FilterError> {
        page.saturating_sub(1)
            .checked_mul(limit)
            .filter(|skip| *skip <= MAX_SKIP)
            .ok_or_else(|| FilterError::InvalidPage(format!("page {} is out of range", page)))
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }

    pub fn has_next(&self, total: u64) -> bool {
        self.skip.saturating_add(self.limit) < total
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub total: u64,
    pub limit: u64,
    pub skip: u64,
    pub page: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(window: PageWindow, total: u64, results: Vec<T>) -> Self {
        Self {
            total,
            limit: window.limit,
            skip: window.skip,
            page: window.page,
            total_pages: window.total_pages(total),
            has_next: window.has_next(total),
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            total: self.total,
            limit: self.limit,
            skip: self.skip,
            page: self.page,
            total_pages: self.total_pages,
            has_next: self.has_next,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_two_of_twenty_five() {
        let window = PageWindow::new(2, 10, None).unwrap();
        assert_eq!(window.skip, 10);
        assert_eq!(window.total_pages(25), 3);
        assert!(window.has_next(25));
        assert!(!PageWindow::new(3, 10, None).unwrap().has_next(25));
    }

    #[test]
    fn skip_overrides_page() {
        let window = PageWindow::new(7, 10, Some(15)).unwrap();
        assert_eq!(window.skip, 15);
        assert_eq!(window.page, 2);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let window = PageWindow::new(1, 10, None).unwrap();
        assert_eq!(window.total_pages(0), 0);
        assert!(!window.has_next(0));
    }

    #[test]
    fn huge_page_is_rejected() {
        assert!(matches!(PageWindow::new(u64::MAX, 1000, None), Err(FilterError::InvalidPage(_))));
        assert!(matches!(PageWindow::new(u64::MAX / 2, 10, None), Err(FilterError::InvalidPage(_))));
        assert_eq!(PageWindow::offset(3, 20), Ok(40));
    }

    #[test]
    fn huge_skip_is_rejected() {
        assert!(matches!(PageWindow::new(1, 10, Some(u64::MAX)), Err(FilterError::InvalidPage(_))));
        let window = PageWindow::new(1, 10, Some(MAX_SKIP)).unwrap();
        assert!(!window.has_next(u64::MAX));
    }
}
