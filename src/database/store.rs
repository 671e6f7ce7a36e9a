use async_trait::async_trait;
use bson::{oid::ObjectId, Document};

use crate::database::manager::DatabaseError;

/// A single find request: filter plus optional projection, sort and window.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindQuery {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Restrict the returned fields. `_id` is always returned by the store.
    pub fn project(mut self, fields: &[&str]) -> Self {
        if !fields.is_empty() {
            let mut projection = Document::new();
            for field in fields {
                projection.insert(*field, 1);
            }
            self.projection = Some(projection);
        }
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        if !sort.is_empty() {
            self.sort = Some(sort);
        }
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The persistence seam. Production uses [`MongoStore`](crate::database::MongoStore);
/// tests substitute [`MemoryStore`](crate::database::MemoryStore).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, query: FindQuery) -> Result<Vec<Document>, DatabaseError>;

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>, DatabaseError> {
        let mut docs = self.find(collection, FindQuery::new(filter).limit(1)).await?;
        Ok(if docs.is_empty() { None } else { Some(docs.swap_remove(0)) })
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError>;

    async fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;

    async fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn projection_lists_fields() {
        let query = FindQuery::new(doc! {}).project(&["name", "adm2_id"]);
        assert_eq!(query.projection, Some(doc! { "name": 1, "adm2_id": 1 }));
    }

    #[test]
    fn empty_projection_and_sort_are_dropped() {
        let query = FindQuery::new(doc! {}).project(&[]).sort(doc! {});
        assert!(query.projection.is_none());
        assert!(query.sort.is_none());
    }
}
