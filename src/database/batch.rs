use bson::{doc, oid::ObjectId, Bson, Document};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::database::manager::DatabaseError;
use crate::database::reference::{ref_in, resolve_id};
use crate::database::store::{DocumentStore, FindQuery};

/// Bulk lookups by id. Every join in the risk layer goes through here so that
/// a request costs one query per chunk instead of one per related document.
pub struct Batcher<'a> {
    store: &'a dyn DocumentStore,
    chunk_size: usize,
}

impl<'a> Batcher<'a> {
    pub fn new(store: &'a dyn DocumentStore, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn store(&self) -> &'a dyn DocumentStore {
        self.store
    }

    /// Fetch documents by `_id`. The map omits ids with no match.
    pub async fn fetch(
        &self,
        collection: &str,
        ids: &[ObjectId],
        fields: &[&str],
    ) -> Result<HashMap<ObjectId, Document>, DatabaseError> {
        let ids = distinct(ids);
        let mut found = HashMap::with_capacity(ids.len());

        for (n, chunk) in ids.chunks(self.chunk_size).enumerate() {
            let values: Vec<Bson> = chunk.iter().map(|id| Bson::ObjectId(*id)).collect();
            let query = FindQuery::new(doc! { "_id": { "$in": values } }).project(fields);
            let docs = self.store.find(collection, query).await?;
            debug!(collection, chunk = n, requested = chunk.len(), matched = docs.len(), "batch fetch");

            for doc in docs {
                if let Some(id) = doc.get("_id").and_then(resolve_id) {
                    found.entry(id).or_insert(doc);
                }
            }
        }
        Ok(found)
    }

    /// Fetch documents whose `ref_field` points at any of `ids`, sorted by `_id`.
    pub async fn fetch_by(
        &self,
        collection: &str,
        ref_field: &str,
        ids: &[ObjectId],
        fields: &[&str],
    ) -> Result<Vec<Document>, DatabaseError> {
        self.fetch_by_with(collection, ref_field, ids, Document::new(), fields)
            .await
    }

    /// Like [`fetch_by`](Self::fetch_by) with an extra condition ANDed onto
    /// every chunk's filter.
    pub async fn fetch_by_with(
        &self,
        collection: &str,
        ref_field: &str,
        ids: &[ObjectId],
        extra: Document,
        fields: &[&str],
    ) -> Result<Vec<Document>, DatabaseError> {
        let ids = distinct(ids);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for (n, chunk) in ids.chunks(self.chunk_size).enumerate() {
            let by_ref = ref_in(ref_field, chunk);
            let filter = if extra.is_empty() {
                by_ref
            } else {
                doc! { "$and": [by_ref, extra.clone()] }
            };
            let docs = self.store.find(collection, FindQuery::new(filter).project(fields)).await?;
            debug!(collection, ref_field, chunk = n, requested = chunk.len(), matched = docs.len(), "batch fetch by reference");

            for doc in docs {
                match doc.get("_id").and_then(resolve_id) {
                    Some(id) if !seen.insert(id) => continue,
                    _ => out.push(doc),
                }
            }
        }

        out.sort_by_key(|d| d.get("_id").and_then(resolve_id).map(|id| id.bytes()));
        Ok(out)
    }
}

fn distinct(ids: &[ObjectId]) -> Vec<ObjectId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
