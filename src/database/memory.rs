//! In-process [`DocumentStore`] used by the test-suite and local fixtures.
//!
//! Supports the filter subset the API issues: equality (array-contains
//! included), `$in`, `$nin`, `$ne`, `$exists`, `$regex` with `$options`,
//! `$elemMatch`, `$or`, `$and` and dotted paths. Every `find` is recorded so
//! tests can assert how many round trips a request cost.

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::database::manager::DatabaseError;
use crate::database::store::{DocumentStore, FindQuery};

#[derive(Debug, Clone)]
pub struct FindRecord {
    pub collection: String,
    pub filter: Document,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    finds: Mutex<Vec<FindRecord>>,
    offline: Mutex<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document, assigning an `_id` when it has none.
    pub fn insert(&self, collection: &str, mut document: Document) -> ObjectId {
        let id = match document.get("_id") {
            Some(Bson::ObjectId(id)) => *id,
            _ => {
                let id = ObjectId::new();
                document.insert("_id", id);
                id
            }
        };
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .push(document);
        id
    }

    pub fn insert_many(&self, collection: &str, documents: impl IntoIterator<Item = Document>) {
        for document in documents {
            self.insert(collection, document);
        }
    }

    pub fn all(&self, collection: &str) -> Vec<Document> {
        lock(&self.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every call fail as if the server were unreachable.
    pub fn set_offline(&self, offline: bool) {
        *lock(&self.offline) = offline;
    }

    pub fn find_log(&self) -> Vec<FindRecord> {
        lock(&self.finds).clone()
    }

    pub fn finds_on(&self, collection: &str) -> usize {
        lock(&self.finds)
            .iter()
            .filter(|record| record.collection == collection)
            .count()
    }

    pub fn clear_log(&self) {
        lock(&self.finds).clear();
    }

    fn check_online(&self) -> Result<(), DatabaseError> {
        if *lock(&self.offline) {
            return Err(DatabaseError::ConnectionError("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn matching(&self, collection: &str, filter: &Document) -> Vec<Document> {
        lock(&self.collections)
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, query: FindQuery) -> Result<Vec<Document>, DatabaseError> {
        self.check_online()?;
        lock(&self.finds).push(FindRecord {
            collection: collection.to_string(),
            filter: query.filter.clone(),
        });

        let mut docs = self.matching(collection, &query.filter);
        if let Some(sort) = &query.sort {
            docs.sort_by(|a, b| compare_by(a, b, sort));
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = match query.limit {
            Some(limit) if limit > 0 => limit as usize,
            _ => usize::MAX,
        };

        Ok(docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| match &query.projection {
                Some(projection) => project(d, projection),
                None => d,
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError> {
        self.check_online()?;
        Ok(self.matching(collection, &filter).len() as u64)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, DatabaseError> {
        self.check_online()?;
        Ok(self.insert(collection, document))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.check_online()
    }

    async fn shutdown(&self) {}
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$or" => sub_filters(condition).any(|f| matches(doc, f)),
        "$and" => sub_filters(condition).all(|f| matches(doc, f)),
        path => field_matches(lookup(doc, path), condition),
    })
}

fn sub_filters(condition: &Bson) -> impl Iterator<Item = &Document> {
    condition
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Bson::as_document)
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// The value itself plus, for arrays, each element.
fn candidates(value: Option<&Bson>) -> Vec<&Bson> {
    match value {
        Some(Bson::Array(items)) => {
            let mut out: Vec<&Bson> = items.iter().collect();
            out.push(value.unwrap_or(&Bson::Null));
            out
        }
        Some(v) => vec![v],
        None => vec![],
    }
}

fn is_operator_doc(condition: &Bson) -> bool {
    matches!(condition, Bson::Document(d) if d.keys().next().map_or(false, |k| k.starts_with('$')))
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> bool {
    match condition {
        Bson::Document(ops) if is_operator_doc(condition) => ops
            .iter()
            .all(|(op, arg)| operator_matches(value, op, arg, ops)),
        Bson::Null => value.map_or(true, |v| matches!(v, Bson::Null)),
        _ => candidates(value).into_iter().any(|v| bson_eq(v, condition)),
    }
}

fn operator_matches(value: Option<&Bson>, op: &str, arg: &Bson, ops: &Document) -> bool {
    match op {
        "$eq" => field_matches(value, arg),
        "$ne" => !field_matches(value, arg),
        "$in" => arg
            .as_array()
            .map_or(false, |options| options.iter().any(|o| field_matches(value, o))),
        "$nin" => arg
            .as_array()
            .map_or(true, |options| !options.iter().any(|o| field_matches(value, o))),
        "$exists" => value.is_some() == arg.as_bool().unwrap_or(true),
        "$regex" => {
            let Some(pattern) = arg.as_str() else { return false };
            let options = ops.get_str("$options").unwrap_or("");
            let Ok(re) = RegexBuilder::new(pattern)
                .case_insensitive(options.contains('i'))
                .build()
            else {
                return false;
            };
            candidates(value)
                .into_iter()
                .any(|v| v.as_str().map_or(false, |s| re.is_match(s)))
        }
        "$options" => true,
        "$elemMatch" => match (value, arg) {
            (Some(Bson::Array(items)), Bson::Document(sub)) => items
                .iter()
                .any(|item| item.as_document().map_or(false, |d| matches(d, sub))),
            _ => false,
        },
        "$gt" | "$gte" | "$lt" | "$lte" => candidates(value).into_iter().any(|v| {
            let ord = bson_cmp(Some(v), Some(arg));
            match op {
                "$gt" => ord == Ordering::Greater,
                "$gte" => ord != Ordering::Less,
                "$lt" => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            }
        }),
        _ => false,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn bson_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            match (a, b) {
                (Bson::String(x), Bson::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
                (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
                (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
                (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
                _ => Ordering::Equal,
            }
        }
    }
}

fn compare_by(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let ord = bson_cmp(lookup(a, field), lookup(b, field));
        let ord = if as_number(direction).map_or(false, |d| d < 0.0) {
            ord.reverse()
        } else {
            ord
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn project(doc: Document, projection: &Document) -> Document {
    let keep: Vec<&str> = projection
        .keys()
        .map(|k| k.split('.').next().unwrap_or(k))
        .collect();
    doc.into_iter()
        .filter(|(key, _)| key == "_id" || keep.contains(&key.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("farm", doc! { "name": "La Esperanza", "tags": ["a", "b"], "ext_id": [{ "source": "SIT_CODE", "ext_code": "123" }] });
        store.insert("farm", doc! { "name": "El Porvenir", "tags": ["c"], "log": { "enable": true } });
        store.insert("farm", doc! { "name": "Buenavista", "size": 3 });
        store
    }

    async fn names(store: &MemoryStore, query: FindQuery) -> Vec<String> {
        store
            .find("farm", query)
            .await
            .unwrap()
            .iter()
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn equality_matches_array_members() {
        let s = store();
        assert_eq!(names(&s, FindQuery::new(doc! { "tags": "b" })).await, vec!["La Esperanza"]);
    }

    #[tokio::test]
    async fn regex_is_case_insensitive_with_option() {
        let s = store();
        let q = FindQuery::new(doc! { "name": { "$regex": "porv", "$options": "i" } });
        assert_eq!(names(&s, q).await, vec!["El Porvenir"]);
        let q = FindQuery::new(doc! { "name": { "$regex": "porv" } });
        assert!(names(&s, q).await.is_empty());
    }

    #[tokio::test]
    async fn elem_match_and_dotted_paths() {
        let s = store();
        let q = FindQuery::new(doc! { "ext_id": { "$elemMatch": { "source": "SIT_CODE", "ext_code": { "$in": ["123"] } } } });
        assert_eq!(names(&s, q).await, vec!["La Esperanza"]);
        let q = FindQuery::new(doc! { "log.enable": true });
        assert_eq!(names(&s, q).await, vec!["El Porvenir"]);
    }

    #[tokio::test]
    async fn or_exists_sort_skip_limit() {
        let s = store();
        let q = FindQuery::new(doc! { "$or": [{ "size": { "$exists": true } }, { "tags": "c" }] })
            .sort(doc! { "name": 1 });
        assert_eq!(names(&s, q).await, vec!["Buenavista", "El Porvenir"]);

        let q = FindQuery::new(doc! {}).sort(doc! { "name": -1 }).skip(1).limit(1);
        assert_eq!(names(&s, q).await, vec!["El Porvenir"]);
    }

    #[tokio::test]
    async fn projection_keeps_id_and_listed_fields() {
        let s = store();
        let docs = s
            .find("farm", FindQuery::new(doc! { "size": 3 }).project(&["name"]))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains_key("_id"));
        assert!(docs[0].contains_key("name"));
        assert!(!docs[0].contains_key("size"));
    }

    #[tokio::test]
    async fn records_finds_and_goes_offline() {
        let s = store();
        s.find("farm", FindQuery::default()).await.unwrap();
        s.find("adm3", FindQuery::default()).await.unwrap();
        assert_eq!(s.finds_on("farm"), 1);
        assert_eq!(s.find_log().len(), 2);

        s.set_offline(true);
        assert!(s.ping().await.is_err());
        assert!(s.count("farm", doc! {}).await.is_err());
    }
}
