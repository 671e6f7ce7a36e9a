use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{ClientOptions, Collation, CollationStrength},
    Client, Collection,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::database::store::{DocumentStore, FindQuery};

/// Errors raised by the document store layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URI: {0}")]
    InvalidUri(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
}

impl DatabaseError {
    /// True when the store itself could not be reached, as opposed to a bad query.
    pub fn is_connectivity(&self) -> bool {
        match self {
            DatabaseError::ConnectionError(_) => true,
            DatabaseError::Mongo(err) => matches!(
                *err.kind,
                mongodb::error::ErrorKind::ServerSelection { .. }
                    | mongodb::error::ErrorKind::Io(_)
                    | mongodb::error::ErrorKind::ConnectionPoolCleared { .. }
            ),
            _ => false,
        }
    }
}

/// MongoDB-backed store. The client is acquired once at startup and released
/// through [`DocumentStore::shutdown`] when the server stops.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db_name: String,
}

impl MongoStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        if config.uri.trim().is_empty() {
            return Err(DatabaseError::ConfigMissing("MONGO_URI"));
        }
        if config.name.trim().is_empty() {
            return Err(DatabaseError::ConfigMissing("MONGO_DB_NAME"));
        }

        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| DatabaseError::InvalidUri(e.to_string()))?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.server_selection_timeout = Some(Duration::from_secs(config.connection_timeout));

        let client = Client::with_options(options)?;
        let store = Self {
            client,
            db_name: config.name.clone(),
        };

        store
            .ping()
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        info!("Connected to MongoDB database: {}", store.db_name);
        Ok(store)
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection(name)
    }

    /// Sorts use a primary-strength Spanish collation so names order the way
    /// users expect regardless of case and accents.
    fn collation() -> Collation {
        Collation::builder()
            .locale("es".to_string())
            .strength(CollationStrength::Primary)
            .build()
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(&self, collection: &str, query: FindQuery) -> Result<Vec<Document>, DatabaseError> {
        debug!(collection, filter = %query.filter, "find");

        let coll = self.collection(collection);
        let mut action = coll.find(query.filter);
        if let Some(projection) = query.projection {
            action = action.projection(projection);
        }
        if let Some(sort) = query.sort {
            action = action.sort(sort).collation(Self::collation());
        }
        if let Some(skip) = query.skip {
            action = action.skip(skip);
        }
        if let Some(limit) = query.limit {
            action = action.limit(limit);
        }

        let cursor = action.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError> {
        Ok(self.collection(collection).count_documents(filter).await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, DatabaseError> {
        let result = self.collection(collection).insert_one(document).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DatabaseError::QueryError("inserted id is not an ObjectId".to_string()))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
        info!("Closed MongoDB client for: {}", self.db_name);
    }
}
