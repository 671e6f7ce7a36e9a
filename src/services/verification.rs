use bson::{doc, Bson};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::api::format::serialize_oid_opt;
use crate::auth::permissions::find_user;
use crate::database::models::deforestation::serialize_timestamp;
use crate::database::models::{collections, FarmRiskVerification};
use crate::database::reference::{parse_object_id, ref_in};
use crate::database::{DatabaseError, DocumentStore};
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Invalid ObjectId in 'farmrisk_id': {0}")]
    InvalidId(String),

    #[error("FarmRisk not found")]
    FarmRiskNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("User is not allowed to verify farm risk")]
    NotVerifier,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        let message = err.to_string();
        match err {
            VerificationError::InvalidId(_) => ApiError::bad_request(message),
            VerificationError::FarmRiskNotFound | VerificationError::UserNotFound => ApiError::not_found(message),
            VerificationError::NotVerifier => ApiError::forbidden(message),
            VerificationError::Database(db) => db.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVerification {
    pub farmrisk_id: String,
    pub observation: Option<String>,
    pub status: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationRecord {
    #[serde(serialize_with = "serialize_oid_opt")]
    pub id: Option<bson::oid::ObjectId>,
    #[serde(serialize_with = "serialize_oid_opt")]
    pub user_id: Option<bson::oid::ObjectId>,
    #[serde(serialize_with = "serialize_oid_opt")]
    pub farmrisk_id: Option<bson::oid::ObjectId>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub verification_date: Option<NaiveDateTime>,
    pub observation: Option<String>,
    pub status: bool,
}

/// Record a field verification of a FarmRisk row by the local user behind
/// `subject`. The user must be listed in `userverifier`.
pub async fn create(
    store: &dyn DocumentStore,
    subject: &str,
    input: NewVerification,
) -> Result<VerificationRecord, VerificationError> {
    let farmrisk = parse_object_id(&input.farmrisk_id)
        .ok_or_else(|| VerificationError::InvalidId(input.farmrisk_id.clone()))?;

    store
        .find_one(collections::FARM_RISK, doc! { "_id": farmrisk })
        .await?
        .ok_or(VerificationError::FarmRiskNotFound)?;

    let user = find_user(store, subject).await?.ok_or(VerificationError::UserNotFound)?;

    let mut verifier = ref_in("user_id", &[user.id]);
    if let Ok(branches) = verifier.get_array_mut("$or") {
        branches.push(Bson::Document(doc! { "_id": user.id }));
    }
    store
        .find_one(collections::USER_VERIFIER, verifier)
        .await?
        .ok_or(VerificationError::NotVerifier)?;

    let mut record = FarmRiskVerification {
        id: None,
        user_id: Some(user.id),
        farmrisk_id: Some(farmrisk),
        // second precision, as stored
        verification: chrono::DateTime::from_timestamp(Utc::now().timestamp(), 0).map(|t| t.naive_utc()),
        observation: input.observation,
        status: input.status,
    };
    record.id = Some(store.insert_one(collections::FARM_RISK_VERIFICATION, record.to_document()).await?);
    info!(farmrisk = %farmrisk, user = %user.id, status = record.status, "farm risk verified");

    Ok(VerificationRecord {
        id: record.id,
        user_id: record.user_id,
        farmrisk_id: record.farmrisk_id,
        verification_date: record.verification,
        observation: record.observation,
        status: record.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn seeded(verifier: bool) -> (MemoryStore, bson::oid::ObjectId) {
        let store = MemoryStore::new();
        let user = store.insert(collections::USER, doc! { "ext_id": "kc-7" });
        if verifier {
            store.insert(collections::USER_VERIFIER, doc! { "user_id": user });
        }
        let farmrisk = store.insert(collections::FARM_RISK, doc! { "risk_direct": true });
        (store, farmrisk)
    }

    fn input(farmrisk: &str) -> NewVerification {
        NewVerification {
            farmrisk_id: farmrisk.to_string(),
            observation: Some("sin cobertura".into()),
            status: false,
        }
    }

    #[tokio::test]
    async fn verifier_creates_a_record() {
        let (store, farmrisk) = seeded(true);
        let record = create(&store, "kc-7", input(&farmrisk.to_hex())).await.unwrap();

        assert_eq!(record.farmrisk_id, Some(farmrisk));
        assert!(record.verification_date.is_some());
        let stored = store.all(collections::FARM_RISK_VERIFICATION);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_object_id("farmrisk").unwrap(), farmrisk);
    }

    #[tokio::test]
    async fn failure_modes() {
        let (store, farmrisk) = seeded(false);
        assert!(matches!(create(&store, "kc-7", input("bad")).await, Err(VerificationError::InvalidId(_))));
        let missing = bson::oid::ObjectId::new().to_hex();
        assert!(matches!(create(&store, "kc-7", input(&missing)).await, Err(VerificationError::FarmRiskNotFound)));
        assert!(matches!(create(&store, "nobody", input(&farmrisk.to_hex())).await, Err(VerificationError::UserNotFound)));
        assert!(matches!(create(&store, "kc-7", input(&farmrisk.to_hex())).await, Err(VerificationError::NotVerifier)));
        assert!(store.all(collections::FARM_RISK_VERIFICATION).is_empty());
    }
}
