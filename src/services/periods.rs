//! Analysis → Deforestation → period resolution.

use bson::{doc, oid::ObjectId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::database::models::{collections, Deforestation, DeforestationType, Period};
use crate::database::reference::{resolve_field, validate_ids, IdError};
use crate::database::{Batcher, DatabaseError, FindQuery};

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error(transparent)]
    Ids(#[from] IdError),

    #[error("{0}")]
    InvalidType(String),

    #[error("One of 'analysis_ids', 'deforestation_ids' or 'type' is required")]
    Missing,
}

/// Which analyses a risk query covers. Built by [`Selector::pick`], which
/// applies the priority analysis ids > deforestation ids > type.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Analyses(Vec<ObjectId>),
    Deforestations(Vec<ObjectId>),
    Type(DeforestationType),
}

impl Selector {
    /// Choose the most specific selector supplied. Less specific ones are
    /// ignored entirely, including their validation.
    pub fn pick(
        analysis_ids: Option<&[String]>,
        deforestation_ids: Option<&[String]>,
        kind: Option<&str>,
        max_ids: usize,
    ) -> Result<Self, SelectorError> {
        if let Some(ids) = analysis_ids.filter(|ids| !ids.is_empty()) {
            return Ok(Selector::Analyses(validate_ids(ids, "analysis_ids", max_ids, false)?));
        }
        if let Some(ids) = deforestation_ids.filter(|ids| !ids.is_empty()) {
            return Ok(Selector::Deforestations(validate_ids(ids, "deforestation_ids", max_ids, false)?));
        }
        match kind.map(str::trim).filter(|k| !k.is_empty()) {
            Some(kind) => kind
                .parse::<DeforestationType>()
                .map(Selector::Type)
                .map_err(SelectorError::InvalidType),
            None => Err(SelectorError::Missing),
        }
    }
}

/// Output of [`resolve_periods`].
///
/// `deforestations` and `analysis_to_deforestation` are both empty when the
/// selector matched no deforestation; callers short-circuit on
/// [`is_empty`](Self::is_empty).
#[derive(Debug, Default)]
pub struct ResolvedPeriods {
    pub deforestations: HashMap<ObjectId, Deforestation>,
    pub analysis_to_deforestation: HashMap<ObjectId, ObjectId>,
    order: Vec<ObjectId>,
    analyses: Vec<ObjectId>,
    linked: Vec<ObjectId>,
}

impl ResolvedPeriods {
    pub fn is_empty(&self) -> bool {
        self.deforestations.is_empty()
    }

    /// Deforestation ids in resolution order.
    pub fn deforestation_order(&self) -> &[ObjectId] {
        &self.order
    }

    /// Every analysis that exists, linked to a resolved deforestation or not.
    pub fn found_analyses(&self) -> &[ObjectId] {
        &self.analyses
    }

    /// Analyses whose deforestation resolved.
    pub fn analysis_ids(&self) -> &[ObjectId] {
        &self.linked
    }

    pub fn deforestation_of(&self, analysis: ObjectId) -> Option<ObjectId> {
        self.analysis_to_deforestation.get(&analysis).copied()
    }

    pub fn period(&self, deforestation: ObjectId) -> Period {
        self.deforestations
            .get(&deforestation)
            .map(|d| d.period)
            .unwrap_or_default()
    }

    pub fn period_of_analysis(&self, analysis: ObjectId) -> Period {
        self.deforestation_of(analysis)
            .map(|d| self.period(d))
            .unwrap_or_default()
    }

    pub fn analyses_of(&self, deforestation: ObjectId) -> Vec<ObjectId> {
        self.linked
            .iter()
            .copied()
            .filter(|a| self.analysis_to_deforestation.get(a) == Some(&deforestation))
            .collect()
    }

    fn build(
        analyses: Vec<(ObjectId, Option<ObjectId>)>,
        deforestations: Vec<Deforestation>,
    ) -> Self {
        let mut out = Self {
            analyses: analyses.iter().map(|(a, _)| *a).collect(),
            ..Default::default()
        };
        for defo in deforestations {
            if !out.deforestations.contains_key(&defo.id) {
                out.order.push(defo.id);
                out.deforestations.insert(defo.id, defo);
            }
        }
        if out.deforestations.is_empty() {
            return out;
        }
        for (analysis, defo) in analyses {
            if let Some(defo) = defo.filter(|d| out.deforestations.contains_key(d)) {
                out.analysis_to_deforestation.insert(analysis, defo);
                out.linked.push(analysis);
            }
        }
        out
    }
}

pub async fn resolve_periods(batcher: &Batcher<'_>, selector: &Selector) -> Result<ResolvedPeriods, DatabaseError> {
    let resolved = match selector {
        Selector::Analyses(ids) => {
            let docs = batcher
                .fetch(collections::ANALYSIS, ids, &["deforestation_id"])
                .await?;
            let analyses: Vec<(ObjectId, Option<ObjectId>)> = ids
                .iter()
                .filter_map(|id| docs.get(id).map(|d| (*id, resolve_field(d, "deforestation_id"))))
                .collect();

            let mut seen = HashSet::new();
            let defo_ids: Vec<ObjectId> = analyses
                .iter()
                .filter_map(|(_, d)| *d)
                .filter(|d| seen.insert(*d))
                .collect();
            let deforestations = fetch_deforestations(batcher, &defo_ids).await?;
            ResolvedPeriods::build(analyses, deforestations)
        }
        Selector::Deforestations(ids) => {
            let deforestations = fetch_deforestations(batcher, ids).await?;
            let found: Vec<ObjectId> = deforestations.iter().map(|d| d.id).collect();
            let analyses = analyses_of(batcher, &found).await?;
            ResolvedPeriods::build(analyses, deforestations)
        }
        Selector::Type(kind) => {
            let query = FindQuery::new(doc! { "deforestation_type": kind.as_str() })
                .project(&Deforestation::FIELDS)
                .sort(doc! { "_id": 1 });
            let deforestations: Vec<Deforestation> = batcher
                .store()
                .find(collections::DEFORESTATION, query)
                .await?
                .iter()
                .filter_map(Deforestation::from_document)
                .collect();
            let found: Vec<ObjectId> = deforestations.iter().map(|d| d.id).collect();
            let analyses = analyses_of(batcher, &found).await?;
            ResolvedPeriods::build(analyses, deforestations)
        }
    };

    debug!(
        deforestations = resolved.deforestations.len(),
        analyses = resolved.linked.len(),
        "resolved periods"
    );
    Ok(resolved)
}

/// Deforestations in the order of `ids`, skipping unknown ones.
async fn fetch_deforestations(batcher: &Batcher<'_>, ids: &[ObjectId]) -> Result<Vec<Deforestation>, DatabaseError> {
    let docs = batcher
        .fetch(collections::DEFORESTATION, ids, &Deforestation::FIELDS)
        .await?;
    Ok(ids
        .iter()
        .filter_map(|id| docs.get(id))
        .filter_map(Deforestation::from_document)
        .collect())
}

async fn analyses_of(
    batcher: &Batcher<'_>,
    deforestation_ids: &[ObjectId],
) -> Result<Vec<(ObjectId, Option<ObjectId>)>, DatabaseError> {
    let docs = batcher
        .fetch_by(collections::ANALYSIS, "deforestation_id", deforestation_ids, &["deforestation_id"])
        .await?;
    Ok(docs
        .iter()
        .filter_map(|d| Some((resolve_field(d, "_id")?, resolve_field(d, "deforestation_id"))))
        .collect())
}
