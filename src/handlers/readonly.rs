//! Declarative read-only endpoint sets. Each [`CollectionSpec`] expands into
//! `GET /{name}/`, `/{name}/by-ids` and whichever optional endpoints it enables.

use axum::{
    extract::{Query, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use bson::{doc, Bson, Document};
use serde::Deserialize;
use serde_json::Value;

use crate::api::format::document_to_json;
use crate::config::QueryConfig;
use crate::database::reference::{ref_in, split_csv, validate_ids};
use crate::database::{Batcher, FindQuery};
use crate::enums::EnumDef;
use crate::error::{ApiError, ApiResult};
use crate::filter::{Filter, FilterError, FilterWhere, PageParams, Paginated};
use crate::middleware::require_admin;
use crate::state::AppState;

/// How `by-extid` searches a collection.
#[derive(Debug, Clone, Copy)]
pub enum ExtIdSearch {
    /// `ext_id` is a list of `{ext_code, <label_field>}` entries.
    Structured {
        label_field: &'static str,
        labels: &'static EnumDef,
    },
    /// `ext_id` is a scalar; partial case-insensitive match.
    Plain,
}

/// `GET /{name}/{route}?ids=..` over a reference field.
#[derive(Debug, Clone, Copy)]
pub struct ParentFilter {
    pub route: &'static str,
    pub field: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    /// Search and sort whitelist for `paged/`.
    pub fields: &'static [&'static str],
    pub by_name: bool,
    pub paged: bool,
    pub ext_id: Option<ExtIdSearch>,
    pub parents: &'static [ParentFilter],
    pub admin_only: bool,
    pub render: fn(&Document) -> Value,
}

impl CollectionSpec {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: &[],
            by_name: false,
            paged: true,
            ext_id: None,
            parents: &[],
            admin_only: false,
            render: document_to_json,
        }
    }

    fn render_all(&self, docs: &[Document]) -> Vec<Value> {
        docs.iter().map(self.render).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct IdsQuery {
    pub ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtIdQuery {
    pub ext_codes: Option<String>,
    #[serde(alias = "sources")]
    pub labels: Option<String>,
    pub ext_ids: Option<String>,
}

/// Build the router for one collection. Admin-only sets get the guard as a
/// route layer so unmatched paths still 404.
pub fn router(spec: &'static CollectionSpec, state: &AppState) -> Router<AppState> {
    let path = |suffix: &str| format!("/{}{}", spec.name, suffix);

    let mut routes = Router::new()
        .route(&path(""), get(move |State(s): State<AppState>| list_all(spec, s)))
        .route(&path("/"), get(move |State(s): State<AppState>| list_all(spec, s)))
        .route(
            &path("/by-ids"),
            get(move |State(s): State<AppState>, Query(q): Query<IdsQuery>| by_ids(spec, s, q)),
        );

    if spec.by_name {
        routes = routes.route(
            &path("/by-name"),
            get(move |State(s): State<AppState>, Query(q): Query<NameQuery>| by_name(spec, s, q)),
        );
    }
    if spec.ext_id.is_some() {
        routes = routes.route(
            &path("/by-extid"),
            get(move |State(s): State<AppState>, Query(q): Query<ExtIdQuery>| by_extid(spec, s, q)),
        );
    }
    if spec.paged {
        routes = routes.route(
            &path("/paged/"),
            get(move |State(s): State<AppState>, Query(q): Query<PageParams>| paged(spec, s, q)),
        );
    }
    for parent in spec.parents {
        let field = parent.field;
        routes = routes.route(
            &path(&format!("/{}", parent.route)),
            get(move |State(s): State<AppState>, Query(q): Query<IdsQuery>| by_parent(spec, field, s, q)),
        );
    }

    if spec.admin_only {
        routes = routes.route_layer(from_fn_with_state(state.clone(), require_admin));
    }
    routes
}

async fn find(spec: &CollectionSpec, state: &AppState, filter: Document) -> Result<Vec<Value>, ApiError> {
    let query = FindQuery::new(filter)
        .sort(doc! { "_id": 1 })
        .limit(state.config.query.list_limit);
    let docs = state.store().find(spec.name, query).await?;
    Ok(spec.render_all(&docs))
}

/// GET /{name}/ - every document, capped at the configured list limit
async fn list_all(spec: &'static CollectionSpec, state: AppState) -> ApiResult<Vec<Value>> {
    Ok(Json(find(spec, &state, Document::new()).await?))
}

/// GET /{name}/by-ids?ids=a,b,c - in request order, unknown ids skipped
async fn by_ids(spec: &'static CollectionSpec, state: AppState, query: IdsQuery) -> ApiResult<Vec<Value>> {
    let raw = split_csv(query.ids.as_deref().unwrap_or_default());
    let ids = validate_ids(&raw, "ids", state.config.query.max_ids, false)?;

    let batcher = Batcher::new(state.store(), state.config.query.batch_chunk_size);
    let found = batcher.fetch(spec.name, &ids, &[]).await?;
    Ok(Json(ids.iter().filter_map(|id| found.get(id)).map(spec.render).collect()))
}

/// GET /{name}/by-name?name=a,b - partial case-insensitive match on `name`
async fn by_name(spec: &'static CollectionSpec, state: AppState, query: NameQuery) -> ApiResult<Vec<Value>> {
    let terms = search_terms(query.name.as_deref(), "name", &state.config.query)?;
    Ok(Json(find(spec, &state, FilterWhere::search(&terms, &["name"])).await?))
}

/// Comma separated partial-match terms, truncated and capped like `paged/` search.
fn search_terms(raw: Option<&str>, param: &str, limits: &QueryConfig) -> Result<Vec<String>, FilterError> {
    let terms = FilterWhere::parse_terms(raw.unwrap_or_default(), limits.search_max_term_len);
    if terms.is_empty() {
        return Err(FilterError::MissingParameter(param.to_string()));
    }
    if terms.len() > limits.search_max_terms {
        return Err(FilterError::TooManyTerms {
            count: terms.len(),
            max: limits.search_max_terms,
        });
    }
    Ok(terms)
}

/// GET /{name}/by-extid - structured (`ext_codes`, `labels`) or plain (`ext_ids`)
async fn by_extid(spec: &'static CollectionSpec, state: AppState, query: ExtIdQuery) -> ApiResult<Vec<Value>> {
    let filter = match spec.ext_id {
        Some(ExtIdSearch::Structured { label_field, labels }) => structured_extid(&query, label_field, labels)?,
        Some(ExtIdSearch::Plain) => {
            let terms = search_terms(query.ext_ids.as_deref(), "ext_ids", &state.config.query)?;
            FilterWhere::search(&terms, &["ext_id"])
        }
        None => return Err(ApiError::not_found("Not found")),
    };
    Ok(Json(find(spec, &state, filter).await?))
}

fn structured_extid(query: &ExtIdQuery, label_field: &str, labels: &EnumDef) -> Result<Document, FilterError> {
    let codes = split_csv(query.ext_codes.as_deref().unwrap_or_default());
    let wanted = match query.labels.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => labels.validate(&format!("{}s", label_field), raw)?,
        None => Vec::new(),
    };
    if codes.is_empty() && wanted.is_empty() {
        return Err(FilterError::MissingParameter(format!("ext_codes or {}s", label_field)));
    }

    let mut elem = Document::new();
    if !codes.is_empty() {
        elem.insert("ext_code", doc! { "$in": codes.into_iter().map(Bson::String).collect::<Vec<_>>() });
    }
    if !wanted.is_empty() {
        elem.insert(label_field, doc! { "$in": wanted.into_iter().map(Bson::String).collect::<Vec<_>>() });
    }
    Ok(doc! { "ext_id": { "$elemMatch": elem } })
}

/// GET /{name}/paged/ - page, search and sort within the whitelist
async fn paged(spec: &'static CollectionSpec, state: AppState, params: PageParams) -> ApiResult<Paginated<Value>> {
    let mut filter = Filter::new(spec.name);
    filter.assign(&params, spec.fields, &state.config.query)?;
    let page = filter.paginate(state.store()).await?;
    Ok(Json(page.map(|d| (spec.render)(&d))))
}

/// GET /{name}/by-{parent}?ids=a,b - documents referencing any of the parents
async fn by_parent(
    spec: &'static CollectionSpec,
    field: &'static str,
    state: AppState,
    query: IdsQuery,
) -> ApiResult<Vec<Value>> {
    let raw = split_csv(query.ids.as_deref().unwrap_or_default());
    let ids = validate_ids(&raw, "ids", state.config.query.max_ids, false)?;
    Ok(Json(find(spec, &state, ref_in(field, &ids)).await?))
}
