//! HTTP routes and handlers.
//!
//! `POST /sync` and `GET /sync/initial` form the protocol surface. The
//! remaining routes are a read-only debug/listing surface; normal clients
//! go through `/sync` for all mutations.

use crate::auth::TokenAuthority;
use crate::config::ServerConfig;
use crate::error::ServerError;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tidelist_core::{EntityId, OwnerId, SyncStore};
use tidelist_sync_engine::SyncOrchestrator;
use tidelist_sync_protocol::{InitialLoadResponse, SyncRequest, SyncResponse};

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The sync orchestrator (owns the store).
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Token authority for request authentication.
    pub auth: Arc<TokenAuthority>,
}

impl AppState {
    /// Creates fresh state from a server configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_store(config, Arc::new(SyncStore::new()))
    }

    /// Creates state over an existing store.
    pub fn with_store(config: &ServerConfig, store: Arc<SyncStore>) -> Self {
        Self {
            orchestrator: Arc::new(SyncOrchestrator::new(store, config.engine.clone())),
            auth: Arc::new(TokenAuthority::new(config.auth())),
        }
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<OwnerId, ServerError> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        self.auth.authenticate(authorization)
    }
}

/// Builds the router for the sync server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync", post(sync))
        .route("/sync/initial", get(initial_load))
        .route("/spaces", get(list_spaces))
        .route("/spaces/:id", get(get_space))
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
        .route("/items", get(list_items))
        .route("/items/:id", get(get_item))
        .route("/debug/stats", get(stats))
        .with_state(state)
}

async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let response = state.orchestrator.sync(&owner, &request)?;
    Ok(Json(response))
}

async fn initial_load(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InitialLoadResponse>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let response = state.orchestrator.initial_load(&owner)?;
    Ok(Json(response))
}

async fn list_spaces(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let mut spaces = state.orchestrator.store().spaces().live(&owner)?;
    spaces.sort_by_key(|s| s.order);
    Ok(Json(json!({
        "success": true,
        "count": spaces.len(),
        "data": spaces,
    })))
}

async fn get_space(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let space = state
        .orchestrator
        .store()
        .spaces()
        .get(&owner, &EntityId::new(id))?
        .ok_or_else(|| ServerError::NotFound("space".into()))?;
    Ok(Json(json!({ "success": true, "data": space })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CategoryFilter {
    space_id: Option<String>,
}

async fn list_categories(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<CategoryFilter>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let mut categories = state.orchestrator.store().categories().live(&owner)?;
    if let Some(space_id) = filter.space_id.map(EntityId::new) {
        categories.retain(|c| c.space_id.as_ref() == Some(&space_id));
    }
    categories.sort_by_key(|c| c.order);
    Ok(Json(json!({
        "success": true,
        "count": categories.len(),
        "data": categories,
    })))
}

async fn get_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let category = state
        .orchestrator
        .store()
        .categories()
        .get(&owner, &EntityId::new(id))?
        .ok_or_else(|| ServerError::NotFound("category".into()))?;
    Ok(Json(json!({ "success": true, "data": category })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ItemFilter {
    space_id: Option<String>,
    category_id: Option<String>,
    is_completed: Option<bool>,
}

async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<ItemFilter>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let mut items = state.orchestrator.store().items().live(&owner)?;
    if let Some(space_id) = filter.space_id.map(EntityId::new) {
        items.retain(|i| i.space_id.as_ref() == Some(&space_id));
    }
    if let Some(category_id) = filter.category_id.map(EntityId::new) {
        items.retain(|i| i.category_id.as_ref() == Some(&category_id));
    }
    if let Some(is_completed) = filter.is_completed {
        items.retain(|i| i.is_completed == is_completed);
    }
    items.sort_by_key(|i| i.order);
    Ok(Json(json!({
        "success": true,
        "count": items.len(),
        "data": items,
    })))
}

async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let item = state
        .orchestrator
        .store()
        .items()
        .get(&owner, &EntityId::new(id))?
        .ok_or_else(|| ServerError::NotFound("item".into()))?;
    Ok(Json(json!({ "success": true, "data": item })))
}

async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServerError> {
    let owner = state.authenticate(&headers)?;
    let store = state.orchestrator.store();

    let (total_spaces, active_spaces) = store.spaces().counts(&owner)?;
    let (total_categories, active_categories) = store.categories().counts(&owner)?;
    let (total_items, active_items) = store.items().counts(&owner)?;
    let completed_items = store
        .items()
        .live(&owner)?
        .iter()
        .filter(|i| i.is_completed)
        .count();

    Ok(Json(json!({
        "success": true,
        "data": {
            "spaces": {
                "total": total_spaces,
                "active": active_spaces,
                "deleted": total_spaces - active_spaces,
            },
            "categories": {
                "total": total_categories,
                "active": active_categories,
                "deleted": total_categories - active_categories,
            },
            "items": {
                "total": total_items,
                "active": active_items,
                "deleted": total_items - active_items,
                "completed": completed_items,
                "pending": active_items - completed_items,
            },
        },
    })))
}
