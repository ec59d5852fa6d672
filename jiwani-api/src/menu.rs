use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;

use jiwani_catalog::{validate_menu_item, validate_price};
use jiwani_core::menu::{Category, MenuFilter, MenuItem, NewMenuItem};
use jiwani_core::order::DiningTable;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MenuQuery {
    pub category: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PriceUpdate {
    pub price: i64,
}

#[derive(Debug, Deserialize)]
pub struct ActiveUpdate {
    pub is_active: bool,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/tables", get(list_tables))
        .route("/menu", get(list_menu))
        .route("/menu/{id}", get(get_menu_item))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/menu", post(create_menu_item))
        .route("/menu/{id}", put(update_menu_item))
        .route("/menu/{id}", delete(delete_menu_item))
        .route("/menu/{id}/price", patch(update_price))
        .route("/menu/{id}/active", patch(update_active))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.menu_repo.list_categories().await?))
}

/// GET /api/tables
async fn list_tables(State(state): State<AppState>) -> Result<Json<Vec<DiningTable>>, AppError> {
    Ok(Json(state.order_repo.list_tables().await?))
}

/// GET /api/menu?category=&active=
async fn list_menu(
    State(state): State<AppState>,
    Query(query): Query<MenuQuery>,
) -> Result<Json<Vec<MenuItem>>, AppError> {
    let filter = MenuFilter { category_id: query.category, is_active: query.active };
    Ok(Json(state.menu_repo.list_items(&filter).await?))
}

/// GET /api/menu/{id}
async fn get_menu_item(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<MenuItem>, AppError> {
    state
        .menu_repo
        .get_item(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("menu item {}", id)))
}

/// POST /api/menu
async fn create_menu_item(
    State(state): State<AppState>,
    Json(mut item): Json<NewMenuItem>,
) -> Result<(StatusCode, Json<MenuItem>), AppError> {
    item.name = item.name.trim().to_string();
    validate_menu_item(&item)?;
    let created = state.menu_repo.create_item(&item).await?;
    tracing::info!("Menu item {} created", created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/menu/{id}
async fn update_menu_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut item): Json<NewMenuItem>,
) -> Result<Json<MenuItem>, AppError> {
    item.name = item.name.trim().to_string();
    validate_menu_item(&item)?;
    Ok(Json(state.menu_repo.update_item(id, &item).await?))
}

/// PATCH /api/menu/{id}/price
async fn update_price(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<PriceUpdate>,
) -> Result<Json<MenuItem>, AppError> {
    validate_price(req.price)?;
    let item = state.menu_repo.set_price(id, req.price).await?;
    tracing::info!("Menu item {} repriced to {}", id, req.price);
    Ok(Json(item))
}

/// PATCH /api/menu/{id}/active
async fn update_active(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ActiveUpdate>,
) -> Result<Json<MenuItem>, AppError> {
    Ok(Json(state.menu_repo.set_active(id, req.is_active).await?))
}

/// DELETE /api/menu/{id}
async fn delete_menu_item(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, AppError> {
    state.menu_repo.delete_item(id).await?;
    tracing::info!("Menu item {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}
