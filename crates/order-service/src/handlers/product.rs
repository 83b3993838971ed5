//! 商品目录 API 处理器

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{dto::CreateProductRequest, error::Result, models::Product, state::AppState};

/// GET /api/products
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_products().await?))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog.get_product(id).await?))
}

/// POST /api/products
pub async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    let (product, acting_user_id) = req.into_parts();
    let created = state.catalog.create_product(product, acting_user_id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
