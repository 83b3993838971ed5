//! 购物车 API 处理器

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    dto::{AddToCartRequest, UpdateCartItemRequest},
    error::Result,
    models::CartLine,
    state::AppState,
};

/// POST /api/cart
pub async fn add_to_cart(
    State(state): State<AppState>,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartLine>> {
    let line = state
        .carts
        .add_to_cart(req.user_id, req.product_id, req.quantity)
        .await?;
    Ok(Json(line))
}

/// GET /api/cart/{userId}
pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<CartLine>>> {
    Ok(Json(state.carts.get_cart(user_id).await?))
}

/// PUT /api/cart/{userId}/{productId}
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateCartItemRequest>,
) -> Result<Json<CartLine>> {
    let line = state
        .carts
        .update_cart_item(user_id, product_id, req.quantity)
        .await?;
    Ok(Json(line))
}

/// DELETE /api/cart/{userId}/{productId}
pub async fn remove_from_cart(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    state.carts.remove_from_cart(user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
