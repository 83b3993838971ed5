//! 订单 API 处理器

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    dto::PlaceOrderRequest,
    error::{OrderError, Result},
    models::Order,
    state::AppState,
};

/// POST /api/orders
///
/// 订单落库后立即返回，后续状态由订单工作者异步推进。
pub async fn place_order(
    State(state): State<AppState>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.orders.place_order(req.user_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Order>> {
    state
        .orders
        .get_order_status(id)
        .await?
        .map(Json)
        .ok_or(OrderError::OrderNotFound(id))
}
