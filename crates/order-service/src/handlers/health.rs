use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /health
///
/// 进程存活即返回 ok，附带消息队列连接状态。
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "bakery-api",
        "broker": state.gateway.state().as_str(),
    }))
}
