//! 用户 API 处理器

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::{
    dto::{LoginRequest, RegisterRequest},
    error::Result,
    models::User,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: User,
}

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserEnvelope>)> {
    let user = state.users.register(req.into()).await?;
    Ok((StatusCode::CREATED, Json(UserEnvelope { user })))
}

/// POST /api/login
///
/// 只校验凭证，不签发会话令牌。
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserEnvelope>> {
    let user = state.users.login(&req.email, &req.password).await?;
    Ok(Json(UserEnvelope { user }))
}

/// GET /api/user/{id}
pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<User>> {
    Ok(Json(state.users.get_user(id).await?))
}
