use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use application::{ChatTarget, ConnectionInfo};
use domain::{GroupId, UserId};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/group/{group_id}", get(group_chat_upgrade))
        .route("/ws/user/{user_id}", get(direct_chat_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 进入小组聊天，要求调用者是小组成员
async fn group_chat_upgrade(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    check_origin(&state, &headers)?;
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let group_id = GroupId::from(group_id);

    if state.gateway.get_group(group_id).await?.is_none() {
        return Err(ApiError::not_found("group not found"));
    }
    if !state.gateway.is_user_in_group(user_id, group_id).await? {
        tracing::info!(user_id = %user_id, group_id = %group_id, "拒绝非成员进入小组聊天");
        return Err(ApiError::forbidden("not a member of this group"));
    }

    let info = ConnectionInfo::new(user_id, ChatTarget::Group(group_id));
    Ok(upgrade(ws, state, info))
}

/// 进入与另一位用户的私聊
async fn direct_chat_upgrade(
    State(state): State<AppState>,
    Path(peer_id): Path<i64>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    check_origin(&state, &headers)?;
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let peer_id = UserId::from(peer_id);

    if peer_id == user_id {
        return Err(ApiError::bad_request("cannot open a direct chat with yourself"));
    }
    if state.gateway.get_user(peer_id).await?.is_none() {
        return Err(ApiError::not_found("user not found"));
    }

    let info = ConnectionInfo::new(user_id, ChatTarget::Direct(peer_id));
    Ok(upgrade(ws, state, info))
}

fn check_origin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    // 非浏览器客户端不带 Origin
    let Some(origin) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let origin = origin
        .to_str()
        .map_err(|_| ApiError::forbidden("invalid origin"))?;
    if state.is_origin_allowed(origin) {
        Ok(())
    } else {
        tracing::warn!(origin, "拒绝来自未授权 Origin 的 WebSocket 连接");
        Err(ApiError::forbidden("origin not allowed"))
    }
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, info: ConnectionInfo) -> Response {
    ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(socket, state.hub, info).run().await;
    })
}
