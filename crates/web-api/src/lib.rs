//! Web API 层。
//!
//! 提供 Axum 路由：健康检查，以及小组聊天与私聊的 WebSocket 入口。
//! 升级前完成 Origin、会话与成员关系校验，之后的连接交给调度器管理。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
