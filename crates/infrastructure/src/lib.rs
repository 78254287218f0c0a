//! 基础设施层实现。
//!
//! 提供基于 Postgres 的持久化适配器，实现应用层定义的 `PersistenceGateway`。

pub mod migrations;
pub mod repository;

pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgPersistenceGateway};
