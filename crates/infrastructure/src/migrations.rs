use sqlx::migrate::Migrator;

/// 仓库根目录 `migrations/` 下的全部迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
