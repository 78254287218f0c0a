use async_trait::async_trait;

use application::PersistenceGateway;
use domain::{ChatMessage, Group, GroupId, RepositoryError, User, UserId};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage_with_source("database query failed", err)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    first_name: String,
    last_name: String,
    gender: String,
    faculty: String,
    email: String,
    user_role: String,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        User {
            id: UserId::from(value.id),
            first_name: value.first_name,
            last_name: value.last_name,
            gender: value.gender,
            faculty: value.faculty,
            email: value.email,
            user_role: value.user_role,
        }
    }
}

#[derive(Debug, FromRow)]
struct GroupRecord {
    id: i64,
    group_name: String,
    group_description: String,
    category: String,
    owner_id: i64,
}

impl From<GroupRecord> for Group {
    fn from(value: GroupRecord) -> Self {
        Group {
            id: GroupId::from(value.id),
            group_name: value.group_name,
            group_description: value.group_description,
            category: value.category,
            owner_id: UserId::from(value.owner_id),
        }
    }
}

/// Postgres 实现的聊天持久化
#[derive(Clone)]
pub struct PgPersistenceGateway {
    pool: PgPool,
}

impl PgPersistenceGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PgPersistenceGateway {
    async fn add_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        match message {
            ChatMessage::Group(message) => {
                sqlx::query(
                    r#"
                    INSERT INTO wn_message (user_id, group_id, time_added, msg)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(i64::from(message.user_id))
                .bind(i64::from(message.group_id))
                .bind(message.time_added)
                .bind(message.msg.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            }
            ChatMessage::Direct(message) => {
                sqlx::query(
                    r#"
                    INSERT INTO wn_direct (sender_id, recipient_id, time_added, msg)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(i64::from(message.sender_id))
                .bind(i64::from(message.recipient_id))
                .bind(message.time_added)
                .bind(message.msg.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            }
        }
        Ok(())
    }

    async fn get_all_users_of_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<User>, RepositoryError> {
        let records = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT wn_user.id, wn_user.first_name, wn_user.last_name, wn_user.gender,
                   wn_user.faculty, wn_user.email, wn_user.user_role
            FROM wn_user_group
            JOIN wn_user ON wn_user_group.user_id = wn_user.id
            WHERE wn_user_group.group_id = $1
            ORDER BY wn_user.id
            "#,
        )
        .bind(i64::from(group_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(User::from).collect())
    }

    async fn get_all_groups_of_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Group>, RepositoryError> {
        let records = sqlx::query_as::<_, GroupRecord>(
            r#"
            SELECT wn_group.id, wn_group.group_name, wn_group.group_description,
                   wn_group.category, wn_group.owner_id
            FROM wn_user_group
            JOIN wn_group ON wn_user_group.group_id = wn_group.id
            WHERE wn_user_group.user_id = $1
            ORDER BY wn_group.id
            "#,
        )
        .bind(i64::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Group::from).collect())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, first_name, last_name, gender, faculty, email, user_role
            FROM wn_user
            WHERE id = $1
            "#,
        )
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(User::from))
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, RepositoryError> {
        let record = sqlx::query_as::<_, GroupRecord>(
            r#"
            SELECT id, group_name, group_description, category, owner_id
            FROM wn_group
            WHERE id = $1
            "#,
        )
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Group::from))
    }

    async fn is_user_in_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<bool, RepositoryError> {
        let is_member: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM wn_user_group WHERE user_id = $1 AND group_id = $2
            )
            "#,
        )
        .bind(i64::from(user_id))
        .bind(i64::from(group_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(is_member)
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    tracing::info!(max_connections, "连接 Postgres");
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
