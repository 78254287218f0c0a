use async_trait::async_trait;
use domain::{ChatMessage, Group, GroupId, RepositoryError, User, UserId};

/// 聊天调度器依赖的持久化接口。
///
/// 消息必须先经 `add_message` 落库才会被广播；其余方法用于解析显示名称和小组成员关系。
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn add_message(&self, message: &ChatMessage) -> Result<(), RepositoryError>;

    async fn get_all_users_of_group(&self, group_id: GroupId)
        -> Result<Vec<User>, RepositoryError>;

    async fn get_all_groups_of_user(&self, user_id: UserId)
        -> Result<Vec<Group>, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, RepositoryError>;

    // 建立 WebSocket 连接前的成员校验
    async fn is_user_in_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<bool, RepositoryError>;
}
