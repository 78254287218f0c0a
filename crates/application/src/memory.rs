//! 进程内持久化实现，供测试与本地开发使用

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::{ChatMessage, Group, GroupId, RepositoryError, User, UserId};
use tokio::sync::RwLock;

use crate::repository::PersistenceGateway;

#[derive(Default)]
pub struct MemoryPersistenceGateway {
    users: RwLock<HashMap<UserId, User>>,
    groups: RwLock<HashMap<GroupId, Group>>,
    memberships: RwLock<HashMap<GroupId, BTreeSet<UserId>>>,
    messages: RwLock<Vec<ChatMessage>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    failing_groups: RwLock<HashSet<GroupId>>,
    latency: RwLock<Option<Duration>>,
}

impl MemoryPersistenceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn insert_group(&self, group: Group) {
        self.groups.write().await.insert(group.id, group);
    }

    pub async fn add_member(&self, group_id: GroupId, user_id: UserId) {
        self.memberships
            .write()
            .await
            .entry(group_id)
            .or_default()
            .insert(user_id);
    }

    /// 已成功写入的消息，按写入顺序
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    /// 之后的 `add_message` 全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 之后的查询全部失败
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 之后查询该小组成员时失败
    pub async fn fail_member_reads_of(&self, group_id: GroupId) {
        self.failing_groups.write().await.insert(group_id);
    }

    /// 每次调用前额外等待
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    async fn simulate(&self, failing: &AtomicBool) -> Result<(), RepositoryError> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("injected storage failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryPersistenceGateway {
    async fn add_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        self.simulate(&self.fail_writes).await?;
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn get_all_users_of_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<User>, RepositoryError> {
        self.simulate(&self.fail_reads).await?;
        if self.failing_groups.read().await.contains(&group_id) {
            return Err(RepositoryError::storage("injected storage failure"));
        }
        let memberships = self.memberships.read().await;
        let users = self.users.read().await;
        Ok(memberships
            .get(&group_id)
            .into_iter()
            .flatten()
            .filter_map(|id| users.get(id).cloned())
            .collect())
    }

    async fn get_all_groups_of_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Group>, RepositoryError> {
        self.simulate(&self.fail_reads).await?;
        let memberships = self.memberships.read().await;
        let groups = self.groups.read().await;
        let mut found: Vec<Group> = memberships
            .iter()
            .filter(|(_, members)| members.contains(&user_id))
            .filter_map(|(group_id, _)| groups.get(group_id).cloned())
            .collect();
        found.sort_by_key(|group| group.id);
        Ok(found)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.simulate(&self.fail_reads).await?;
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, RepositoryError> {
        self.simulate(&self.fail_reads).await?;
        Ok(self.groups.read().await.get(&id).cloned())
    }

    async fn is_user_in_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<bool, RepositoryError> {
        self.simulate(&self.fail_reads).await?;
        Ok(self
            .memberships
            .read()
            .await
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id)))
    }
}
