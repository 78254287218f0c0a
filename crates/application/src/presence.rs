//! 在线状态计算
//!
//! 快照不做存储，每次都从调度器当前持有的连接集合重新计算。

use std::collections::HashMap;

use domain::{Group, User, UserId};

use crate::connection::{ChatTarget, ConnectionInfo};
use crate::protocol::{GroupStatus, PresenceStatus};

/// 按用户聚合的在线连接视图
#[derive(Debug, Default)]
pub struct PresenceIndex {
    targets: HashMap<UserId, Vec<ChatTarget>>,
}

impl PresenceIndex {
    pub fn from_connections<'a>(connections: impl IntoIterator<Item = &'a ConnectionInfo>) -> Self {
        let mut targets: HashMap<UserId, Vec<ChatTarget>> = HashMap::new();
        for connection in connections {
            targets
                .entry(connection.user_id)
                .or_default()
                .push(connection.target);
        }
        Self { targets }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.targets.contains_key(&user_id)
    }

    pub fn is_viewing(&self, user_id: UserId, target: ChatTarget) -> bool {
        self.targets
            .get(&user_id)
            .is_some_and(|targets| targets.contains(&target))
    }

    /// 小组成员快照。重复出现的成员只保留一次，三个列表都按用户 id 升序。
    pub fn group_status(&self, group: &Group, mut members: Vec<User>) -> GroupStatus {
        members.sort_by_key(|user| user.id);
        members.dedup_by_key(|user| user.id);

        let here = ChatTarget::Group(group.id);
        let mut in_chat = Vec::new();
        let mut online = Vec::new();
        let mut offline = Vec::new();
        for member in members {
            if self.is_viewing(member.id, here) {
                in_chat.push(member);
            } else if self.is_online(member.id) {
                online.push(member);
            } else {
                offline.push(member);
            }
        }

        GroupStatus {
            group_id: group.id,
            group_name: group.group_name.clone(),
            sorted_in_chat_members: in_chat,
            sorted_online_members: online,
            sorted_offline_members: offline,
        }
    }

    /// `subject` 在 `viewer` 眼中的状态：正在与 viewer 私聊为 In Chat
    pub fn peer_status(&self, subject: UserId, viewer: UserId) -> PresenceStatus {
        if self.is_viewing(subject, ChatTarget::Direct(viewer)) {
            PresenceStatus::InChat
        } else if self.is_online(subject) {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }
}
