//! 聊天消息
//!
//! 小组消息与私聊消息共享同一套正文规则，持久化之后即不再变化。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{GroupId, Timestamp, UserId};

/// 经过规范化的消息正文。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageBody(String);

impl MessageBody {
    /// 换行替换为空格并去掉首尾空白，结果为空时拒绝。
    pub fn normalize(raw: &str) -> Result<Self, DomainError> {
        let body = raw.replace('\n', " ").trim().to_owned();
        if body.is_empty() {
            return Err(DomainError::EmptyMessage);
        }
        Ok(Self(body))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub time_added: Timestamp,
    pub msg: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub time_added: Timestamp,
    pub msg: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Group(GroupMessage),
    Direct(DirectMessage),
}
