//! WebSocket 载荷协议
//!
//! 所有帧都是带 `tag` 字段的 JSON。客户端只能发送 `MESSAGE`；
//! `CHAT_STATUS` 以及任何未知标签在解码阶段即被拒绝。

use domain::{DirectMessage, GroupId, GroupMessage, User};
use serde::{Deserialize, Serialize};

/// 客户端发来的帧
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "tag")]
pub enum ClientFrame {
    #[serde(rename = "MESSAGE")]
    Message { data: String },
}

impl ClientFrame {
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

/// 服务端推送给客户端的帧
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag")]
pub enum ServerPayload {
    #[serde(rename = "MESSAGE")]
    Message(MessagePayload),
    #[serde(rename = "CHAT_STATUS")]
    ChatStatus(StatusPayload),
}

impl ServerPayload {
    /// 系统提示，例如某人加入或离开了聊天
    pub fn server(msg: impl Into<String>) -> Self {
        ServerPayload::Message(MessagePayload::Server { msg: msg.into() })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "label")]
pub enum MessagePayload {
    #[serde(rename = "GROUP")]
    Group {
        sender_name: String,
        group_name: String,
        message: GroupMessage,
    },
    #[serde(rename = "DIRECT")]
    Direct {
        sender_name: String,
        recipient_name: String,
        message: DirectMessage,
    },
    #[serde(rename = "SERVER")]
    Server { msg: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "label")]
pub enum StatusPayload {
    #[serde(rename = "GROUP")]
    Group(GroupStatus),
    #[serde(rename = "USER")]
    User(UserStatus),
}

/// 小组成员在线快照，三个列表互不相交且按用户 id 升序
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStatus {
    pub group_id: GroupId,
    pub group_name: String,
    pub sorted_in_chat_members: Vec<User>,
    pub sorted_online_members: Vec<User>,
    pub sorted_offline_members: Vec<User>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatus {
    pub user: User,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PresenceStatus {
    #[serde(rename = "In Chat")]
    InChat,
    #[serde(rename = "Online")]
    Online,
    #[serde(rename = "Offline")]
    Offline,
}
