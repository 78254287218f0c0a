use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub faculty: String,
    #[serde(skip_serializing)] // 邮箱不推送给其他客户端
    pub email: String,
    pub user_role: String,
}

impl User {
    /// 聊天界面里展示的名字
    pub fn display_name(&self) -> &str {
        &self.first_name
    }
}
