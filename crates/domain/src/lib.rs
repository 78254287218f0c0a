//! 聊天核心领域模型
//!
//! 包含用户、互助小组、聊天消息等实体，以及它们的值对象和错误类型。

pub mod errors;
pub mod group;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use group::Group;
pub use message::{ChatMessage, DirectMessage, GroupMessage, MessageBody};
pub use user::User;
pub use value_objects::*;
