//! 应用层实现。
//!
//! 实时聊天的核心：调度器（Hub）持有全部在线连接，负责在线状态计算与消息扇出；
//! 持久化通过 `PersistenceGateway` 抽象交给基础设施层。

pub mod clock;
pub mod connection;
pub mod error;
pub mod hub;
pub mod memory;
pub mod presence;
pub mod protocol;
pub mod repository;

pub use clock::{Clock, FixedClock, SystemClock};
pub use connection::{
    outbound_queue, ChatTarget, ConnectionInfo, InboundEvent, OutboundReceiver, OutboundSender,
    Registration,
};
pub use error::ApplicationError;
pub use hub::{Hub, HubHandle};
pub use presence::PresenceIndex;
pub use protocol::{
    ClientFrame, GroupStatus, MessagePayload, PresenceStatus, ServerPayload, StatusPayload,
    UserStatus,
};
pub use repository::PersistenceGateway;
