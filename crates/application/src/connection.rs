use std::sync::Arc;

use domain::{ConnectionId, GroupId, UserId};
use tokio::sync::mpsc;

use crate::protocol::{ClientFrame, ServerPayload};

pub type OutboundSender = mpsc::Sender<Arc<ServerPayload>>;
pub type OutboundReceiver = mpsc::Receiver<Arc<ServerPayload>>;

/// 连接正在查看的会话：某个小组，或与某位用户的私聊
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    Group(GroupId),
    Direct(UserId),
}

/// 一个已建立的 WebSocket 连接的身份与目标，生命周期内不变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub target: ChatTarget,
}

impl ConnectionInfo {
    pub fn new(user_id: UserId, target: ChatTarget) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            target,
        }
    }

    pub fn is_viewing_group(&self, group_id: GroupId) -> bool {
        self.target == ChatTarget::Group(group_id)
    }

    pub fn is_viewing_direct_with(&self, peer: UserId) -> bool {
        self.target == ChatTarget::Direct(peer)
    }

    /// `other` 是否在看与本连接相同的会话。
    ///
    /// 小组会话按小组 id 比较；私聊会话只匹配对方那一端正在看与本用户私聊的连接。
    pub fn shares_conversation_with(&self, other: &ConnectionInfo) -> bool {
        match self.target {
            ChatTarget::Group(group_id) => other.is_viewing_group(group_id),
            ChatTarget::Direct(peer) => {
                other.user_id == peer && other.is_viewing_direct_with(self.user_id)
            }
        }
    }
}

/// 注册请求：连接信息加上该连接的待发送队列写端
#[derive(Debug)]
pub struct Registration {
    pub info: ConnectionInfo,
    pub outbound: OutboundSender,
}

/// 读循环解码出的一帧，附带来源连接
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub connection: ConnectionInfo,
    pub frame: ClientFrame,
}

pub fn outbound_queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_conversation_includes_own_tabs() {
        let a = ConnectionInfo::new(UserId(1), ChatTarget::Group(GroupId(9)));
        let a2 = ConnectionInfo::new(UserId(1), ChatTarget::Group(GroupId(9)));
        let other = ConnectionInfo::new(UserId(2), ChatTarget::Group(GroupId(8)));

        assert!(a.shares_conversation_with(&a2));
        assert!(!a.shares_conversation_with(&other));
    }

    #[test]
    fn direct_conversation_matches_peer_side_only() {
        let a_to_b = ConnectionInfo::new(UserId(1), ChatTarget::Direct(UserId(2)));
        let b_to_a = ConnectionInfo::new(UserId(2), ChatTarget::Direct(UserId(1)));
        let b_to_c = ConnectionInfo::new(UserId(2), ChatTarget::Direct(UserId(3)));

        assert!(a_to_b.shares_conversation_with(&b_to_a));
        assert!(b_to_a.shares_conversation_with(&a_to_b));
        assert!(!a_to_b.shares_conversation_with(&b_to_c));
    }
}
