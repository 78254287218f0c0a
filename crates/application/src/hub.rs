//! 聊天调度器
//!
//! `Hub` 是在线连接集合的唯一持有者。注册、注销、入站消息三条队列由同一个控制循环
//! 依次处理，所有对连接集合的修改和广播决策都发生在这个循环里，因此不需要任何锁。
//! 向连接投递载荷一律使用非阻塞发送；队列已满的连接会被立即驱逐，
//! 并在当前事件结束前按离开处理，慢消费者不会拖住其他连接。

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use config::HubConfig;
use domain::{
    ChatMessage, ConnectionId, DirectMessage, Group, GroupId, GroupMessage, MessageBody,
    RepositoryError, User, UserId,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::connection::{
    outbound_queue, ChatTarget, ConnectionInfo, InboundEvent, OutboundReceiver, OutboundSender,
    Registration,
};
use crate::error::ApplicationError;
use crate::presence::PresenceIndex;
use crate::protocol::{ClientFrame, MessagePayload, ServerPayload, StatusPayload, UserStatus};
use crate::repository::PersistenceGateway;

/// 调度器句柄，可在各个连接任务之间克隆
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<PendingRegistration>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    outbound_capacity: usize,
}

/// 注册请求与调度器的确认
#[derive(Debug)]
struct PendingRegistration {
    registration: Registration,
    registered: oneshot::Sender<()>,
}

impl HubHandle {
    /// 为连接创建待发送队列并注册，返回队列的读端交给写循环
    pub async fn connect(&self, info: ConnectionInfo) -> Result<OutboundReceiver, ApplicationError> {
        let (outbound, receiver) = outbound_queue(self.outbound_capacity);
        self.register(Registration { info, outbound }).await?;
        Ok(receiver)
    }

    /// 等到调度器把连接放入在线集合后才返回，之后发出的注销一定排在注册之后
    pub async fn register(&self, registration: Registration) -> Result<(), ApplicationError> {
        let (registered, ack) = oneshot::channel();
        self.register_tx
            .send(PendingRegistration {
                registration,
                registered,
            })
            .await
            .map_err(|_| ApplicationError::HubClosed)?;
        ack.await.map_err(|_| ApplicationError::HubClosed)
    }

    pub async fn unregister(&self, connection_id: ConnectionId) -> Result<(), ApplicationError> {
        self.unregister_tx
            .send(connection_id)
            .await
            .map_err(|_| ApplicationError::HubClosed)
    }

    pub async fn submit(&self, event: InboundEvent) -> Result<(), ApplicationError> {
        self.inbound_tx
            .send(event)
            .await
            .map_err(|_| ApplicationError::HubClosed)
    }

    /// 通知调度器停止。仍在线的连接队列随之关闭，写循环发送 Close 后结束。
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[derive(Debug)]
enum HubEvent {
    Register(PendingRegistration),
    Unregister(ConnectionId),
    Inbound(InboundEvent),
}

struct LiveConnection {
    info: ConnectionInfo,
    outbound: OutboundSender,
}

pub struct Hub {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    gateway_timeout: Duration,
    live: HashMap<ConnectionId, LiveConnection>,
    /// 投递时被驱逐、尚未按离开处理的连接
    departed: VecDeque<ConnectionInfo>,
    register_rx: mpsc::Receiver<PendingRegistration>,
    unregister_rx: mpsc::Receiver<ConnectionId>,
    inbound_rx: mpsc::Receiver<InboundEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Hub {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        config: &HubConfig,
    ) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(config.inbound_capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(config.inbound_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let hub = Self {
            gateway,
            clock,
            gateway_timeout: config.gateway_timeout(),
            live: HashMap::new(),
            departed: VecDeque::new(),
            register_rx,
            unregister_rx,
            inbound_rx,
            shutdown_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            inbound_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            outbound_capacity: config.outbound_capacity,
        };
        (hub, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// 控制循环。收到停止信号或所有句柄都被释放后退出，剩余连接的队列随之关闭。
    pub async fn run(mut self) {
        tracing::info!("chat hub started");
        loop {
            let event = tokio::select! {
                biased;
                Ok(()) = self.shutdown_rx.changed() => break,
                Some(pending) = self.register_rx.recv() => HubEvent::Register(pending),
                Some(connection_id) = self.unregister_rx.recv() => HubEvent::Unregister(connection_id),
                Some(inbound) = self.inbound_rx.recv() => HubEvent::Inbound(inbound),
                else => break,
            };
            self.handle(event).await;
        }
        let remaining = self.live.len();
        self.live.clear();
        tracing::info!(remaining, "chat hub stopped");
    }

    async fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(pending) => self.handle_register(pending).await,
            HubEvent::Unregister(connection_id) => self.handle_unregister(connection_id).await,
            HubEvent::Inbound(inbound) => self.handle_inbound(inbound).await,
        }
        self.settle_departures().await;
    }

    async fn handle_register(&mut self, pending: PendingRegistration) {
        let PendingRegistration {
            registration: Registration { info, outbound },
            registered,
        } = pending;
        if self.live.contains_key(&info.id) {
            tracing::warn!(connection_id = %info.id, "connection registered twice, ignoring");
            let _ = registered.send(());
            return;
        }
        self.live.insert(info.id, LiveConnection { info, outbound });
        // 请求方可能已经放弃等待
        let _ = registered.send(());
        tracing::info!(
            connection_id = %info.id,
            user_id = %info.user_id,
            target = ?info.target,
            live = self.live.len(),
            "连接已注册"
        );

        self.broadcast_chat_status(info.user_id).await;
        self.announce(info, "joined").await;
    }

    async fn handle_unregister(&mut self, connection_id: ConnectionId) {
        // 移除即释放写端，写循环读完剩余载荷后结束
        let Some(connection) = self.live.remove(&connection_id) else {
            tracing::debug!(connection_id = %connection_id, "unregister for unknown connection");
            return;
        };
        self.on_departure(connection.info).await;
    }

    async fn settle_departures(&mut self) {
        while let Some(info) = self.departed.pop_front() {
            self.on_departure(info).await;
        }
    }

    async fn on_departure(&mut self, info: ConnectionInfo) {
        tracing::info!(
            connection_id = %info.id,
            user_id = %info.user_id,
            live = self.live.len(),
            "连接已注销"
        );
        self.broadcast_chat_status(info.user_id).await;
        self.announce(info, "left").await;
    }

    async fn handle_inbound(&mut self, event: InboundEvent) {
        let InboundEvent { connection, frame } = event;
        match frame {
            ClientFrame::Message { data } => self.handle_chat(connection, &data).await,
        }
    }

    async fn handle_chat(&mut self, connection: ConnectionInfo, raw: &str) {
        let msg = match MessageBody::normalize(raw) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(connection_id = %connection.id, error = %err, "dropping chat message");
                return;
            }
        };
        let time_added = self.clock.now();
        let message = match connection.target {
            ChatTarget::Group(group_id) => ChatMessage::Group(GroupMessage {
                user_id: connection.user_id,
                group_id,
                time_added,
                msg,
            }),
            ChatTarget::Direct(recipient_id) => ChatMessage::Direct(DirectMessage {
                sender_id: connection.user_id,
                recipient_id,
                time_added,
                msg,
            }),
        };

        // 未落库的消息绝不广播
        if let Err(err) = self.call(self.gateway.add_message(&message)).await {
            tracing::warn!(
                user_id = %connection.user_id,
                target = ?connection.target,
                error = %err,
                "failed to persist chat message, dropping it"
            );
            return;
        }

        let (payload, recipients) = match self.render(message).await {
            Ok(rendered) => rendered,
            Err(err) => {
                tracing::warn!(
                    user_id = %connection.user_id,
                    error = %err,
                    "failed to render chat message, dropping it"
                );
                return;
            }
        };
        tracing::debug!(
            user_id = %connection.user_id,
            recipients = recipients.len(),
            "broadcasting chat message"
        );
        self.deliver(payload, |c| recipients.contains(&c.user_id));
    }

    /// 生成显示载荷并确定接收用户：小组为全部成员，私聊为双方
    async fn render(
        &self,
        message: ChatMessage,
    ) -> Result<(ServerPayload, HashSet<UserId>), ApplicationError> {
        match message {
            ChatMessage::Group(message) => {
                let group = self.group(message.group_id).await?;
                let sender = self.user(message.user_id).await?;
                let members = self
                    .call(self.gateway.get_all_users_of_group(group.id))
                    .await?;
                let recipients = members.into_iter().map(|member| member.id).collect();
                let payload = ServerPayload::Message(MessagePayload::Group {
                    sender_name: sender.first_name,
                    group_name: group.group_name,
                    message,
                });
                Ok((payload, recipients))
            }
            ChatMessage::Direct(message) => {
                let sender = self.user(message.sender_id).await?;
                let recipient = self.user(message.recipient_id).await?;
                let recipients = HashSet::from([sender.id, recipient.id]);
                let payload = ServerPayload::Message(MessagePayload::Direct {
                    sender_name: sender.first_name,
                    recipient_name: recipient.first_name,
                    message,
                });
                Ok((payload, recipients))
            }
        }
    }

    /// 查询失败只跳过对应的那一份状态广播
    async fn broadcast_chat_status(&mut self, user_id: UserId) {
        self.broadcast_group_status(user_id).await;
        if let Err(err) = self.broadcast_user_status(user_id).await {
            tracing::warn!(user_id = %user_id, error = %err, "skipping direct chat status broadcast");
        }
    }

    /// 对用户所在的每个小组，把成员快照发给正在看该小组的成员连接
    async fn broadcast_group_status(&mut self, user_id: UserId) {
        let groups = match self.call(self.gateway.get_all_groups_of_user(user_id)).await {
            Ok(groups) => groups,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "skipping group status broadcast");
                return;
            }
        };
        for group in groups {
            let members = match self.call(self.gateway.get_all_users_of_group(group.id)).await {
                Ok(members) => members,
                Err(err) => {
                    tracing::warn!(
                        user_id = %user_id,
                        group_id = %group.id,
                        error = %err,
                        "skipping group status broadcast"
                    );
                    continue;
                }
            };
            let member_ids: HashSet<UserId> = members.iter().map(|member| member.id).collect();
            let status = self.presence().group_status(&group, members);
            let group_id = group.id;
            self.deliver(
                ServerPayload::ChatStatus(StatusPayload::Group(status)),
                |c| c.is_viewing_group(group_id) && member_ids.contains(&c.user_id),
            );
        }
    }

    /// 私聊状态：正在与该用户私聊的人收到该用户的状态，该用户自己的私聊窗口收到对方的状态
    async fn broadcast_user_status(&mut self, user_id: UserId) -> Result<(), ApplicationError> {
        let mut observers = BTreeSet::new();
        let mut peers = BTreeSet::new();
        for connection in self.live.values() {
            match connection.info.target {
                ChatTarget::Direct(peer) if connection.info.user_id == user_id => {
                    peers.insert(peer);
                }
                ChatTarget::Direct(peer) if peer == user_id => {
                    observers.insert(connection.info.user_id);
                }
                _ => {}
            }
        }
        if observers.is_empty() && peers.is_empty() {
            return Ok(());
        }

        let index = self.presence();
        if !observers.is_empty() {
            let subject = self.user(user_id).await?;
            for observer in observers {
                let status = index.peer_status(user_id, observer);
                let payload = ServerPayload::ChatStatus(StatusPayload::User(UserStatus {
                    user: subject.clone(),
                    status,
                }));
                self.deliver(payload, |c| {
                    c.user_id == observer && c.is_viewing_direct_with(user_id)
                });
            }
        }
        for peer in peers {
            let user = self.user(peer).await?;
            let status = index.peer_status(peer, user_id);
            let payload =
                ServerPayload::ChatStatus(StatusPayload::User(UserStatus { user, status }));
            self.deliver(payload, |c| {
                c.user_id == user_id && c.is_viewing_direct_with(peer)
            });
        }
        Ok(())
    }

    /// 向同一会话中的其他连接发送加入或离开的系统提示
    async fn announce(&mut self, info: ConnectionInfo, verb: &str) {
        let user = match self.user(info.user_id).await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(user_id = %info.user_id, error = %err, "skipping {verb} announcement");
                return;
            }
        };
        let payload = ServerPayload::server(format!("{} {verb} the chat", user.display_name()));
        self.deliver(payload, |c| c.id != info.id && info.shares_conversation_with(c));
    }

    /// 非阻塞投递。队列已满或已关闭的连接被移出在线集合，稍后按离开处理。
    fn deliver<F>(&mut self, payload: ServerPayload, mut accept: F)
    where
        F: FnMut(&ConnectionInfo) -> bool,
    {
        let payload = Arc::new(payload);
        let mut evicted = Vec::new();
        for (id, connection) in &self.live {
            if !accept(&connection.info) {
                continue;
            }
            match connection.outbound.try_send(Arc::clone(&payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        user_id = %connection.info.user_id,
                        "outbound queue full, evicting connection"
                    );
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %id, "outbound queue closed, evicting connection");
                    evicted.push(*id);
                }
            }
        }
        for id in evicted {
            if let Some(connection) = self.live.remove(&id) {
                self.departed.push_back(connection.info);
            }
        }
    }

    fn presence(&self) -> PresenceIndex {
        PresenceIndex::from_connections(self.live.values().map(|connection| &connection.info))
    }

    async fn user(&self, id: UserId) -> Result<User, ApplicationError> {
        self.call(self.gateway.get_user(id))
            .await?
            .ok_or(ApplicationError::Repository(RepositoryError::NotFound))
    }

    async fn group(&self, id: GroupId) -> Result<Group, ApplicationError> {
        self.call(self.gateway.get_group(id))
            .await?
            .ok_or(ApplicationError::Repository(RepositoryError::NotFound))
    }

    /// 所有持久化调用都受超时约束，超时与调用失败同样处理
    async fn call<T, F>(&self, call: F) -> Result<T, ApplicationError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(result) => result.map_err(ApplicationError::from),
            Err(_) => Err(ApplicationError::GatewayTimeout(self.gateway_timeout)),
        }
    }

    #[cfg(test)]
    fn live_ids(&self) -> HashSet<ConnectionId> {
        self.live.keys().copied().collect()
    }
}
