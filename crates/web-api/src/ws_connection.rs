use application::{ClientFrame, ConnectionInfo, HubHandle, InboundEvent, OutboundReceiver};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};

/// WebSocket 连接
///
/// 把一条 WebSocket 拆成两个互不通信的循环：
/// - 读循环把客户端帧解码后交给调度器，结束时注销连接
/// - 写循环把调度器放入队列的载荷写到 socket，队列被关闭时发送 Close 帧
pub struct WebSocketConnection {
    socket: WebSocket,
    hub: HubHandle,
    info: ConnectionInfo,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, hub: HubHandle, info: ConnectionInfo) -> Self {
        Self { socket, hub, info }
    }

    pub async fn run(self) {
        let Self { socket, hub, info } = self;

        let outbound = match hub.connect(info).await {
            Ok(outbound) => outbound,
            Err(err) => {
                tracing::warn!(error = %err, user_id = %info.user_id, "failed to register connection");
                return;
            }
        };
        tracing::info!(
            connection_id = %info.id,
            user_id = %info.user_id,
            target = ?info.target,
            "WebSocket 连接已建立"
        );

        let (sender, incoming) = socket.split();
        let mut write_task = tokio::spawn(write_loop(sender, outbound, info));
        let mut read_task = tokio::spawn(read_loop(incoming, hub.clone(), info));

        tokio::select! {
            _ = &mut read_task => {
                // 读循环已经发出注销，等待调度器关闭队列后写循环自行结束
                let _ = write_task.await;
            }
            _ = &mut write_task => {
                read_task.abort();
                if let Err(err) = hub.unregister(info.id).await {
                    tracing::debug!(error = %err, "hub already stopped");
                }
            }
        }

        tracing::info!(connection_id = %info.id, user_id = %info.user_id, "WebSocket连接已断开");
    }
}

async fn read_loop(mut incoming: SplitStream<WebSocket>, hub: HubHandle, info: ConnectionInfo) {
    while let Some(message) = incoming.next().await {
        let decoded = match message {
            Ok(WsMessage::Text(text)) => ClientFrame::decode(text.as_str().as_bytes()),
            Ok(WsMessage::Binary(bytes)) => ClientFrame::decode(&bytes),
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
            Ok(WsMessage::Close(_)) => {
                tracing::debug!(connection_id = %info.id, "WebSocket收到关闭消息");
                break;
            }
            Err(err) => {
                tracing::debug!(connection_id = %info.id, error = %err, "WebSocket read failed");
                break;
            }
        };

        let frame = match decoded {
            Ok(frame) => frame,
            Err(err) => {
                // 违反协议的客户端按断开处理
                tracing::warn!(connection_id = %info.id, error = %err, "malformed frame, closing connection");
                break;
            }
        };

        if hub
            .submit(InboundEvent {
                connection: info,
                frame,
            })
            .await
            .is_err()
        {
            break;
        }
    }

    if let Err(err) = hub.unregister(info.id).await {
        tracing::debug!(error = %err, "hub already stopped");
    }
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, WsMessage>,
    mut outbound: OutboundReceiver,
    info: ConnectionInfo,
) {
    while let Some(payload) = outbound.recv().await {
        let text = match payload.to_json() {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket payload");
                continue;
            }
        };
        if let Err(err) = sender.send(WsMessage::Text(text.into())).await {
            tracing::debug!(connection_id = %info.id, error = %err, "WebSocket write failed");
            return;
        }
    }

    // 队列被调度器关闭
    let _ = sender.send(WsMessage::Close(None)).await;
}
