#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{memory::MemoryPersistenceGateway, Hub, SystemClock};
use axum::Router;
use config::{HubConfig, ServerConfig};
use domain::{Group, GroupId, User, UserId};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use web_api::{router as build_router_fn, AppState, JwtConfig, JwtService};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WALKERS: GroupId = GroupId(10);
pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);
pub const CAROL: UserId = UserId(3);

fn user(id: UserId, first_name: &str) -> User {
    User {
        id,
        first_name: first_name.to_string(),
        last_name: "Koh".to_string(),
        gender: "F".to_string(),
        faculty: "Medicine".to_string(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        user_role: "MEMBER".to_string(),
    }
}

/// Alice 与 Bob 在小组 10，Carol 不在
pub async fn seeded_gateway() -> Arc<MemoryPersistenceGateway> {
    let gateway = Arc::new(MemoryPersistenceGateway::new());
    gateway.insert_user(user(ALICE, "Alice")).await;
    gateway.insert_user(user(BOB, "Bob")).await;
    gateway.insert_user(user(CAROL, "Carol")).await;
    gateway
        .insert_group(Group {
            id: WALKERS,
            group_name: "Evening Walkers".to_string(),
            group_description: "Walk and talk after class".to_string(),
            category: "SUPPORT".to_string(),
            owner_id: ALICE,
        })
        .await;
    gateway.add_member(WALKERS, ALICE).await;
    gateway.add_member(WALKERS, BOB).await;
    gateway
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub gateway: Arc<MemoryPersistenceGateway>,
    pub jwt: JwtService,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub fn build_router(gateway: Arc<MemoryPersistenceGateway>, allowed_origins: Vec<String>) -> Router {
    let (hub, handle) = Hub::new(gateway.clone(), Arc::new(SystemClock), &HubConfig::default());
    hub.spawn();

    let jwt_service = Arc::new(JwtService::new(JwtConfig::default()));
    let server = ServerConfig {
        allowed_origins,
        ..ServerConfig::default()
    };
    let state = AppState::new(handle, gateway, jwt_service, &server);
    build_router_fn(state)
}

pub async fn spawn_server(allowed_origins: Vec<String>) -> TestServer {
    let gateway = seeded_gateway().await;
    let router = build_router(gateway.clone(), allowed_origins);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        gateway,
        jwt: JwtService::new(JwtConfig::default()),
        shutdown: Some(shutdown_tx),
    }
}

impl TestServer {
    /// 以 `user` 的身份打开 WebSocket，会话令牌放在 cookie 里
    pub async fn connect(
        &self,
        path: &str,
        user: Option<UserId>,
        origin: Option<&str>,
    ) -> Result<WsStream, tungstenite::Error> {
        let mut request = format!("ws://{}{}", self.addr, path)
            .into_client_request()
            .expect("request");
        if let Some(user) = user {
            let token = self.jwt.generate_token(user).expect("token");
            request.headers_mut().insert(
                "cookie",
                HeaderValue::from_str(&format!("session_key={token}")).expect("cookie"),
            );
        }
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert("origin", HeaderValue::from_str(origin).expect("origin"));
        }
        connect_async(request).await.map(|(stream, _)| stream)
    }

    pub async fn connect_as(&self, path: &str, user: UserId) -> WsStream {
        self.connect(path, Some(user), None)
            .await
            .expect("websocket handshake")
    }
}

/// 读取下一个满足条件的 JSON 载荷，跳过其余帧
pub async fn next_payload<F>(ws: &mut WsStream, mut predicate: F) -> Value
where
    F: FnMut(&Value) -> bool,
{
    loop {
        let message = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("frame ok");
        if let Message::Text(text) = message {
            let value: Value = serde_json::from_str(text.as_str()).expect("json payload");
            if predicate(&value) {
                return value;
            }
        }
    }
}

pub fn is_chat(label: &'static str) -> impl FnMut(&Value) -> bool {
    move |value: &Value| value["tag"] == "MESSAGE" && value["label"] == label
}

pub fn is_status(label: &'static str) -> impl FnMut(&Value) -> bool {
    move |value: &Value| value["tag"] == "CHAT_STATUS" && value["label"] == label
}

pub fn member_ids(value: &Value, bucket: &str) -> Vec<i64> {
    value[bucket]
        .as_array()
        .expect("member list")
        .iter()
        .map(|member| member["id"].as_i64().expect("member id"))
        .collect()
}

pub fn message(data: &str) -> Message {
    Message::Text(serde_json::json!({ "tag": "MESSAGE", "data": data }).to_string().into())
}

/// 等待服务端关闭连接
pub async fn expect_closed(ws: &mut WsStream) {
    loop {
        match timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("close within timeout")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => continue,
        }
    }
}
