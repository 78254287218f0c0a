mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};

use support::{
    expect_closed, is_chat, is_status, member_ids, message, next_payload, spawn_server, ALICE,
    BOB, CAROL,
};

#[tokio::test]
async fn group_chat_flow() {
    let server = spawn_server(Vec::new()).await;

    let mut alice = server.connect_as("/ws/group/10", ALICE).await;
    // Bob 还没上线
    let status = next_payload(&mut alice, is_status("GROUP")).await;
    assert_eq!(status["group_name"], "Evening Walkers");
    assert_eq!(member_ids(&status, "sorted_in_chat_members"), vec![1]);
    assert_eq!(member_ids(&status, "sorted_offline_members"), vec![2]);

    let mut bob = server.connect_as("/ws/group/10", BOB).await;
    for ws in [&mut alice, &mut bob] {
        let status = next_payload(ws, is_status("GROUP")).await;
        assert_eq!(member_ids(&status, "sorted_in_chat_members"), vec![1, 2]);
        assert!(member_ids(&status, "sorted_offline_members").is_empty());
    }
    let joined = next_payload(&mut alice, is_chat("SERVER")).await;
    assert_eq!(joined["msg"], "Bob joined the chat");

    alice.send(message("hello\nfriends ")).await.unwrap();

    for ws in [&mut alice, &mut bob] {
        let payload = next_payload(ws, is_chat("GROUP")).await;
        assert_eq!(payload["sender_name"], "Alice");
        assert_eq!(payload["group_name"], "Evening Walkers");
        assert_eq!(payload["message"]["msg"], "hello friends");
        assert_eq!(payload["message"]["user_id"], 1);
        assert_eq!(payload["message"]["group_id"], 10);
        assert!(payload["message"]["time_added"].is_string());
    }
    assert_eq!(server.gateway.messages().await.len(), 1);

    bob.close(None).await.unwrap();
    let left = next_payload(&mut alice, is_chat("SERVER")).await;
    assert_eq!(left["msg"], "Bob left the chat");
}

#[tokio::test]
async fn direct_chat_flow() {
    let server = spawn_server(Vec::new()).await;

    let mut alice = server.connect_as("/ws/user/3", ALICE).await;
    let status = next_payload(&mut alice, is_status("USER")).await;
    assert_eq!(status["user"]["first_name"], "Carol");
    assert_eq!(status["status"], "Offline");
    assert!(status["user"].get("email").is_none());

    let mut carol = server.connect_as("/ws/user/1", CAROL).await;
    let status = next_payload(&mut alice, is_status("USER")).await;
    assert_eq!(status["user"]["id"], 3);
    assert_eq!(status["status"], "In Chat");
    let status = next_payload(&mut carol, is_status("USER")).await;
    assert_eq!(status["user"]["id"], 1);
    assert_eq!(status["status"], "In Chat");

    carol.send(message("hi alice")).await.unwrap();
    for ws in [&mut alice, &mut carol] {
        let payload = next_payload(ws, is_chat("DIRECT")).await;
        assert_eq!(payload["sender_name"], "Carol");
        assert_eq!(payload["recipient_name"], "Alice");
        assert_eq!(payload["message"]["sender_id"], 3);
        assert_eq!(payload["message"]["recipient_id"], 1);
        assert_eq!(payload["message"]["msg"], "hi alice");
    }
}

#[tokio::test]
async fn persistence_failure_is_not_broadcast() {
    let server = spawn_server(Vec::new()).await;
    let mut alice = server.connect_as("/ws/group/10", ALICE).await;
    next_payload(&mut alice, is_status("GROUP")).await;

    server.gateway.set_fail_writes(true);
    alice.send(message("this will be lost")).await.unwrap();

    // 写库失败的消息不会回显给任何连接
    let next = tokio::time::timeout(Duration::from_millis(500), alice.next()).await;
    assert!(next.is_err(), "unexpected frame {next:?}");
    assert!(server.gateway.messages().await.is_empty());
}

#[tokio::test]
async fn protocol_violation_closes_connection() {
    let server = spawn_server(Vec::new()).await;
    let mut alice = server.connect_as("/ws/group/10", ALICE).await;
    let mut bob = server.connect_as("/ws/group/10", BOB).await;
    next_payload(&mut alice, is_chat("SERVER")).await;

    // CHAT_STATUS 只能由服务端发送
    bob.send(tokio_tungstenite::tungstenite::Message::Text(
        r#"{"tag":"CHAT_STATUS","data":"x"}"#.into(),
    ))
    .await
    .unwrap();

    expect_closed(&mut bob).await;
    let left = next_payload(&mut alice, is_chat("SERVER")).await;
    assert_eq!(left["msg"], "Bob left the chat");
}

#[tokio::test]
async fn binary_frames_are_accepted() {
    let server = spawn_server(Vec::new()).await;
    let mut alice = server.connect_as("/ws/group/10", ALICE).await;

    alice
        .send(tokio_tungstenite::tungstenite::Message::Binary(
            br#"{"tag":"MESSAGE","data":"from bytes"}"#.to_vec().into(),
        ))
        .await
        .unwrap();

    let payload = next_payload(&mut alice, is_chat("GROUP")).await;
    assert_eq!(payload["message"]["msg"], "from bytes");
}
