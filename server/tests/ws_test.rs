//! Integration tests for the relay WebSocket endpoint: INIT, broadcast,
//! directed messages, keep-alive and leave propagation.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_server::config::Config;
use relay_server::state::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start the relay on a random port and return its address.
async fn start_test_server() -> SocketAddr {
    start_test_server_with(Config {
        send_timeout_ms: 500,
        ping_interval_secs: 0,
        sweep_interval_secs: 0,
        ..Config::default()
    })
    .await
}

async fn start_test_server_with(config: Config) -> SocketAddr {
    let state = AppState::new(&config);

    let app = relay_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{}/chat", addr))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Next text frame, failing the test after two seconds.
async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Expected a frame within timeout")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected text frame, got: {:?}", other),
        }
    }
}

async fn next_json(ws: &mut Client) -> Value {
    serde_json::from_str(&next_text(ws).await).expect("Server sent invalid JSON")
}

/// Send "ping" and wait for "pong". Frames are handled in order, so this
/// also confirms everything sent before it has been processed.
async fn round_trip(ws: &mut Client) {
    ws.send(Message::text("ping")).await.unwrap();
    assert_eq!(next_text(ws).await, "pong");
}

async fn assert_silent(ws: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "Expected no frame, got: {:?}", result);
}

async fn join(addr: SocketAddr, id: &str) -> Client {
    let mut ws = connect(addr).await;
    ws.send(Message::text(json!({"mtype": "INIT", "id": id}).to_string()))
        .await
        .unwrap();
    round_trip(&mut ws).await;
    ws
}

async fn send_text(ws: &mut Client, id: &str, text: &str, to: Option<&str>) {
    ws.send(Message::text(
        json!({"mtype": "TEXT", "id": id, "text": text, "to": to}).to_string(),
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn test_index_page_is_served() {
    let addr = start_test_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
    assert!(response.contains("/chat"));
}

#[tokio::test]
async fn test_ping_pong_before_init() {
    let addr = start_test_server().await;
    let mut ws = connect(addr).await;

    round_trip(&mut ws).await;
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn test_user_enter_announced_to_existing_members() {
    let addr = start_test_server().await;
    let mut alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    assert_eq!(
        next_json(&mut alice).await,
        json!({"mtype": "USER_ENTER", "id": "bob"})
    );
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_broadcast_then_direct_message() {
    let addr = start_test_server().await;
    let mut a = join(addr, "A").await;
    let mut b = join(addr, "B").await;
    let _enter = next_json(&mut a).await;

    send_text(&mut a, "A", "hi", None).await;
    assert_eq!(
        next_json(&mut b).await,
        json!({"mtype": "MSG", "id": "A", "text": "hi"})
    );

    send_text(&mut a, "A", "hey", Some("B")).await;
    assert_eq!(
        next_json(&mut b).await,
        json!({"mtype": "DM", "id": "A", "text": "hey"})
    );

    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_direct_message_isolation_and_unknown_recipient() {
    let addr = start_test_server().await;
    let mut a = join(addr, "a").await;
    let mut b = join(addr, "b").await;
    let mut c = join(addr, "c").await;
    let _ = next_json(&mut a).await;
    let _ = next_json(&mut a).await;
    let _ = next_json(&mut b).await;

    send_text(&mut a, "a", "psst", Some("b")).await;
    assert_eq!(
        next_json(&mut b).await,
        json!({"mtype": "DM", "id": "a", "text": "psst"})
    );
    assert_silent(&mut c).await;

    send_text(&mut a, "a", "anyone?", Some("zed")).await;
    round_trip(&mut a).await;
    assert_silent(&mut b).await;
    assert_silent(&mut c).await;
}

#[tokio::test]
async fn test_disconnect_broadcasts_user_leave() {
    let addr = start_test_server().await;
    let mut a = join(addr, "a").await;
    let mut b = join(addr, "b").await;
    let _ = next_json(&mut a).await;

    b.close(None).await.unwrap();
    drop(b);

    assert_eq!(
        next_json(&mut a).await,
        json!({"mtype": "USER_LEAVE", "id": "b"})
    );
}

#[tokio::test]
async fn test_malformed_frames_do_not_close_connection() {
    let addr = start_test_server().await;
    let mut a = join(addr, "a").await;

    a.send(Message::text("{not json")).await.unwrap();
    a.send(Message::text(r#"{"mtype":"SHOUT","id":"a"}"#))
        .await
        .unwrap();
    a.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();

    round_trip(&mut a).await;
}

#[tokio::test]
async fn test_text_before_init_is_dropped() {
    let addr = start_test_server().await;
    let mut member = join(addr, "member").await;
    let mut anon = connect(addr).await;

    send_text(&mut anon, "ghost", "boo", None).await;
    round_trip(&mut anon).await;

    assert_silent(&mut member).await;
}

#[tokio::test]
async fn test_duplicate_init_closes_previous_session() {
    let addr = start_test_server().await;
    let mut watcher = join(addr, "watcher").await;
    let mut first = join(addr, "dup").await;
    let mut second = join(addr, "dup").await;

    let frame = tokio::time::timeout(Duration::from_secs(2), first.next())
        .await
        .expect("Expected close frame within timeout");
    match frame {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 4000);
        }
        other => panic!("Expected close frame, got: {:?}", other),
    }

    // Watcher sees two entries and no leave for the identity that is still present.
    assert_eq!(
        next_json(&mut watcher).await,
        json!({"mtype": "USER_ENTER", "id": "dup"})
    );
    assert_eq!(
        next_json(&mut watcher).await,
        json!({"mtype": "USER_ENTER", "id": "dup"})
    );

    send_text(&mut watcher, "watcher", "still there?", Some("dup")).await;
    assert_eq!(
        next_json(&mut second).await,
        json!({"mtype": "DM", "id": "watcher", "text": "still there?"})
    );
}

#[tokio::test]
async fn test_unresponsive_client_is_dropped_after_pong_timeout() {
    let addr = start_test_server_with(Config {
        send_timeout_ms: 500,
        ping_interval_secs: 1,
        pong_timeout_secs: 1,
        sweep_interval_secs: 0,
        ..Config::default()
    })
    .await;

    let mut watcher = join(addr, "watcher").await;
    let mut frozen = join(addr, "frozen").await;
    assert_eq!(
        next_json(&mut watcher).await,
        json!({"mtype": "USER_ENTER", "id": "frozen"})
    );

    // The watcher keeps reading so its own pings get answered.
    let leave = tokio::spawn(async move {
        tokio::time::timeout(Duration::from_secs(8), async {
            loop {
                let frame = next_json(&mut watcher).await;
                if frame == json!({"mtype": "USER_LEAVE", "id": "frozen"}) {
                    return;
                }
            }
        })
        .await
    });

    // The frozen client never polls its stream, so it never answers a ping.
    tokio::time::sleep(Duration::from_secs(3)).await;

    let MaybeTlsStream::Plain(tcp) = frozen.get_mut() else {
        panic!("Expected a plain TCP stream");
    };
    let hung_up = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buf = [0u8; 1024];
        loop {
            match tcp.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(hung_up.is_ok(), "Server kept the unresponsive socket open");

    assert!(
        leave.await.unwrap().is_ok(),
        "Expected USER_LEAVE for the unresponsive client"
    );
}
