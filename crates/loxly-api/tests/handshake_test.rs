#![allow(clippy::unwrap_used)]
// Handshake tests against a scripted Miniserver on a local socket.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use loxly_api::auth::ENABLE_BINARY_STATUS;
use loxly_api::websocket::{connect, ws_url};
use loxly_api::{AuthSession, AuthState, Error};

type ServerWs = WebSocketStream<TcpStream>;

// Golden vector for admin / secret / salt 0123abcd / key "ABCDEFGHIP", SHA1.
const KEY_HEX: &str = "41424344454647484950";
const SALT: &str = "0123abcd";
const EXPECTED_HASH: &str = "d9405cd685ff374bf3a57d763acf06a255e83b14";

// ── Helpers ─────────────────────────────────────────────────────────

async fn scripted_server<F, Fut>(script: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        script(ws).await;
    });
    (host, handle)
}

async fn expect_text(ws: &mut ServerWs) -> String {
    let msg = ws.next().await.unwrap().unwrap();
    msg.to_text().unwrap().to_owned()
}

async fn send_json(ws: &mut ServerWs, value: serde_json::Value) {
    // Real servers announce text replies with a binary header first.
    ws.send(Message::binary(vec![0x03, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00]))
        .await
        .unwrap();
    ws.send(Message::text(value.to_string())).await.unwrap();
}

fn key_reply() -> serde_json::Value {
    json!({
        "LL": {
            "control": "jdev/sys/getkey2/admin",
            "code": "200",
            "value": { "key": KEY_HEX, "salt": SALT, "hashAlg": "SHA1" }
        }
    })
}

fn session() -> AuthSession {
    AuthSession::new("admin", SecretString::from("secret".to_owned()))
        .with_reply_timeout(Duration::from_secs(2))
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_success_enables_binary_mode() {
    let (host, server) = scripted_server(|mut ws| async move {
        assert_eq!(expect_text(&mut ws).await, "jdev/sys/getkey2/admin");
        send_json(&mut ws, key_reply()).await;

        assert_eq!(expect_text(&mut ws).await, format!("authenticate/{EXPECTED_HASH}"));
        send_json(&mut ws, json!({"LL": {"control": "authenticate", "Code": "200", "value": ""}})).await;

        assert_eq!(expect_text(&mut ws).await, ENABLE_BINARY_STATUS);
    })
    .await;

    let mut ws = connect(&ws_url(&host).unwrap()).await.unwrap();
    let mut auth = session();
    auth.authenticate(&mut ws).await.unwrap();

    assert_eq!(auth.state(), AuthState::Authenticated);
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_rejected_credentials() {
    let rejection = json!({"LL": {"control": "authenticate", "Code": "401", "value": "unauthorized"}});
    let expected_payload = rejection.to_string();

    let (host, server) = scripted_server(move |mut ws| async move {
        expect_text(&mut ws).await;
        send_json(&mut ws, key_reply()).await;
        expect_text(&mut ws).await;
        send_json(&mut ws, rejection).await;
    })
    .await;

    let mut ws = connect(&ws_url(&host).unwrap()).await.unwrap();
    let mut auth = session();
    let result = auth.authenticate(&mut ws).await;

    match result {
        Err(Error::AuthenticationFailed { payload }) => assert_eq!(payload, expected_payload),
        other => panic!("expected AuthenticationFailed, got: {other:?}"),
    }
    assert_eq!(auth.state(), AuthState::Failed);
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_malformed_key_reply() {
    let (host, server) = scripted_server(|mut ws| async move {
        expect_text(&mut ws).await;
        send_json(&mut ws, json!({"LL": {"value": {"salt": SALT}}})).await;
    })
    .await;

    let mut ws = connect(&ws_url(&host).unwrap()).await.unwrap();
    let mut auth = session();
    let result = auth.authenticate(&mut ws).await;

    assert!(
        matches!(result, Err(Error::Protocol { .. })),
        "expected Protocol error, got: {result:?}"
    );
    assert_eq!(auth.state(), AuthState::Failed);

    // One attempt per session.
    let again = auth.authenticate(&mut ws).await;
    assert!(matches!(again, Err(Error::Protocol { .. })));
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_server_closes_early() {
    let (host, server) = scripted_server(|mut ws| async move {
        expect_text(&mut ws).await;
        ws.close(None).await.unwrap();
    })
    .await;

    let mut ws = connect(&ws_url(&host).unwrap()).await.unwrap();
    let result = session().authenticate(&mut ws).await;

    assert!(
        matches!(result, Err(Error::WebSocketClosed { .. })),
        "expected WebSocketClosed, got: {result:?}"
    );
    server.await.unwrap();
}

#[tokio::test]
async fn test_handshake_times_out_without_reply() {
    let (host, server) = scripted_server(|mut ws| async move {
        expect_text(&mut ws).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await;

    let mut ws = connect(&ws_url(&host).unwrap()).await.unwrap();
    let mut auth = AuthSession::new("admin", SecretString::from("secret".to_owned()))
        .with_reply_timeout(Duration::from_millis(100));
    let result = auth.authenticate(&mut ws).await;

    assert!(
        matches!(result, Err(Error::Timeout { .. })),
        "expected Timeout, got: {result:?}"
    );
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = connect(&ws_url(&host).unwrap()).await;
    assert!(matches!(result, Err(Error::WebSocketConnect(_))));
}
