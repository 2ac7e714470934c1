// ABOUTME: End-to-end tests for the management handlers
// ABOUTME: Covers the auth token dance, the execution gate and subscriptions

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wrangle_core::auth::ChatAuthenticator;
use wrangle_core::i18n::MessageCatalog;
use wrangle_core::management::ManagementService;
use wrangle_core::memory::{MemoryChatRepository, MemoryClientRepository};
use wrangle_core::notify::ChatNotifier;
use wrangle_core::reply::Reply;
use wrangle_core::repository::{ChatRepository, ClientRepository};
use wrangle_core::subscription::SubscriptionStore;
use wrangle_core::transport::{handler, InProcessTransport, Transport};
use wrangle_core::{Command, Payload};

struct Harness {
    service: Arc<ManagementService>,
    transport: Arc<InProcessTransport>,
    chats: Arc<MemoryChatRepository>,
    clients: Arc<MemoryClientRepository>,
}

fn harness(client_secret: Option<&str>) -> Harness {
    let transport = Arc::new(InProcessTransport::new());
    let chats = Arc::new(MemoryChatRepository::new());
    let clients = Arc::new(MemoryClientRepository::new());
    let notifier = Arc::new(ChatNotifier::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&chats) as Arc<dyn ChatRepository>,
        Arc::new(MessageCatalog::new()),
    ));
    let subscriptions = Arc::new(SubscriptionStore::new(
        Arc::clone(&clients) as Arc<dyn ClientRepository>
    ));
    let auth = ChatAuthenticator::new(Arc::clone(&chats) as Arc<dyn ChatRepository>);

    let service = Arc::new(ManagementService::new(
        Arc::clone(&chats) as Arc<dyn ChatRepository>,
        Arc::clone(&clients) as Arc<dyn ClientRepository>,
        subscriptions,
        auth,
        Arc::clone(&transport) as Arc<dyn Transport>,
        notifier,
        client_secret.map(|s| s.to_string()),
    ));
    Harness {
        service,
        transport,
        chats,
        clients,
    }
}

async fn capture(
    transport: &InProcessTransport,
    filter: &str,
) -> mpsc::UnboundedReceiver<(String, Vec<u8>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    transport
        .subscribe(
            filter,
            handler(move |msg| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((msg.topic, msg.payload));
                }
            }),
        )
        .await
        .unwrap();
    rx
}

async fn recv_text(rx: &mut mpsc::UnboundedReceiver<(String, Vec<u8>)>) -> String {
    let (_, raw) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed");
    let reply: Reply = serde_json::from_slice(&raw).unwrap();
    reply.content.as_str().unwrap().to_string()
}

fn command_bytes(name: &str, chat_id: &str, args: &[&str]) -> Vec<u8> {
    let command = Command::new(name, chat_id, "msg-1")
        .with_args(args.iter().map(|s| s.to_string()).collect());
    serde_json::to_vec(&command).unwrap()
}

async fn register_client(h: &Harness, client_id: &str, node_key: &str) {
    let payload = Payload::new().for_client(node_key);
    h.service
        .handle_client_register(
            &format!("client/{client_id}/register"),
            &serde_json::to_vec(&payload).unwrap(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_auth_token_dance() {
    let h = harness(None);
    let mut rx = capture(&h.transport, "chat/42/notify").await;

    // first /auth issues a token
    h.service
        .handle_chat_auth("chat/42/auth", &command_bytes("/auth", "42", &[]))
        .await
        .unwrap();
    let text = recv_text(&mut rx).await;
    assert!(text.starts_with("Your authorization token: "));
    let token = text
        .trim_start_matches("Your authorization token: ")
        .split('.')
        .next()
        .unwrap()
        .to_string();

    // wrong token is rejected
    h.service
        .handle_chat_auth("chat/42/auth", &command_bytes("/auth", "42", &["bogus"]))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut rx).await, "Invalid or expired token.");

    // right token authorizes
    h.service
        .handle_chat_auth("chat/42/auth", &command_bytes("/auth", "42", &[&token]))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut rx).await, "Chat authorized. Welcome!");
    assert!(h.chats.is_authorized("42").await.unwrap());

    // asking again reports the existing authorization
    h.service
        .handle_chat_auth("chat/42/auth", &command_bytes("/auth", "42", &[]))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut rx).await, "This chat is already authorized.");
}

#[tokio::test]
async fn test_deauth_revokes_authorization() {
    let h = harness(None);
    let mut rx = capture(&h.transport, "chat/42/notify").await;
    h.chats.authorize("42").await.unwrap();

    h.service
        .handle_chat_deauth("chat/42/deauth", &command_bytes("/deauth", "42", &[]))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut rx).await, "Chat authorization revoked.");
    assert!(!h.chats.is_authorized("42").await.unwrap());
}

#[tokio::test]
async fn test_execute_gate_forwards_authorized_chats() {
    let h = harness(None);
    let mut gated = capture(&h.transport, "cmd/+/execute").await;
    let mut notify = capture(&h.transport, "chat/42/notify").await;
    h.chats.authorize("42").await.unwrap();

    let raw = command_bytes("/ping", "42", &["node1"]);
    h.service
        .handle_execute_gate("plugin/cmd/ping/execute", &raw)
        .await
        .unwrap();

    let (topic, forwarded) = tokio::time::timeout(Duration::from_secs(1), gated.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic, "cmd/ping/execute");
    assert_eq!(forwarded, raw);

    tokio::task::yield_now().await;
    assert!(notify.try_recv().is_err());
}

#[tokio::test]
async fn test_execute_gate_blocks_unauthorized_chats() {
    let h = harness(None);
    let mut gated = capture(&h.transport, "cmd/+/execute").await;
    let mut notify = capture(&h.transport, "chat/42/notify").await;

    h.service
        .handle_execute_gate(
            "plugin/cmd/ping/execute",
            &command_bytes("/ping", "42", &["node1"]),
        )
        .await
        .unwrap();

    let text = recv_text(&mut notify).await;
    assert!(text.contains("not authorized"));

    tokio::task::yield_now().await;
    assert!(gated.try_recv().is_err());
}

#[tokio::test]
async fn test_set_language_changes_notify_language() {
    let h = harness(None);
    let mut rx = capture(&h.transport, "chat/42/notify").await;

    h.service
        .handle_set_language("chat/42/lang/set", &command_bytes("/lang", "42", &["de"]))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut rx).await, "Language set to de.");
    assert_eq!(h.chats.language("42").await.unwrap(), "de");

    // missing argument is reported
    h.service
        .handle_set_language("chat/42/lang/set", &command_bytes("/lang", "42", &[]))
        .await
        .unwrap();
    assert!(recv_text(&mut rx).await.contains("Invalid arguments"));
}

#[tokio::test]
async fn test_client_registration_with_secret() {
    let h = harness(Some("hunter2"));

    // wrong secret leaves the client unauthorized
    let bad = Payload::new().for_client("node1").with_data("nope".into());
    h.service
        .handle_client_register("client/c1/register", &serde_json::to_vec(&bad).unwrap())
        .await
        .unwrap();
    assert!(!h.clients.is_authorized("c1").await.unwrap());

    // right secret authorizes and marks online
    let good = Payload::new()
        .for_client("node1")
        .with_data("hunter2".into());
    h.service
        .handle_client_register("client/c1/register", &serde_json::to_vec(&good).unwrap())
        .await
        .unwrap();
    assert!(h.clients.is_authorized("c1").await.unwrap());
    assert!(h.clients.is_online("c1").await.unwrap());
}

#[tokio::test]
async fn test_heartbeat_touches_last_online() {
    let h = harness(None);
    register_client(&h, "c1", "node1").await;

    h.service
        .handle_heartbeat("client/c1/heartbeat", b"{}")
        .await
        .unwrap();

    let client = h.clients.get_by_node_key("node1").await.unwrap().unwrap();
    assert!(client.last_online.is_some());
}

#[tokio::test]
async fn test_subscription_fanout_on_client_reply() {
    let h = harness(None);
    register_client(&h, "c1", "node1").await;
    h.chats.authorize("42").await.unwrap();

    let mut notify = capture(&h.transport, "chat/42/notify").await;
    let mut responses = capture(&h.transport, "cmd/+/execute/response").await;

    // subscribe chat 42 to everything node1 does
    h.service
        .handle_subscribe(
            "chat/42/subscribe",
            &command_bytes("/subscribe", "42", &["node1"]),
        )
        .await
        .unwrap();
    assert_eq!(recv_text(&mut notify).await, "Added 1 subscription.");

    // a reply from node1 forwards to the response pipeline and fans out
    let payload = Payload {
        id: "payload-1".to_string(),
        ..Payload::new().for_client("node1").for_command("/ping").successful()
    };
    h.service
        .handle_client_plugin_reply(
            "client/c1/plugin/ping/reply",
            &serde_json::to_vec(&payload).unwrap(),
        )
        .await
        .unwrap();

    let (topic, _) = tokio::time::timeout(Duration::from_secs(1), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic, "cmd/ping/execute/response");

    assert_eq!(
        recv_text(&mut notify).await,
        "Client node1 responded to /ping."
    );
}

#[tokio::test]
async fn test_reply_from_offline_client_is_dropped() {
    let h = harness(None);
    // known but never registered online
    h.clients.create_if_absent("c1", "node1").await.unwrap();

    let mut responses = capture(&h.transport, "cmd/+/execute/response").await;

    let payload = Payload::new().for_client("node1").for_command("/ping");
    h.service
        .handle_client_plugin_reply(
            "client/c1/plugin/ping/reply",
            &serde_json::to_vec(&payload).unwrap(),
        )
        .await
        .unwrap();

    tokio::task::yield_now().await;
    assert!(responses.try_recv().is_err());
}

#[tokio::test]
async fn test_subscribe_requires_authorization() {
    let h = harness(None);
    register_client(&h, "c1", "node1").await;
    let mut notify = capture(&h.transport, "chat/42/notify").await;

    h.service
        .handle_subscribe(
            "chat/42/subscribe",
            &command_bytes("/subscribe", "42", &["node1"]),
        )
        .await
        .unwrap();
    assert!(recv_text(&mut notify).await.contains("not authorized"));
}

#[tokio::test]
async fn test_unsubscribe_removes_tuples() {
    let h = harness(None);
    register_client(&h, "c1", "node1").await;
    h.chats.authorize("42").await.unwrap();
    let mut notify = capture(&h.transport, "chat/42/notify").await;

    h.service
        .handle_subscribe(
            "chat/42/subscribe",
            &command_bytes("/subscribe", "42", &["node1", "/ping,/status"]),
        )
        .await
        .unwrap();
    assert_eq!(recv_text(&mut notify).await, "Added 2 subscriptions.");

    h.service
        .handle_unsubscribe(
            "chat/42/unsubscribe",
            &command_bytes("/unsubscribe", "42", &["node1", "/ping"]),
        )
        .await
        .unwrap();
    assert_eq!(recv_text(&mut notify).await, "Removed 1 subscription.");
}
