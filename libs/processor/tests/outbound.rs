//! Outbound dispatch tests against a local mock provider endpoint.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::routing::post;
use axum::Json;
use chatsync_core::{Partner, ProviderConfig, ProviderKind, StoredMessage};
use chatsync_processor::OutboundDispatcher;
use chatsync_providers::{InMemoryConfigStore, ProviderServices};
use chatsync_store::{ConversationStore, InMemoryStore};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    partner_token: Option<String>,
    body: Value,
}

type Inbox = Arc<Mutex<Vec<Recorded>>>;

async fn spawn_provider() -> (std::net::SocketAddr, Inbox) {
    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
    let app = axum::Router::new()
        .route(
            "/{*path}",
            post(
                |State(inbox): State<Inbox>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>| async move {
                    inbox.lock().unwrap().push(Recorded {
                        path: uri.path().to_string(),
                        partner_token: headers
                            .get("partner-token")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string),
                        body,
                    });
                    "ok"
                },
            ),
        )
        .with_state(inbox.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, inbox)
}

fn heynow_config(base_url: String) -> ProviderConfig {
    ProviderConfig {
        id: 1,
        name: "HeyNow".into(),
        kind: ProviderKind::Heynow,
        active: true,
        base_url,
        auth_token: "secret-token".into(),
        allowed_channels: BTreeSet::from(["WhatsApp".to_string()]),
        extra: Some(r#"{"partnerUser": {"id": 49, "names": "Ops"}}"#.to_string()),
    }
}

fn services_with(config: ProviderConfig) -> ProviderServices {
    let configs = InMemoryConfigStore::new();
    configs.put(config);
    ProviderServices::new(Arc::new(configs))
}

fn operator_reply(body: &str, channel_id: u64, author_id: u64) -> StoredMessage {
    StoredMessage {
        id: 500,
        body: body.to_string(),
        author_id,
        channel_id,
        external_id: None,
        from_webhook: false,
        suppress_forward: false,
        attachment_ids: Vec::new(),
    }
}

/// Processes one inbound webhook so the store holds a real channel with
/// provider metadata, then returns that channel and the operator partner.
async fn seeded_channel(
    store: &Arc<InMemoryStore>,
    config: ProviderConfig,
) -> (chatsync_core::Channel, Partner) {
    let processor = chatsync_processor::WebhookProcessor::new(
        store.clone() as Arc<dyn ConversationStore>,
        services_with(config),
    );
    let raw = json!({
        "event": {
            "key": {
                "clientId": "client-7",
                "session": "sess-1",
                "platformId": "plat-3",
                "channel": 35
            },
            "new": {"__contact": {"first_name": "Ana", "last_name": "Diaz"}}
        },
        "data": {
            "incoming": true,
            "lastMessageTrace": {"message": "hola", "idMessageHey": "abc-1"},
            "metaData": {}
        }
    });
    processor.process("heynow", &raw).await.unwrap();

    let channel = store.channels().into_iter().next().unwrap();
    let operator = store
        .partners()
        .into_iter()
        .find(|p| p.external_user_id.is_none())
        .unwrap();
    (channel, operator)
}

#[tokio::test]
async fn operator_reply_reaches_the_provider_endpoint() {
    let (addr, inbox) = spawn_provider().await;
    let config = heynow_config(format!("http://{addr}"));

    let store = Arc::new(InMemoryStore::new());
    let (channel, operator) = seeded_channel(&store, config.clone()).await;

    let dispatcher = OutboundDispatcher::new(services_with(config));
    let message = operator_reply("<p>hola &amp; adios</p>", channel.id, operator.id);
    dispatcher.dispatch(&message, &operator, &channel, &[]).await;

    let recorded = inbox.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].path, "/35/plat-3/client-7/sess-1");
    assert_eq!(recorded[0].partner_token.as_deref(), Some("secret-token"));
    assert_eq!(recorded[0].body["text"], "hola & adios");
    assert_eq!(recorded[0].body["partnerUser"]["id"], 49);
    assert!(recorded[0].body.get("file").is_none());
}

#[tokio::test]
async fn webhook_originated_messages_never_echo_back() {
    let (addr, inbox) = spawn_provider().await;
    let config = heynow_config(format!("http://{addr}"));

    let store = Arc::new(InMemoryStore::new());
    let (channel, operator) = seeded_channel(&store, config.clone()).await;

    let dispatcher = OutboundDispatcher::new(services_with(config));
    let stored = store.messages().into_iter().next().unwrap();
    let author = store
        .partners()
        .into_iter()
        .find(|p| p.external_user_id.is_some())
        .unwrap();
    dispatcher.dispatch(&stored, &author, &channel, &[]).await;

    let mut suppressed = operator_reply("nope", channel.id, operator.id);
    suppressed.suppress_forward = true;
    dispatcher
        .dispatch(&suppressed, &operator, &channel, &[])
        .await;

    assert!(inbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_provider_is_swallowed() {
    let config = heynow_config("http://127.0.0.1:9".to_string());

    let store = Arc::new(InMemoryStore::new());
    let (channel, operator) = seeded_channel(&store, config.clone()).await;

    let dispatcher = OutboundDispatcher::new(services_with(config))
        .with_timeout(Duration::from_millis(200));
    let message = operator_reply("hola", channel.id, operator.id);
    // Delivery failure is logged, not surfaced.
    dispatcher.dispatch(&message, &operator, &channel, &[]).await;
}
