//! End-to-end scenarios over the composed realtime engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use lexhub_cache::memory::{MemoryPubSub, MemoryStore};
use lexhub_core::config::AppConfig;
use lexhub_realtime::RealtimeEngine;
use lexhub_realtime::broadcast::handler_fn;
use lexhub_realtime::connection::{ChannelPeer, ChannelTransport};
use lexhub_realtime::message::MessageType;

fn engine_on(store: Arc<MemoryStore>, broker: MemoryPubSub) -> RealtimeEngine {
    RealtimeEngine::new(&AppConfig::default(), store, Arc::new(broker))
        .expect("engine wiring")
}

fn engine() -> RealtimeEngine {
    engine_on(Arc::new(MemoryStore::default()), MemoryPubSub::default())
}

async fn connect(engine: &RealtimeEngine, user: &str, conn: &str) -> ChannelPeer {
    let (transport, mut peer) = ChannelTransport::pair(256, Duration::from_secs(1));
    engine
        .registry
        .connect(transport, user, Some(conn.to_string()), None)
        .await
        .expect("connect");
    peer.drain();
    peer
}

/// Wait until the peer receives a message of `message_type`.
async fn recv_type(peer: &mut ChannelPeer, message_type: &str) -> Option<Value> {
    let wait = async {
        while let Some(text) = peer.outbound.recv().await {
            let value: Value = serde_json::from_str(&text).ok()?;
            if value["type"] == message_type {
                return Some(value);
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .ok()
        .flatten()
}

async fn count_offline(engine: &RealtimeEngine) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = count.clone();
    engine
        .broadcaster
        .on_event(
            MessageType::PresenceUpdate,
            handler_fn(move |msg| {
                let hits = hits.clone();
                async move {
                    if msg.data["status"] == "offline" {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                }
            }),
        )
        .await;
    count
}

#[tokio::test]
async fn test_last_connection_closing_goes_offline_once() {
    let engine = engine();
    let offline = count_offline(&engine).await;

    let _c1 = connect(&engine, "u1", "c1").await;
    let _c2 = connect(&engine, "u1", "c2").await;
    assert_eq!(engine.registry.connection_count().await, 2);

    engine.registry.disconnect("c1").await;
    assert!(engine.registry.is_user_online("u1").await);
    assert!(engine.presence.is_online("u1").await);

    engine.registry.disconnect("c2").await;
    engine.registry.disconnect("c2").await;
    assert!(!engine.registry.is_user_online("u1").await);
    assert!(!engine.presence.is_online("u1").await);
    assert_eq!(offline.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_disconnects_go_offline_once() {
    let engine = engine();
    let offline = count_offline(&engine).await;

    let mut peers = Vec::new();
    for i in 0..5 {
        peers.push(connect(&engine, "u1", &format!("c{i}")).await);
    }

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let registry = engine.registry.clone();
            tokio::spawn(async move { registry.disconnect(&format!("c{i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(!engine.presence.is_online("u1").await);
    assert_eq!(offline.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_room_broadcast_skips_dead_member() {
    let engine = engine();
    let mut alive_a = connect(&engine, "a", "ca").await;
    let mut alive_b = connect(&engine, "b", "cb").await;
    let dead = connect(&engine, "c", "cc").await;
    for conn in ["ca", "cb", "cc"] {
        engine.registry.join_room(conn, "doc:42").await.unwrap();
    }
    alive_a.drain();
    alive_b.drain();
    drop(dead);

    let delivered = engine
        .registry
        .broadcast_to_room("doc:42", MessageType::DocumentUpdate, json!({"rev": 3}), None)
        .await;
    assert_eq!(delivered, 2);
    assert_eq!(alive_a.drain_json()[0]["data"]["rev"], 3);
    assert_eq!(alive_b.drain_json()[0]["data"]["rev"], 3);

    let again = engine
        .registry
        .broadcast_to_room("doc:42", MessageType::DocumentUpdate, json!({"rev": 4}), None)
        .await;
    assert_eq!(again, 2);
}

#[tokio::test(start_paused = true)]
async fn test_silent_connection_is_reaped_by_heartbeat() {
    let engine = engine();
    engine.start().await;

    let _silent = connect(&engine, "u1", "silent").await;
    let _chatty = connect(&engine, "u1", "chatty").await;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(20)).await;
        engine
            .registry
            .handle_message("chatty", r#"{"type":"heartbeat"}"#)
            .await;
    }

    assert!(!engine.registry.contains("silent").await);
    assert!(engine.registry.contains("chatty").await);
    let delivered = engine
        .registry
        .send_to_user("u1", MessageType::Notification, json!({"title": "hi"}))
        .await;
    assert_eq!(delivered, 1);

    engine.stop().await;
}

#[tokio::test]
async fn test_two_nodes_relay_over_shared_broker() {
    let store = Arc::new(MemoryStore::default());
    let broker = MemoryPubSub::default();
    let node_a = engine_on(store.clone(), broker.clone());
    let node_b = engine_on(store, broker);
    node_a.start().await;
    node_b.start().await;

    let mut on_a = connect(&node_a, "reviewer", "a1").await;
    node_a
        .registry
        .join_room("a1", "document:d1")
        .await
        .unwrap();
    on_a.drain();

    node_b
        .broadcaster
        .broadcast_document_update("d1", "author", json!({"section": 2}))
        .await;
    let update = recv_type(&mut on_a, "document_update").await.expect("relayed update");
    assert_eq!(update["data"]["changes"]["section"], 2);
    assert_eq!(update["room_id"], "document:d1");

    let members = node_b.presence.get_room_members("document:d1").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, "reviewer");

    node_b
        .broadcaster
        .send_notification(vec!["reviewer".into()], "Filed", "Motion filed", None)
        .await;
    let note = recv_type(&mut on_a, "notification").await.expect("relayed notification");
    assert_eq!(note["data"]["title"], "Filed");

    node_a.stop().await;
    node_b.stop().await;
}

#[tokio::test]
async fn test_session_survives_reconnect_across_nodes() {
    let store = Arc::new(MemoryStore::default());
    let node_a = engine_on(store.clone(), MemoryPubSub::default());
    let node_b = engine_on(store, MemoryPubSub::default());

    let session = node_a.sessions.create_session("u1", None, None).await;
    let mut prefs = serde_json::Map::new();
    prefs.insert("theme".into(), json!("dark"));
    node_a
        .sessions
        .update_session_preferences(&session.session_id, prefs)
        .await
        .unwrap();

    let restored = node_b.sessions.get_session(&session.session_id).await.unwrap();
    assert_eq!(restored.user_id, "u1");
    assert_eq!(restored.preferences["theme"], "dark");
}

#[tokio::test]
async fn test_inbound_errors_keep_connection_open() {
    let engine = engine();
    let mut peer = connect(&engine, "u1", "c1").await;

    engine.registry.handle_message("c1", "{broken").await;
    engine
        .registry
        .handle_message("c1", r#"{"type":"teleport","data":{}}"#)
        .await;
    engine
        .registry
        .handle_message("c1", r#"{"type":"chat_message","data":{"room_id":"r1","message":"hi"}}"#)
        .await;

    let codes: Vec<Value> = peer
        .drain_json()
        .into_iter()
        .map(|m| m["data"]["code"].clone())
        .collect();
    assert_eq!(
        codes,
        vec![json!("INVALID_MESSAGE"), json!("UNKNOWN_TYPE"), json!("NOT_A_MEMBER")]
    );
    assert!(engine.registry.contains("c1").await);
}

#[tokio::test]
async fn test_chatting_user_survives_presence_sweep() {
    let mut config = AppConfig::default();
    config.presence.inactivity_timeout_seconds = 0;
    let engine = RealtimeEngine::new(
        &config,
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryPubSub::default()),
    )
    .expect("engine wiring");
    let offline = count_offline(&engine).await;

    let _peer = connect(&engine, "u1", "c1").await;
    engine
        .registry
        .handle_message("c1", r#"{"type":"join_room","data":{"room_id":"r1"}}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine
        .registry
        .handle_message("c1", r#"{"type":"chat_message","data":{"room_id":"r1","message":"hi"}}"#)
        .await;

    assert_eq!(engine.presence.sweep_inactive().await, 0);
    assert!(engine.presence.is_online("u1").await);
    assert_eq!(offline.load(Ordering::SeqCst), 0);

    engine.registry.disconnect("c1").await;
    assert!(!engine.presence.is_online("u1").await);
    assert_eq!(offline.load(Ordering::SeqCst), 1);
}
