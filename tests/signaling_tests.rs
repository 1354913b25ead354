mod common;

use classroom_engine::error::SessionError;
use classroom_engine::model::{ChatMessage, Role};
use classroom_engine::signaling::{
    EventFamily, Inbound, NatsSignalingTransport, SignalEnvelope, SignalMessage, SignalingChannel,
    SignalingEvent, SignalingStatus,
};
use common::{participant, test_config, FakeSignaling, SESSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[test]
fn test_envelope_wire_shape() {
    let envelope = SignalEnvelope::new(
        SESSION,
        "p1",
        SignalMessage::HandRaise {
            user_id: "p1".to_string(),
            raised: true,
        },
    );

    let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["session_id"], SESSION);
    assert_eq!(json["sender_id"], "p1");
    assert_eq!(json["event"]["type"], "hand_raise");
    assert_eq!(json["event"]["data"]["user_id"], "p1");
    assert_eq!(json["event"]["data"]["raised"], true);

    let parsed: SignalEnvelope = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, envelope);
}

#[test]
fn test_chat_without_id_deserializes_as_pending() {
    let json = r#"{
        "session_id": "s-100",
        "sender_id": "p3",
        "sent_at": "2026-03-02T09:15:00Z",
        "event": {
            "type": "chat",
            "data": {
                "message": {
                    "client_ref": "c-1",
                    "sender_id": "p3",
                    "sender_display_name": "P3",
                    "text": "hi",
                    "sent_at": "2026-03-02T09:15:00Z"
                }
            }
        }
    }"#;

    let envelope: SignalEnvelope = serde_json::from_str(json).unwrap();
    match envelope.event {
        SignalMessage::Chat { message } => {
            assert!(message.is_pending());
            assert_eq!(message.client_ref.as_deref(), Some("c-1"));
            assert!(message.read_by.is_empty());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_event_families() {
    let chat = SignalMessage::Chat {
        message: ChatMessage::local("p1", "P1", "x"),
    };
    assert_eq!(chat.family(), EventFamily::Chat);
    assert_eq!(
        SignalMessage::Kick {
            target_user_id: "p2".to_string()
        }
        .family(),
        EventFamily::Moderation
    );
    assert_eq!(
        SignalMessage::LeaveRoom {
            user_id: "p2".to_string()
        }
        .family(),
        EventFamily::Presence
    );
}

#[test]
fn test_nats_subject_per_room() {
    let transport = NatsSignalingTransport::new("nats://localhost:4222", "classroom");
    assert_eq!(transport.subject("s-100"), "classroom.s-100.events");
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SignalingEvent>) -> SignalingEvent {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for signaling event")
        .expect("signaling sink closed")
}

fn channel(transport: &Arc<FakeSignaling>) -> SignalingChannel {
    SignalingChannel::new(transport.clone(), test_config().signaling)
}

#[tokio::test(start_paused = true)]
async fn test_connect_announces_join() {
    let transport = Arc::new(FakeSignaling::new());
    let mut channel = channel(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();

    channel
        .connect(SESSION, "bearer", participant("p1", Role::Presenter, 1), tx, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(channel.status(), SignalingStatus::Connected);
    assert!(matches!(
        transport.sent_events().as_slice(),
        [SignalMessage::JoinRoom { participant }] if participant.user_id == "p1"
    ));
    // Loopback delivers our own announce back
    assert!(matches!(next_event(&mut rx).await, SignalingEvent::Message(_)));
}

#[tokio::test]
async fn test_send_before_connect_is_unavailable() {
    let transport = Arc::new(FakeSignaling::new());
    let channel = channel(&transport);

    let err = channel
        .send(SignalMessage::LeaveRoom {
            user_id: "p1".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SignalingUnavailable));
    assert!(!channel.is_available());
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_reconnects_and_reannounces() {
    let transport = Arc::new(FakeSignaling::new());
    let mut channel = channel(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();
    channel
        .connect(SESSION, "bearer", participant("p1", Role::Presenter, 1), tx, CancellationToken::new())
        .await
        .unwrap();
    next_event(&mut rx).await;

    transport.drop_connection();

    assert_eq!(next_event(&mut rx).await, SignalingEvent::Disconnected);
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Reconnected);
    assert_eq!(channel.status(), SignalingStatus::Connected);
    assert_eq!(*transport.connects.lock(), 2);
    let announces = transport
        .sent_events()
        .iter()
        .filter(|e| matches!(e, SignalMessage::JoinRoom { .. }))
        .count();
    assert_eq!(announces, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_resume_triggers_resync() {
    let transport = Arc::new(FakeSignaling::new());
    let mut channel = channel(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();
    channel
        .connect(SESSION, "bearer", participant("p1", Role::Presenter, 1), tx, CancellationToken::new())
        .await
        .unwrap();
    next_event(&mut rx).await;

    let inbound = transport.inbound.lock().clone().unwrap();
    inbound.send(Inbound::Resumed).await.unwrap();

    // Reconnect notice first, then the echo of the re-announce
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Reconnected);
    assert!(matches!(
        next_event(&mut rx).await,
        SignalingEvent::Message(SignalEnvelope { event: SignalMessage::JoinRoom { .. }, .. })
    ));
    assert_eq!(*transport.connects.lock(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_budget_exhausted_fails_channel() {
    let transport = Arc::new(FakeSignaling::new());
    let mut channel = channel(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();
    channel
        .connect(SESSION, "bearer", participant("p1", Role::Presenter, 1), tx, CancellationToken::new())
        .await
        .unwrap();
    next_event(&mut rx).await;

    *transport.fail_connect.lock() = true;
    transport.drop_connection();

    assert_eq!(next_event(&mut rx).await, SignalingEvent::Disconnected);
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Failed);
    assert_eq!(channel.status(), SignalingStatus::Failed);
    assert!(!channel.is_available());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_announces_leave() {
    let transport = Arc::new(FakeSignaling::new());
    let mut channel = channel(&transport);
    let (tx, _rx) = mpsc::unbounded_channel();
    channel
        .connect(SESSION, "bearer", participant("p1", Role::Presenter, 1), tx, CancellationToken::new())
        .await
        .unwrap();

    channel.disconnect().await;

    assert_eq!(channel.status(), SignalingStatus::Disconnected);
    assert!(matches!(
        transport.sent_events().last(),
        Some(SignalMessage::LeaveRoom { user_id }) if user_id == "p1"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_first_connect_failure_keeps_retrying_in_background() {
    let transport = Arc::new(FakeSignaling::new());
    *transport.fail_connect.lock() = true;
    let mut channel = channel(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let status = channel
        .connect(SESSION, "bearer", participant("p1", Role::Presenter, 1), tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, SignalingStatus::Reconnecting);
    assert_eq!(*transport.connects.lock(), 0);

    *transport.fail_connect.lock() = false;
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Reconnected);
    assert_eq!(channel.status(), SignalingStatus::Connected);
    assert!(matches!(
        transport.sent_events().as_slice(),
        [SignalMessage::JoinRoom { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_first_connect_failure_ends_in_failed_after_budget() {
    let transport = Arc::new(FakeSignaling::new());
    *transport.fail_connect.lock() = true;
    let mut channel = channel(&transport);
    let (tx, mut rx) = mpsc::unbounded_channel();

    channel
        .connect(SESSION, "bearer", participant("p1", Role::Presenter, 1), tx, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(next_event(&mut rx).await, SignalingEvent::Failed);
    assert_eq!(channel.status(), SignalingStatus::Failed);
}
