mod common;

use classroom_engine::device::TrackKind;
use classroom_engine::error::SessionError;
use classroom_engine::media::{ConnectionIndicator, ConnectionState, MediaSessionClient, TrackRegistry, RemoteTrack, RenderTarget};
use classroom_engine::model::{Identity, Role};
use common::{device, test_config, FakeMedia, Timeline};
use std::sync::Arc;
use tokio::sync::mpsc;

fn identity() -> Identity {
    Identity {
        user_id: "p1".to_string(),
        display_name: "P1".to_string(),
        role: Role::Presenter,
    }
}

fn client(media: Arc<FakeMedia>) -> MediaSessionClient {
    MediaSessionClient::new(media, test_config().media)
}

#[tokio::test]
async fn test_reconnecting_indicator_gated_on_first_connect() {
    let media = Arc::new(FakeMedia::new(Timeline::default()));
    let client = client(media);

    // Startup noise before the first successful join
    assert_eq!(client.on_connection_state(ConnectionState::Connecting), None);

    let (tx, _rx) = mpsc::unbounded_channel();
    client.join("room", "token", &identity(), tx).await.unwrap();
    assert!(client.has_connected());

    assert_eq!(
        client.on_connection_state(ConnectionState::Connecting),
        Some(ConnectionIndicator::Reconnecting)
    );
    assert_eq!(
        client.on_connection_state(ConnectionState::Connected),
        Some(ConnectionIndicator::Connected)
    );
    assert_eq!(
        client.on_connection_state(ConnectionState::Disconnected),
        Some(ConnectionIndicator::Disconnected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_retries_network_errors_but_not_auth() {
    let timeline = Timeline::default();
    let media = Arc::new(FakeMedia::new(timeline.clone()));
    *media.join_failures.lock() = 2;
    let client = client(Arc::clone(&media));

    let (tx, _rx) = mpsc::unbounded_channel();
    assert_eq!(client.join("room", "token", &identity(), tx.clone()).await.unwrap(), 1);
    assert_eq!(client.local_transport_id(), Some(1));

    let rejected = Arc::new(FakeMedia::new(Timeline::default()));
    *rejected.reject_join.lock() = true;
    let client = self::client(rejected);
    let err = client.join("room", "stale", &identity(), tx).await.unwrap_err();
    assert!(matches!(err, SessionError::AuthExpired));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_retries_once_when_stream_not_ready() {
    let media = Arc::new(FakeMedia::new(Timeline::default()));
    media.not_ready.lock().insert((2, TrackKind::Video), 1);
    let client = client(Arc::clone(&media));

    let track = client.subscribe(2, TrackKind::Video).await.unwrap();
    assert_eq!(track.map(|t| t.transport_id), Some(2));
    assert_eq!(*media.subscribe_calls.lock(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_gives_up_after_single_retry() {
    let media = Arc::new(FakeMedia::new(Timeline::default()));
    media.not_ready.lock().insert((3, TrackKind::Audio), 5);
    let client = client(Arc::clone(&media));

    assert_eq!(client.subscribe(3, TrackKind::Audio).await.unwrap(), None);
    assert_eq!(*media.subscribe_calls.lock(), 2);
}

#[tokio::test]
async fn test_publish_skips_already_published_track() {
    let timeline = Timeline::default();
    let media = Arc::new(FakeMedia::new(timeline.clone()));
    let client = client(media);
    let mic = classroom_engine::device::LocalTrack::new(
        TrackKind::Audio,
        &device("mic-1", "Mic", TrackKind::Audio, None),
    );

    client.publish(std::slice::from_ref(&mic)).await.unwrap();
    client.publish(std::slice::from_ref(&mic)).await.unwrap();

    assert_eq!(timeline.entries(), vec!["publish:mic-1"]);
    assert_eq!(client.published_tracks(), vec![mic.clone()]);

    client.leave().await.unwrap();
    assert_eq!(
        timeline.entries(),
        vec!["publish:mic-1".to_string(), format!("unpublish:{}", mic.id), "leave".to_string()]
    );
    assert!(client.published_tracks().is_empty());
}

#[tokio::test]
async fn test_remote_mute_reports_unsupported() {
    let media = Arc::new(FakeMedia {
        remote_mute: false,
        ..FakeMedia::new(Timeline::default())
    });
    let client = client(Arc::clone(&media));

    assert!(!client.mute_remote(3).await.unwrap());
    assert!(media.muted.lock().is_empty());
}

#[test]
fn test_registry_keys_tracks_by_transport_id() {
    let mut registry = TrackRegistry::new();
    registry.insert_remote(RemoteTrack {
        transport_id: 7,
        kind: TrackKind::Video,
        track_id: "v7".to_string(),
    });
    registry.insert_remote(RemoteTrack {
        transport_id: 7,
        kind: TrackKind::Audio,
        track_id: "a7".to_string(),
    });
    registry.register_target("p7", RenderTarget("tile".to_string()));

    assert!(registry.has_track(7, TrackKind::Video));
    assert_eq!(registry.target_for("p7"), Some(&RenderTarget("tile".to_string())));

    let removed = registry.remove_transport(7);
    assert_eq!(removed.len(), 2);
    assert!(!registry.has_track(7, TrackKind::Audio));

    registry.clear();
    assert_eq!(registry.target_for("p7"), None);
}
