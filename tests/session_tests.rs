// Session lifecycle tests against an in-memory transport.

mod common;

use common::{live_config, TestTransport};
use echosense::audio::mime_type;
use echosense::{EncodedChunk, LiveSession, ServerEvent, SessionState, TransportEvent};

#[tokio::test]
async fn test_open_resolves_on_ready_ack() {
    let (transport, mut accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();

    assert_eq!(handle.state(), SessionState::Open);

    let conn = accepted.recv().await.unwrap();
    let setup: serde_json::Value = serde_json::from_str(&conn.setup).unwrap();
    assert_eq!(setup["setup"]["model"], "models/test");
}

#[tokio::test]
async fn test_open_fails_when_transport_refuses() {
    let (transport, _accepted) = TestTransport::failing();
    let result = LiveSession::open(transport.as_ref(), &live_config()).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_open_times_out_without_ack() {
    let (transport, _accepted) = TestTransport::silent();
    let result = LiveSession::open(transport.as_ref(), &live_config()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_chunks_reach_the_wire_in_order() {
    let (transport, mut accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    let mut conn = accepted.recv().await.unwrap();

    for data in [vec![1u8, 2], vec![3, 4], vec![5, 6]] {
        handle.send(EncodedChunk {
            data,
            mime_type: mime_type(16000),
        });
    }

    for expected in ["AQI=", "AwQ=", "BQY="] {
        let message = conn.sent.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value["media"]["data"], expected);
        assert_eq!(value["media"]["mimeType"], "audio/pcm;rate=16000");
    }
}

#[tokio::test]
async fn test_events_end_with_closed_on_remote_close() {
    let (transport, mut accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    let conn = accepted.recv().await.unwrap();

    conn.inbound
        .send(TransportEvent::Message(
            r#"{"serverContent":{"inputTranscription":{"text":"hi"}}}"#.to_string(),
        ))
        .await
        .unwrap();
    drop(conn); // remote hangs up

    let mut events = handle.events().unwrap();
    assert_eq!(events.recv().await, Some(ServerEvent::Connected));
    assert_eq!(
        events.recv().await,
        Some(ServerEvent::PartialTranscript("hi".into()))
    );
    assert_eq!(events.recv().await, Some(ServerEvent::Closed));
    assert_eq!(events.recv().await, None);
    assert_eq!(handle.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_decode_anomaly_does_not_kill_the_loop() {
    let (transport, mut accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    let conn = accepted.recv().await.unwrap();

    conn.inbound
        .send(TransportEvent::Message("definitely not json".to_string()))
        .await
        .unwrap();
    conn.inbound
        .send(TransportEvent::Message(
            r#"{"serverContent":{"turnComplete":true}}"#.to_string(),
        ))
        .await
        .unwrap();

    let mut events = handle.events().unwrap();
    assert_eq!(events.recv().await, Some(ServerEvent::Connected));
    assert_eq!(events.recv().await, Some(ServerEvent::TurnComplete));
}

#[tokio::test]
async fn test_transport_error_becomes_error_event() {
    let (transport, mut accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    let conn = accepted.recv().await.unwrap();

    conn.inbound
        .send(TransportEvent::Error("socket reset".to_string()))
        .await
        .unwrap();

    let mut events = handle.events().unwrap();
    assert_eq!(events.recv().await, Some(ServerEvent::Connected));
    assert_eq!(
        events.recv().await,
        Some(ServerEvent::Error("socket reset".into()))
    );
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (transport, _accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    let mut events = handle.events().unwrap();

    handle.close();
    handle.close();
    handle.close();
    assert_eq!(handle.state(), SessionState::Closed);

    // Exactly one terminal Closed, then the sequence ends
    let mut closed_count = 0;
    while let Some(event) = events.recv().await {
        if event == ServerEvent::Closed {
            closed_count += 1;
        }
    }
    assert_eq!(closed_count, 1);
}

#[tokio::test]
async fn test_send_after_close_is_dropped_quietly() {
    let (transport, mut accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    let mut conn = accepted.recv().await.unwrap();

    handle.close();
    handle.send(EncodedChunk {
        data: vec![1, 2, 3],
        mime_type: mime_type(16000),
    });

    // The writer is gone, so the wire sees nothing new
    assert!(conn.sent.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_close_with_backlogged_events_still_ends_the_sequence() {
    let (transport, mut accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    let mut events = handle.events().unwrap();
    let conn = accepted.recv().await.unwrap();

    // Back the consumer up far past the event queue's capacity
    for i in 0..70 {
        conn.inbound
            .send(TransportEvent::Message(format!(
                r#"{{"serverContent":{{"inputTranscription":{{"text":"w{}"}}}}}}"#,
                i
            )))
            .await
            .unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    handle.close();

    // No room left for the Closed marker, but the sequence still ends
    let mut drained = 0;
    while events.recv().await.is_some() {
        drained += 1;
    }
    assert_eq!(drained, 64);
    assert_eq!(handle.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_events_can_only_be_taken_once() {
    let (transport, _accepted) = TestTransport::ready();
    let handle = LiveSession::open(transport.as_ref(), &live_config())
        .await
        .unwrap();
    assert!(handle.events().is_some());
    assert!(handle.events().is_none());
}
