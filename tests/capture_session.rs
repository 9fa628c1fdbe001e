//! End-to-end capture sessions over the synthetic backend.

use std::thread;
use std::time::Duration;

use rtsp_capture::capture::synthetic::{SyntheticBackend, SyntheticEvent, AUDIO_STREAM};
use rtsp_capture::capture::{CaptureState, MediaKind, StreamInfo, EVENT_BACKLOG};
use rtsp_capture::{
    CaptureConfig, CaptureError, CaptureEvent, ConfigError, FrameNotice, RtspCapture,
    TimestampSource,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> CaptureConfig {
    CaptureConfig {
        timestamp_source: TimestampSource::Presentation,
        end_of_stream_backoff_ms: 1,
        ..CaptureConfig::with_url("synthetic://4x4")
    }
}

/// Warm-up frame followed by `count` gray frames.
fn frames(count: u8) -> Vec<SyntheticEvent> {
    (0..=count).map(|i| SyntheticEvent::gray(i * 10)).collect()
}

fn ready_capture(events: Vec<SyntheticEvent>) -> RtspCapture<SyntheticBackend> {
    let mut capture = RtspCapture::new(config()).unwrap();
    capture
        .initialize_with(SyntheticBackend::scripted(4, 4, events))
        .unwrap();
    capture
}

fn next_event(events: &flume::Receiver<CaptureEvent>) -> CaptureEvent {
    events.recv_timeout(EVENT_TIMEOUT).unwrap()
}

#[test]
fn test_start_announces_capture() {
    let mut capture = ready_capture(frames(4));
    assert_eq!(capture.state(), CaptureState::Ready);

    let events = capture.events();
    capture.start_capture().unwrap();
    assert_eq!(capture.state(), CaptureState::Running);
    assert_eq!(
        next_event(&events),
        CaptureEvent::NewFrame(FrameNotice { timestamp: 0 })
    );

    capture.stop_capture();
    assert_eq!(capture.state(), CaptureState::Stopped);
}

#[test]
fn test_frames_arrive_in_order_with_statistics() {
    let mut capture = ready_capture(frames(6));
    let events = capture.events();
    capture.start_capture().unwrap();
    next_event(&events);

    for k in 1..=4u64 {
        let pair = capture.get_frame().unwrap();
        assert_eq!(pair.left_timestamp, k * 40_000);
        assert_eq!(pair.right_timestamp, pair.left_timestamp);
        assert_eq!(pair.dimensions(), (4, 4));
        assert_eq!(pair.left.gray.element(2, 2), u16::from(k as u8 * 10) << 4);

        match next_event(&events) {
            CaptureEvent::Statistics(stats) => {
                assert_eq!(stats.data_size, 0);
                assert_eq!(stats.interframe_delay.is_some(), k > 1);
            }
            other => panic!("expected statistics, got {:?}", other),
        }
        assert_eq!(
            next_event(&events),
            CaptureEvent::NewFrame(FrameNotice {
                timestamp: (k + 2) * 40_000
            })
        );
    }

    capture.stop_capture();
}

#[test]
fn test_next_frame_does_not_consume() {
    let mut capture = ready_capture(frames(4));
    let events = capture.events();
    capture.start_capture().unwrap();
    next_event(&events);

    capture.next_frame().unwrap();
    assert_eq!(
        next_event(&events),
        CaptureEvent::NewFrame(FrameNotice { timestamp: 40_000 })
    );
    capture.next_frame().unwrap();
    assert_eq!(
        next_event(&events),
        CaptureEvent::NewFrame(FrameNotice { timestamp: 40_000 })
    );

    assert_eq!(capture.get_frame().unwrap().left_timestamp, 40_000);
    capture.stop_capture();
}

#[test]
fn test_pause_is_unsupported() {
    let mut capture = ready_capture(frames(2));
    assert!(!capture.support_pause());
    assert!(matches!(
        capture.pause_capture(),
        Err(CaptureError::Unsupported(_))
    ));

    capture.start_capture().unwrap();
    assert!(matches!(
        capture.pause_capture(),
        Err(CaptureError::Unsupported(_))
    ));
    assert_eq!(capture.state(), CaptureState::Running);

    capture.stop_capture();
    assert!(matches!(
        capture.pause_capture(),
        Err(CaptureError::Unsupported(_))
    ));
    assert!(!capture.support_pause());
}

#[test]
fn test_unread_events_stay_bounded() {
    let events = (0..=503u32).map(|i| SyntheticEvent::gray((i % 200) as u8));
    let mut capture = RtspCapture::new(config()).unwrap();
    capture
        .initialize_with(SyntheticBackend::scripted(4, 4, events))
        .unwrap();
    capture.start_capture().unwrap();

    for _ in 0..500 {
        capture.get_frame().unwrap();
    }

    let events = capture.events();
    assert_eq!(events.len(), EVENT_BACKLOG);
    // The newest notice survives: it announces frame 502.
    let last = events.try_iter().last();
    assert_eq!(
        last,
        Some(CaptureEvent::NewFrame(FrameNotice {
            timestamp: 502 * 40_000
        }))
    );

    capture.stop_capture();
}

#[test]
fn test_lifecycle_order_is_enforced() {
    let mut capture = RtspCapture::<SyntheticBackend>::new(config()).unwrap();
    assert!(matches!(
        capture.start_capture(),
        Err(CaptureError::NotInitialized)
    ));

    capture
        .initialize_with(SyntheticBackend::scripted(4, 4, frames(2)))
        .unwrap();
    assert!(matches!(
        capture.initialize_with(SyntheticBackend::scripted(4, 4, frames(2))),
        Err(CaptureError::AlreadyStarted)
    ));

    capture.start_capture().unwrap();
    assert!(matches!(
        capture.start_capture(),
        Err(CaptureError::AlreadyStarted)
    ));

    capture.stop_capture();
    assert!(matches!(
        capture.start_capture(),
        Err(CaptureError::AlreadyStarted)
    ));
}

#[test]
fn test_stream_without_video_fails() {
    let audio_only = SyntheticBackend::scripted(4, 4, []).with_streams(vec![StreamInfo {
        index: AUDIO_STREAM,
        kind: MediaKind::Audio,
        codec: "aac".into(),
        width: 0,
        height: 0,
    }]);

    let mut capture = RtspCapture::new(config()).unwrap();
    assert!(matches!(
        capture.initialize_with(audio_only),
        Err(CaptureError::NoVideoStream { streams: 1 })
    ));
    assert_eq!(capture.state(), CaptureState::Idle);
}

#[test]
fn test_decoder_failure_is_reported() {
    let mut capture = RtspCapture::new(config()).unwrap();
    let backend = SyntheticBackend::scripted(4, 4, frames(2)).with_decoder_failure();
    assert!(matches!(
        capture.initialize_with(backend),
        Err(CaptureError::Decoder(_))
    ));
}

#[test]
fn test_small_queue_is_rejected() {
    let config = CaptureConfig {
        queue_capacity: 1,
        ..config()
    };
    assert!(matches!(
        RtspCapture::<SyntheticBackend>::new(config),
        Err(CaptureError::Config(ConfigError::QueueTooSmall(1)))
    ));
}

#[test]
fn test_shutdown_releases_blocked_consumer() {
    // Only the warm-up frame: the consumer waits forever without shutdown.
    let mut capture = ready_capture(frames(0));
    let shutdown = capture.shutdown_handle();
    capture.start_capture().unwrap();

    let consumer = thread::spawn(move || {
        let result = capture.get_frame();
        capture.stop_capture();
        result
    });

    thread::sleep(Duration::from_millis(100));
    shutdown.shutdown();

    let result = consumer.join().unwrap();
    assert!(matches!(result, Err(CaptureError::Closed)));
}

#[test]
fn test_initialize_from_locator() {
    let mut capture =
        RtspCapture::<SyntheticBackend>::new(CaptureConfig::with_url("synthetic://8x6@200"))
            .unwrap();
    capture.initialize().unwrap();
    capture.start_capture().unwrap();

    let pair = capture.get_frame().unwrap();
    assert_eq!(pair.dimensions(), (8, 6));
    assert!(pair.left_timestamp > 0);

    capture.stop_capture();
}

#[test]
fn test_bad_locator_fails_to_open() {
    let mut capture =
        RtspCapture::<SyntheticBackend>::new(CaptureConfig::with_url("synthetic://nope"))
            .unwrap();
    assert!(matches!(
        capture.initialize(),
        Err(CaptureError::Open { .. })
    ));
}
