mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::synthetic_image::uniform_buffer;
use crossbeam_channel::RecvTimeoutError;
use image::GrayImage;
use parking_lot::Mutex;
use planar_tracker::config::CameraConfig;
use planar_tracker::tracking::features::OrbFeature;
use planar_tracker::{
    BruteForceMatcher, FeatureExtractor, FeatureSet, Frame, FrameError, FramePipeline, HomographyPoseEstimator,
    Keypoint, PoseStatus, TrackingSession,
};

const REFERENCE_SIZE: u32 = 64;

/// What the worker handed to the extractor for one live frame.
#[derive(Debug, Clone, Copy)]
struct Seen {
    value: u8,
    uniform: bool,
    dimensions: (u32, u32),
}

/// Returns fixed features for the reference and records every live frame,
/// taking `delay` per frame to stand in for real extraction.
struct Probe {
    delay: Duration,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl FeatureExtractor for Probe {
    fn extract(&self, image: &GrayImage) -> FeatureSet {
        let (width, height) = image.dimensions();
        if width == REFERENCE_SIZE && height == REFERENCE_SIZE {
            let features = (0..12u8)
                .map(|i| OrbFeature {
                    keypoint: Keypoint {
                        x: 4.0 * i as f32,
                        y: 2.0 * i as f32,
                        ..Default::default()
                    },
                    descriptor: [i; 32],
                })
                .collect();
            return FeatureSet::new(features, width, height);
        }

        thread::sleep(self.delay);
        let raw = image.as_raw();
        self.seen.lock().push(Seen {
            value: raw[0],
            uniform: raw.iter().all(|&p| p == raw[0]),
            dimensions: (width, height),
        });
        FeatureSet::new(Vec::new(), width, height)
    }
}

fn armed_session(delay: Duration) -> (TrackingSession<Probe>, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let probe = Probe {
        delay,
        seen: seen.clone(),
    };
    let mut session = TrackingSession::with_components(
        probe,
        BruteForceMatcher::default(),
        HomographyPoseEstimator::default(),
        CameraConfig::default(),
        1.0,
    );
    session
        .initialize(&GrayImage::new(REFERENCE_SIZE, REFERENCE_SIZE))
        .unwrap();
    (session, seen)
}

fn uniform_frame(value: u8, sequence: u64) -> Frame {
    Frame::new(uniform_buffer(32, 32, value), 32, 32, sequence)
}

#[test]
fn slow_worker_only_sees_the_latest_frames() {
    const FRAMES: u64 = 40;
    let (session, seen) = armed_session(Duration::from_millis(15));
    let (pipeline, updates) = FramePipeline::spawn(session).unwrap();

    let producer = pipeline.producer();
    let capture = thread::spawn(move || {
        for sequence in 0..FRAMES {
            let ticket = producer.submit(uniform_frame(sequence as u8, sequence)).unwrap();
            assert_eq!(ticket.sequence, sequence);
            thread::sleep(Duration::from_millis(2));
        }
    });

    let mut delivered = Vec::new();
    loop {
        let update = updates.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.result.status, PoseStatus::InsufficientMatches);
        assert_eq!(update.timestamp_ns, update.sequence);
        let last = update.sequence == FRAMES - 1;
        delivered.push(update.sequence);
        if last {
            break;
        }
    }
    capture.join().unwrap();

    assert!((delivered.len() as u64) < FRAMES, "{delivered:?}");
    assert!(delivered.windows(2).all(|w| w[0] < w[1]), "{delivered:?}");

    // no frame was torn or mixed with another one
    let seen = seen.lock().clone();
    assert_eq!(seen.len(), delivered.len());
    for (frame, sequence) in seen.iter().zip(&delivered) {
        assert!(frame.uniform);
        assert_eq!(frame.value, *sequence as u8);
        assert_eq!(frame.dimensions, (32, 32));
    }

    let stats = pipeline.stats();
    assert_eq!(stats.submitted, FRAMES);
    assert_eq!(stats.processed, delivered.len() as u64);
    assert_eq!(stats.replaced + stats.processed, FRAMES);
    assert_eq!(stats.rejected, 0);
    assert!(pipeline.producer().recycled_buffer().is_some_and(|b| b.len() == 32 * 32));

    let producer = pipeline.producer();
    pipeline.shutdown();
    assert_eq!(producer.submit(uniform_frame(0, 0)), Err(FrameError::PipelineClosed));
}

#[test]
fn shutdown_waits_for_the_frame_in_progress() {
    let (session, seen) = armed_session(Duration::from_millis(150));
    let (pipeline, updates) = FramePipeline::spawn(session).unwrap();

    pipeline.submit(uniform_frame(1, 0)).unwrap();
    // give the worker time to pick the first frame up
    thread::sleep(Duration::from_millis(50));
    pipeline.submit(uniform_frame(2, 1)).unwrap();

    let started = Instant::now();
    pipeline.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));

    // the frame in progress is delivered, the waiting one is discarded
    assert_eq!(updates.recv().map(|u| u.sequence), Ok(0));
    assert!(updates.recv().is_err());
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn rotated_frames_reach_the_extractor_upright() {
    let (session, seen) = armed_session(Duration::ZERO);
    let (pipeline, updates) = FramePipeline::spawn(session).unwrap();

    let frame = Frame::with_rotation_degrees(vec![5; 48 * 16], 48, 16, 0, 90).unwrap();
    pipeline.submit(frame).unwrap();
    updates.recv_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(seen.lock()[0].dimensions, (16, 48));
}

#[test]
fn malformed_frames_are_rejected_at_submit() {
    let (session, seen) = armed_session(Duration::ZERO);
    let (pipeline, updates) = FramePipeline::spawn(session).unwrap();

    let err = pipeline.submit(Frame::new(vec![0; 5], 32, 32, 0)).unwrap_err();
    assert!(matches!(err, FrameError::SizeMismatch { actual: 5, .. }));
    assert!(matches!(
        pipeline.submit(Frame::new(Vec::new(), 0, 0, 0)),
        Err(FrameError::EmptyFrame)
    ));

    assert_eq!(
        updates.recv_timeout(Duration::from_millis(100)).map(|u| u.sequence),
        Err(RecvTimeoutError::Timeout)
    );
    assert_eq!(pipeline.stats().rejected, 2);
    assert!(seen.lock().is_empty());
}

#[test]
fn dropped_receiver_closes_the_pipeline() {
    let (session, _seen) = armed_session(Duration::ZERO);
    let (pipeline, updates) = FramePipeline::spawn(session).unwrap();
    drop(updates);

    let producer = pipeline.producer();
    producer.submit(uniform_frame(3, 0)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !producer.is_closed() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(producer.is_closed());
    assert_eq!(producer.submit(uniform_frame(4, 1)), Err(FrameError::PipelineClosed));
}
