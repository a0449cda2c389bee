//! Frame pipeline between a camera-rate producer and the tracking worker.
//!
//! A single slot holds the newest unprocessed frame. Submitting while the slot
//! is occupied replaces the waiting frame (latest wins), so the producer never
//! waits on tracking and the worker never falls behind by more than one frame.
//! Results are delivered on a channel, invalid poses included.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{FrameError, TrackingError, Usage},
    tracking::{
        features::FeatureExtractor,
        frame::Frame,
        matcher::DescriptorMatcher,
        pose::{PoseEstimator, PoseResult},
        session::TrackingSession,
    },
};

/// Released buffers kept around for reuse by the capture layer.
const RECYCLE_CAPACITY: usize = 4;

/// Tracking outcome for one processed frame.
#[derive(Debug, Clone)]
pub struct PoseUpdate {
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub result: PoseResult,
    /// Time from taking the frame out of the slot to the finished result.
    pub latency: Duration,
}

/// Receipt for an accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    pub sequence: u64,
    /// Sequence of the waiting frame this one displaced, if any.
    pub replaced: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub submitted: u64,
    pub replaced: u64,
    pub rejected: u64,
    pub processed: u64,
}

struct Pending {
    sequence: u64,
    frame: Frame,
}

#[derive(Default)]
struct SlotState {
    pending: Option<Pending>,
    next_sequence: u64,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    replaced: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
}

struct Shared {
    slot: Mutex<SlotState>,
    ready: Condvar,
    counters: Counters,
    recycle_tx: Sender<Vec<u8>>,
    recycle_rx: Receiver<Vec<u8>>,
}

impl Shared {
    fn new() -> Arc<Self> {
        let (recycle_tx, recycle_rx) = bounded(RECYCLE_CAPACITY);
        Arc::new(Self {
            slot: Mutex::new(SlotState::default()),
            ready: Condvar::new(),
            counters: Counters::default(),
            recycle_tx,
            recycle_rx,
        })
    }

    /// Blocks until a frame is waiting. `None` once the pipeline is closed.
    fn next_frame(&self) -> Option<Pending> {
        let mut slot = self.slot.lock();
        loop {
            if slot.closed {
                return None;
            }
            if let Some(pending) = slot.pending.take() {
                return Some(pending);
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Closes the slot and drops whatever is still waiting in it.
    fn close(&self) {
        let discarded = {
            let mut slot = self.slot.lock();
            slot.closed = true;
            slot.pending.take()
        };
        self.ready.notify_all();
        if let Some(pending) = discarded {
            self.release(pending.frame.pixels);
        }
    }

    /// Hands a buffer back for reuse; dropped when enough are already waiting.
    fn release(&self, buffer: Vec<u8>) {
        let _ = self.recycle_tx.try_send(buffer);
    }
}

/// Cloneable submission handle for capture threads.
#[derive(Clone)]
pub struct FrameProducer {
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Offers a frame to the worker without waiting for it.
    ///
    /// Malformed buffers are rejected here and never reach feature extraction.
    pub fn submit(&self, frame: Frame) -> Result<FrameTicket, FrameError> {
        let counters = &self.shared.counters;
        if let Err(err) = frame.validate() {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(%err, "dropping malformed frame");
            return Err(err);
        }

        let (sequence, displaced) = {
            let mut slot = self.shared.slot.lock();
            if slot.closed {
                return Err(FrameError::PipelineClosed);
            }
            let sequence = slot.next_sequence;
            slot.next_sequence += 1;
            (sequence, slot.pending.replace(Pending { sequence, frame }))
        };
        self.shared.ready.notify_one();
        counters.submitted.fetch_add(1, Ordering::Relaxed);

        let replaced = displaced.map(|pending| {
            counters.replaced.fetch_add(1, Ordering::Relaxed);
            debug!(sequence = pending.sequence, "frame replaced before processing");
            let replaced = pending.sequence;
            self.shared.release(pending.frame.pixels);
            replaced
        });

        Ok(FrameTicket { sequence, replaced })
    }

    /// A buffer from a processed or replaced frame, ready to be refilled.
    pub fn recycled_buffer(&self) -> Option<Vec<u8>> {
        self.shared.recycle_rx.try_recv().ok()
    }

    pub fn stats(&self) -> PipelineStats {
        let counters = &self.shared.counters;
        PipelineStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            replaced: counters.replaced.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            processed: counters.processed.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().closed
    }
}

/// Owns the tracking worker thread. Dropping the pipeline shuts it down.
pub struct FramePipeline {
    producer: FrameProducer,
    worker: Option<JoinHandle<()>>,
}

impl FramePipeline {
    /// Moves an armed session onto a dedicated worker thread.
    pub fn spawn<X, M, P>(session: TrackingSession<X, M, P>) -> Result<(Self, Receiver<PoseUpdate>), TrackingError>
    where
        X: FeatureExtractor + Send + 'static,
        M: DescriptorMatcher + Send + 'static,
        P: PoseEstimator + Send + 'static,
    {
        if !session.is_armed() {
            return Err(TrackingError::InvalidUsage(Usage::NotInitialized));
        }

        let shared = Shared::new();
        let (results_tx, results_rx) = unbounded();
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("pose-tracking".into())
            .spawn(move || run_worker(worker_shared, session, results_tx))
            .map_err(TrackingError::Worker)?;

        Ok((
            Self {
                producer: FrameProducer { shared },
                worker: Some(worker),
            },
            results_rx,
        ))
    }

    pub fn producer(&self) -> FrameProducer {
        self.producer.clone()
    }

    pub fn submit(&self, frame: Frame) -> Result<FrameTicket, FrameError> {
        self.producer.submit(frame)
    }

    pub fn stats(&self) -> PipelineStats {
        self.producer.stats()
    }

    /// Stops accepting frames and waits for the worker to finish the frame
    /// it is on, if any. Frames still waiting are discarded.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.producer.shared.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("tracking worker panicked");
            }
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<X, M, P>(shared: Arc<Shared>, session: TrackingSession<X, M, P>, results: Sender<PoseUpdate>)
where
    X: FeatureExtractor,
    M: DescriptorMatcher,
    P: PoseEstimator,
{
    info!("tracking worker started");
    while let Some(Pending { sequence, frame }) = shared.next_frame() {
        let started = Instant::now();
        let timestamp_ns = frame.timestamp_ns;

        let (image, released) = match frame.into_upright() {
            Ok(converted) => converted,
            Err(err) => {
                warn!(sequence, %err, "skipping unreadable frame");
                continue;
            }
        };
        if let Some(buffer) = released {
            shared.release(buffer);
        }

        let result = match session.estimate(&image) {
            Ok(result) => result,
            Err(err) => {
                warn!(%err, "tracking session refused frame, stopping");
                break;
            }
        };
        shared.release(image.into_raw());
        shared.counters.processed.fetch_add(1, Ordering::Relaxed);

        let update = PoseUpdate {
            sequence,
            timestamp_ns,
            result,
            latency: started.elapsed(),
        };
        if results.send(update).is_err() {
            debug!("pose receiver dropped");
            break;
        }
    }
    // producers see a closed pipeline from here on
    shared.close();
    info!("tracking worker stopped");
}
