//! Async stream runner.
//!
//! [`spawn`] moves a [`SyncPipeline`] onto a tokio task. Frames arrive on a
//! bounded channel through [`FrameSender`]; metadata publishers hold a
//! [`MetadataPublisher`] and push straight into the lock-free inbox, so they
//! never wait on the frame path.
//!
//! [`RunnerHandle::stop`] is idempotent. The flag is checked between frames,
//! so a frame already being processed always finishes. After a stop the
//! publishers reject further values. Actionable errors (scan overflow, decode
//! bursts) are forwarded on a bounded error channel and never stop the loop;
//! errors that do not fit are logged and counted in
//! [`RunnerHandle::undelivered_errors`].

use crate::association::MetadataInbox;
use crate::error::{SyncError, SyncResult};
use crate::pipeline::SyncPipeline;
use crate::stats::{PipelineStats, StatsSnapshot};
use daq_core::{Frame, MetadataUpdate, MetadataValue, Timestamp};
use daq_storage::SharedCache;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Capacity of the error channel returned by [`spawn`].
pub const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Producer side of the frame channel.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Queue a frame without waiting. A full channel drops the frame.
    pub fn try_send(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(sequence_id = frame.sequence_id, "Frame channel full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a frame, waiting for room. Returns `false` once the runner is gone.
    pub async fn send(&self, frame: Frame) -> bool {
        self.tx.send(frame).await.is_ok()
    }

    /// Frames dropped by [`try_send`](Self::try_send) on a full channel.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the runner has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Cloneable metadata producer.
#[derive(Debug, Clone)]
pub struct MetadataPublisher {
    inbox: Arc<MetadataInbox>,
}

impl MetadataPublisher {
    /// Publisher over a pipeline's inbox.
    pub fn new(inbox: Arc<MetadataInbox>) -> Self {
        Self { inbox }
    }

    /// Push an update. `false` for unknown channels or after stop.
    pub fn publish(&self, update: MetadataUpdate) -> bool {
        self.inbox.push(update)
    }

    /// Push a value with an optional timestamp.
    pub fn publish_value(
        &self,
        channel: impl Into<String>,
        value: impl Into<MetadataValue>,
        timestamp: Option<Timestamp>,
    ) -> bool {
        self.publish(MetadataUpdate {
            channel: channel.into(),
            value: value.into(),
            timestamp,
        })
    }
}

/// Control handle of a running pipeline.
#[derive(Debug)]
pub struct RunnerHandle {
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
    inbox: Arc<MetadataInbox>,
    stats: Arc<PipelineStats>,
    cache: SharedCache,
    undelivered_errors: Arc<AtomicU64>,
    task: JoinHandle<StatsSnapshot>,
}

impl RunnerHandle {
    /// Ask the runner to stop after the current frame. Safe to call repeatedly.
    pub fn stop(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inbox.close();
        self.notify.notify_one();
        tracing::info!("Stream runner stop requested");
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Live statistics.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Cache handle for exporters.
    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    /// Actionable errors lost because the error channel was full or closed.
    pub fn undelivered_errors(&self) -> u64 {
        self.undelivered_errors.load(Ordering::Relaxed)
    }

    /// Wait for the runner to finish and return the final statistics.
    ///
    /// Without [`stop`](Self::stop) this waits until every [`FrameSender`]
    /// is dropped and the channel is drained.
    pub async fn join(self) -> SyncResult<StatsSnapshot> {
        self.task
            .await
            .map_err(|err| SyncError::RunnerTerminated(err.to_string()))
    }
}

/// Everything [`spawn`] hands back.
#[derive(Debug)]
pub struct StreamRunner {
    /// Frame producer.
    pub frames: FrameSender,
    /// Metadata producer; clone it per publishing task.
    pub publisher: MetadataPublisher,
    /// Stop and join control.
    pub handle: RunnerHandle,
    /// Actionable errors raised while processing frames.
    pub errors: mpsc::Receiver<SyncError>,
}

/// Run `pipeline` on a tokio task with a frame channel of `frame_channel_capacity`.
///
/// Must be called from within a tokio runtime.
pub fn spawn(pipeline: SyncPipeline, frame_channel_capacity: usize) -> StreamRunner {
    let (frame_tx, frame_rx) = mpsc::channel(frame_channel_capacity.max(1));
    let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
    let stop = Arc::new(AtomicBool::new(false));
    let notify = Arc::new(Notify::new());
    let inbox = pipeline.inbox();
    let stats = pipeline.stats();
    let cache = pipeline.cache();
    let undelivered_errors = Arc::new(AtomicU64::new(0));

    let task = tokio::spawn(run(
        pipeline,
        frame_rx,
        ErrorSink {
            tx: error_tx,
            undelivered: Arc::clone(&undelivered_errors),
        },
        Arc::clone(&stop),
        Arc::clone(&notify),
    ));

    StreamRunner {
        frames: FrameSender {
            tx: frame_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        publisher: MetadataPublisher::new(Arc::clone(&inbox)),
        handle: RunnerHandle {
            stop,
            notify,
            inbox,
            stats,
            cache,
            undelivered_errors,
            task,
        },
        errors: error_rx,
    }
}

struct ErrorSink {
    tx: mpsc::Sender<SyncError>,
    undelivered: Arc<AtomicU64>,
}

impl ErrorSink {
    fn forward(&self, err: SyncError) {
        if let Err(send_err) = self.tx.try_send(err) {
            let lost = self.undelivered.fetch_add(1, Ordering::Relaxed) + 1;
            let err = match send_err {
                mpsc::error::TrySendError::Full(err)
                | mpsc::error::TrySendError::Closed(err) => err,
            };
            tracing::warn!(
                error = %err,
                lost,
                "Error channel full or closed, error not delivered"
            );
        }
    }
}

async fn run(
    mut pipeline: SyncPipeline,
    mut frames: mpsc::Receiver<Frame>,
    errors: ErrorSink,
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
) -> StatsSnapshot {
    tracing::info!("Stream runner started");
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let frame = tokio::select! {
            biased;
            () = notify.notified() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(err) = pipeline.process_frame(frame) {
            tracing::warn!(error = %err, "Actionable pipeline error");
            errors.forward(err);
        }
    }

    pipeline.inbox().close();
    frames.close();
    let stats = pipeline.stats_snapshot();
    tracing::info!(
        frames_emitted = stats.frames_emitted,
        frames_missed = stats.frames_missed,
        "Stream runner stopped"
    );
    stats
}
