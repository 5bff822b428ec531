// THEORY:
// The parallel pipeline produces exactly the same reports as `ShapePipeline`,
// but spreads the per-frame detection work over the blocking thread pool.
//
// Per frame:
// 1.  **Prepare**: thresholding and contour extraction run as one blocking task.
// 2.  **Fan out**: every pattern and every template becomes its own blocking
//     task, at most `concurrency` (default: the CPU count) in flight at once.
//     Results are collected in job order, not completion order, so the
//     detection list is identical to the sequential one.
// 3.  **Fan in**: the tracker is updated once, on the calling task. It is never
//     shared with workers; only the read-only `DetectionStages` is.
//
// A job that panics surfaces as a `JoinError` and is contained exactly like a
// pattern that returned an error.
//
// `spawn_frame_stream` wraps all of this in a tokio task fed by an mpsc channel.
// Frames are processed strictly one at a time in arrival order and each report
// is published on a broadcast channel. Dropping the frame sender ends the task,
// which hands the pipeline back through its join handle.

use crate::config::PipelineConfig;
use crate::core_modules::detection::Detection;
use crate::core_modules::frame::Frame;
use crate::core_modules::shape_classifier::Classification;
use crate::core_modules::tracker::{TrackedShape, Tracker};
use crate::error::Result;
use crate::pipeline::{DetectionJob, DetectionStages, FrameReport, PreparedFrame, ShapePipeline};
use futures::stream::{self, StreamExt};
use log::{trace, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{self, JoinError, JoinHandle};

type JobOutcome = std::result::Result<Result<Vec<Detection>>, JoinError>;

pub struct ParallelPipeline {
    stages: Arc<DetectionStages>,
    tracker: Tracker,
    concurrency: usize,
}

impl From<ShapePipeline> for ParallelPipeline {
    fn from(pipeline: ShapePipeline) -> Self {
        Self {
            stages: Arc::new(pipeline.stages),
            tracker: pipeline.tracker,
            concurrency: num_cpus::get().max(1),
        }
    }
}

impl ParallelPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(Self::from(ShapePipeline::new(config)?))
    }

    /// Caps the number of detection jobs in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn process_frame(&mut self, frame: Frame) -> FrameReport {
        let timestamp = frame.timestamp;

        // --- 1. Prepare ---
        let stages = Arc::clone(&self.stages);
        let prepared = match task::spawn_blocking(move || stages.prepare(&frame)).await {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("frame {}ms: preprocessing task failed: {}", timestamp, err);
                PreparedFrame::default()
            }
        };
        let contour_count = prepared.contours.len();
        let prepared = Arc::new(prepared);

        // --- 2. Fan out ---
        let outcomes: Vec<(DetectionJob, JobOutcome)> = stream::iter(self.stages.jobs())
            .map(|job| {
                let stages = Arc::clone(&self.stages);
                let prepared = Arc::clone(&prepared);
                async move {
                    let outcome = task::spawn_blocking(move || stages.run_job(job, &prepared, timestamp)).await;
                    (job, outcome)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        // --- 3. Fan in ---
        let mut classification = Classification::default();
        for (job, outcome) in outcomes {
            let id = self.stages.job_id(job);
            match outcome {
                Ok(result) => classification.absorb(id, result),
                Err(err) => {
                    warn!("pattern `{}` task failed for this frame: {}", id, err);
                    classification.faulted.push(id.to_string());
                }
            }
        }

        let snapshot = self.tracker.update(&classification.detections, timestamp);
        trace!(
            "frame {}ms: {} contours, {} detections, {} tracked",
            timestamp,
            contour_count,
            classification.detections.len(),
            self.tracker.len()
        );
        self.stages.report(timestamp, contour_count, classification, snapshot)
    }

    pub fn tracked_shapes(&self) -> impl Iterator<Item = &TrackedShape> {
        self.tracker.shapes()
    }
}

/// Drives `pipeline` from `frames` on a background task, one frame at a time.
///
/// The returned receiver is subscribed before the task starts, so it sees every
/// report as long as it keeps up within `capacity`.
pub fn spawn_frame_stream(
    mut pipeline: ParallelPipeline,
    mut frames: mpsc::Receiver<Frame>,
    capacity: usize,
) -> (JoinHandle<ParallelPipeline>, broadcast::Receiver<FrameReport>) {
    let (reports_tx, reports_rx) = broadcast::channel::<FrameReport>(capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let report = pipeline.process_frame(frame).await;
            if reports_tx.send(report).is_err() {
                trace!("no report subscribers");
            }
        }
        pipeline
    });
    (handle, reports_rx)
}
