//! Progress reporting.
//!
//! Leaf components (image providers, disk upload) report a plain fraction in
//! `[0, 1]` through a [`ProgressSink`]. A pipeline owns one [`StageTracker`]
//! which turns per-stage fractions into one cumulative value using the stage
//! weights and forwards it to a [`Reporter`]. Reporters publish
//! [`BuildEvent`]s on a channel and keep a lock-free [`ProgressBoard`]
//! current for the coordinator.

use crate::build::Stage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

const BOARD_SCALE: f64 = 1_000_000.0;

#[derive(Clone)]
pub struct ProgressSink(Arc<dyn Fn(f64) + Send + Sync>);

impl ProgressSink {
    pub fn new(f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, fraction: f64) {
        (self.0)(clamp(fraction));
    }

    /// Maps `[0, 1]` onto `[start, end]` of this sink.
    pub fn scaled(&self, start: f64, end: f64) -> ProgressSink {
        let parent = self.clone();
        ProgressSink::new(move |fraction| parent.report(start + (end - start) * clamp(fraction)))
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressSink")
    }
}

fn clamp(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    StageStarted { pipeline: usize, stage: Stage },
    Progress { pipeline: usize, fraction: f64 },
    Finished { pipeline: usize, succeeded: bool },
}

/// Per-pipeline fractions readable from any task.
#[derive(Debug)]
pub struct ProgressBoard {
    slots: Vec<AtomicU64>,
}

impl ProgressBoard {
    pub fn new(pipelines: usize) -> Self {
        Self {
            slots: (0..pipelines).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn set(&self, pipeline: usize, fraction: f64) {
        if let Some(slot) = self.slots.get(pipeline) {
            slot.store((clamp(fraction) * BOARD_SCALE).round() as u64, Ordering::Relaxed);
        }
    }

    pub fn get(&self, pipeline: usize) -> f64 {
        self.slots
            .get(pipeline)
            .map(|slot| slot.load(Ordering::Relaxed) as f64 / BOARD_SCALE)
            .unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> Vec<f64> {
        (0..self.slots.len()).map(|i| self.get(i)).collect()
    }

    /// Mean progress over all pipelines.
    pub fn overall(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.snapshot().iter().sum::<f64>() / self.slots.len() as f64
    }
}

/// Where one pipeline publishes its progress.
#[derive(Debug, Clone)]
pub struct Reporter {
    pipeline: usize,
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
    board: Option<Arc<ProgressBoard>>,
}

impl Reporter {
    pub fn new(
        pipeline: usize,
        events: Option<mpsc::UnboundedSender<BuildEvent>>,
        board: Option<Arc<ProgressBoard>>,
    ) -> Self {
        Self {
            pipeline,
            events,
            board,
        }
    }

    pub fn detached() -> Self {
        Self::new(0, None, None)
    }

    pub fn pipeline(&self) -> usize {
        self.pipeline
    }

    pub fn stage_started(&self, stage: Stage) {
        self.emit(BuildEvent::StageStarted {
            pipeline: self.pipeline,
            stage,
        });
    }

    pub fn progress(&self, fraction: f64) {
        if let Some(board) = &self.board {
            board.set(self.pipeline, fraction);
        }
        self.emit(BuildEvent::Progress {
            pipeline: self.pipeline,
            fraction,
        });
    }

    pub fn finished(&self, succeeded: bool) {
        self.emit(BuildEvent::Finished {
            pipeline: self.pipeline,
            succeeded,
        });
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(events) = &self.events {
            // receiver gone means nobody is watching
            let _ = events.send(event);
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Sum of the weights (in percent) of finished stages.
    finished: u32,
    current: Option<Stage>,
    current_fraction: f64,
    last: f64,
}

/// Weighted-stage accumulator owned by one pipeline.
///
/// Values emitted are non-decreasing and reach exactly `1.0` once every
/// stage has completed.
#[derive(Debug, Clone)]
pub struct StageTracker {
    state: Arc<Mutex<TrackerState>>,
    reporter: Reporter,
}

impl StageTracker {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            reporter,
        }
    }

    pub fn begin(&self, stage: Stage) {
        {
            let mut state = self.lock();
            state.current = Some(stage);
            state.current_fraction = 0.0;
        }
        self.reporter.stage_started(stage);
    }

    /// Records sub-progress of the running stage. Reports for any other
    /// stage are ignored.
    pub fn update(&self, stage: Stage, fraction: f64) {
        let value = {
            let mut state = self.lock();
            if state.current != Some(stage) {
                return;
            }
            let fraction = clamp(fraction).max(state.current_fraction);
            state.current_fraction = fraction;
            let value = (f64::from(state.finished) + f64::from(stage.weight()) * fraction) / 100.0;
            let value = value.min(1.0).max(state.last);
            if value == state.last {
                return;
            }
            state.last = value;
            value
        };
        self.reporter.progress(value);
    }

    pub fn complete(&self, stage: Stage) {
        let value = {
            let mut state = self.lock();
            state.finished = (state.finished + stage.weight()).min(100);
            state.current = None;
            state.current_fraction = 0.0;
            let value = (f64::from(state.finished) / 100.0).max(state.last);
            state.last = value;
            value
        };
        self.reporter.progress(value);
    }

    /// Sink that feeds sub-progress of `stage` into this tracker.
    pub fn sink(&self, stage: Stage) -> ProgressSink {
        let tracker = self.clone();
        ProgressSink::new(move |fraction| tracker.update(stage, fraction))
    }

    pub fn value(&self) -> f64 {
        self.lock().last
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
