// ===========================================================================
// Progress reporting and cooperative cancellation
// ===========================================================================

use crate::error::{CleanError, CleanResult};
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Terminal state of a cleaning job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Done,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Overall completion, 0..=100, never decreasing.
    Percent(u8),
    Finished(JobStatus),
}

/// Shared flag a caller sets to ask a running job to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handed to every pass. `step` is called at the top of each unit of work:
/// it fails with `Cancelled` once the flag is set, and otherwise maps the
/// pass-local fraction into the job-wide percentage.
pub struct ProgressReporter {
    tx: Option<Sender<ProgressEvent>>,
    cancel: CancelFlag,
    stage: (f64, f64),
    last: Option<u8>,
}

impl ProgressReporter {
    pub fn new(tx: Sender<ProgressEvent>, cancel: CancelFlag) -> Self {
        Self {
            tx: Some(tx),
            cancel,
            stage: (0.0, 100.0),
            last: None,
        }
    }

    /// Reporter with no listener and a flag nobody else holds.
    pub fn silent() -> Self {
        Self {
            tx: None,
            cancel: CancelFlag::new(),
            stage: (0.0, 100.0),
            last: None,
        }
    }

    /// Create a reporter together with the receiving end of its channel.
    pub fn channel(cancel: CancelFlag) -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = unbounded();
        (Self::new(tx, cancel), rx)
    }

    /// Route subsequent `step` calls into the `start..end` percent range.
    pub fn begin_stage(&mut self, start: f64, end: f64) {
        let start = start.clamp(0.0, 100.0);
        self.stage = (start, end.clamp(start, 100.0));
        self.emit(self.stage.0);
    }

    /// Check for cancellation without reporting progress.
    pub fn checkpoint(&self) -> CleanResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CleanError::Cancelled);
        }
        Ok(())
    }

    /// Unit `done` of `total` in the current stage is about to start.
    pub fn step(&mut self, done: usize, total: usize) -> CleanResult<()> {
        self.checkpoint()?;
        let fraction = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        let (start, end) = self.stage;
        self.emit(start + (end - start) * fraction.clamp(0.0, 1.0));
        Ok(())
    }

    pub fn finish(&mut self, status: JobStatus) {
        if status == JobStatus::Done {
            self.emit(100.0);
        }
        if let Some(tx) = &self.tx {
            // a vanished listener is not the worker's problem
            let _ = tx.send(ProgressEvent::Finished(status));
        }
    }

    fn emit(&mut self, percent: f64) {
        let percent = percent.floor().clamp(0.0, 100.0) as u8;
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent::Percent(percent));
        }
    }
}
