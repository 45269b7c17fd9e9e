//! Cooperative pause/cancel for a running task, and the status seam.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::info;

use crate::report::StateReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Paused,
    Cancelled,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<RunState>,
    resumed: Condvar,
}

/// Shared pause/resume/cancel handle.
///
/// Clones control the same task. The engine only observes it at
/// [`checkpoint`](TaskControl::checkpoint), between whole move-sense steps.
#[derive(Debug, Clone)]
pub struct TaskControl {
    inner: Arc<Inner>,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskControl {
    /// A handle in the running state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RunState::Running),
                resumed: Condvar::new(),
            }),
        }
    }

    /// Asks the task to stop at its next checkpoint and wait.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if *state == RunState::Running {
            info!("pause requested");
            *state = RunState::Paused;
        }
    }

    /// Releases a paused task.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if *state == RunState::Paused {
            info!("resume requested");
            *state = RunState::Running;
            self.inner.resumed.notify_all();
        }
    }

    /// Asks the task to stop for good. Also releases a paused task.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if *state != RunState::Cancelled {
            info!("cancel requested");
            *state = RunState::Cancelled;
            self.inner.resumed.notify_all();
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.state.lock() == RunState::Cancelled
    }

    /// Whether the task is currently held at a checkpoint or about to be.
    pub fn is_paused(&self) -> bool {
        *self.inner.state.lock() == RunState::Paused
    }

    /// Blocks while paused. Returns `false` once the task has been cancelled.
    pub fn checkpoint(&self) -> bool {
        let mut state = self.inner.state.lock();
        while *state == RunState::Paused {
            self.inner.resumed.wait(&mut state);
        }
        *state != RunState::Cancelled
    }
}

/// Receiver for the engine's status reports.
pub trait StatusSink: Send {
    /// Called after every status transition with a fresh report.
    fn publish(&self, report: StateReport);
}

impl<F> StatusSink for F
where
    F: Fn(StateReport) + Send,
{
    fn publish(&self, report: StateReport) {
        self(report)
    }
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn publish(&self, _report: StateReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_checkpoint_passes_when_running() {
        let control = TaskControl::new();
        assert!(control.checkpoint());
        control.cancel();
        assert!(!control.checkpoint());
        assert!(control.is_cancelled());
        control.resume();
        assert!(control.is_cancelled(), "resume does not undo a cancel");
    }

    #[test]
    fn test_pause_blocks_until_resume() {
        let control = TaskControl::new();
        control.pause();
        assert!(control.is_paused());

        let worker = {
            let control = control.clone();
            thread::spawn(move || control.checkpoint())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished(), "a paused checkpoint must block");
        control.resume();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_cancel_releases_paused_task() {
        let control = TaskControl::new();
        control.pause();
        let worker = {
            let control = control.clone();
            thread::spawn(move || control.checkpoint())
        };
        control.cancel();
        assert!(!worker.join().unwrap());
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |r: StateReport| seen.lock().push(r.status)
        };
        sink.publish(StateReport { status: "hello".into(), ..StateReport::default() });
        NullSink.publish(StateReport::default());
        assert_eq!(*seen.lock(), vec!["hello".to_string()]);
    }
}
