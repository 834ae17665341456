//! Trailing-edge debounce timer for note commits.
//!
//! # Responsibility
//! - Own the single active commit timer of one editor.
//! - Model debounce as an explicit `Idle` / `Armed` state machine.
//!
//! # Invariants
//! - At most one timer is armed at a time; arming aborts the previous one.
//! - A timer that has fired is detached before its commit does any I/O, so
//!   re-arming never cancels an in-flight commit.
//! - A fire from a superseded timer (stale generation) is ignored.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default quiet period before buffered edits are committed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Scheduler state.
#[derive(Debug, Default)]
pub enum SchedulerState {
    /// No timer running.
    #[default]
    Idle,
    /// A debounce timer is running.
    Armed {
        generation: u64,
        timer: JoinHandle<()>,
    },
}

/// Debounce state machine with one owned timer handle.
#[derive(Debug)]
pub struct CommitScheduler {
    delay: Duration,
    state: SchedulerState,
    last_generation: u64,
}

impl CommitScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: SchedulerState::Idle,
            last_generation: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, SchedulerState::Armed { .. })
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Idle -> Armed or Armed -> Armed: aborts any running timer and starts a
    /// new one that calls `on_fire(generation)` after the quiet period.
    ///
    /// Returns the generation of the new timer.
    pub fn arm<F, Fut>(&mut self, runtime: &Handle, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        self.last_generation += 1;
        let generation = self.last_generation;
        let delay = self.delay;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation).await;
        });

        self.state = SchedulerState::Armed { generation, timer };
        generation
    }

    /// Armed -> Idle on timer expiry.
    ///
    /// Detaches (does not abort) the firing task. Returns `false` when
    /// `generation` is not the currently armed timer.
    pub fn fire(&mut self, generation: u64) -> bool {
        match self.state {
            SchedulerState::Armed {
                generation: armed, ..
            } if armed == generation => {
                self.state = SchedulerState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Armed -> Idle on explicit flush: aborts the running timer.
    ///
    /// Returns whether a timer was cancelled.
    pub fn cancel(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            SchedulerState::Armed { timer, .. } => {
                timer.abort();
                true
            }
            SchedulerState::Idle => false,
        }
    }
}

impl Drop for CommitScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
