//! Editor facade wiring the edit buffer, commit scheduler and dispatcher.
//!
//! # Responsibility
//! - Accept field-level edits synchronously with optimistic local state.
//! - Re-arm the debounce timer on every edit and commit after the quiet
//!   period, or immediately on `flush`.
//! - Report commit progress through `EditorEvent`s.
//!
//! # Invariants
//! - `apply_update` never awaits and never blocks on I/O.
//! - The pending diff is snapshotted and cleared in the same critical
//!   section that decides to commit; edits arriving during the I/O land in a
//!   fresh diff.
//! - Skipped commits (empty diff, unset note id, no identity) leave the diff
//!   untouched and issue no writes.
//! - Failed commits are neither retried nor merged back.
//! - A commit, once its diff is snapshotted, runs to completion on its own
//!   task; abandoning `flush` does not drop it.

use crate::access::{can_toggle_visibility, Caller};
use crate::identity::SessionId;
use crate::model::note::{Note, NoteField, NoteId, NotePatch};
use crate::sync::dispatcher::{CommitError, CommitReport, WriteDispatcher};
use crate::sync::edit_buffer::EditBuffer;
use crate::sync::scheduler::CommitScheduler;
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why a commit was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyDiff,
    MissingNoteId,
    MissingIdentity,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyDiff => "empty_diff",
            Self::MissingNoteId => "missing_note_id",
            Self::MissingIdentity => "missing_identity",
        }
    }
}

/// Successful commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Skipped(SkipReason),
    Committed(CommitReport),
}

/// Progress notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    Saving { fields: Vec<NoteField> },
    Saved(CommitReport),
    /// Generic "save failed" notification.
    SaveFailed { fields: Vec<NoteField>, message: String },
}

/// Editor construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    /// No tokio runtime is available to drive the commit timer.
    NoRuntime,
}

impl Display for EditorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRuntime => write!(f, "note editor requires a running tokio runtime"),
        }
    }
}

impl Error for EditorError {}

struct EditorState {
    buffer: EditBuffer,
    scheduler: CommitScheduler,
    session_id: Option<SessionId>,
}

struct PreparedCommit {
    note_id: NoteId,
    slug: String,
    session_id: SessionId,
    diff: NotePatch,
}

struct Shared {
    state: Mutex<EditorState>,
    dispatcher: WriteDispatcher,
    runtime: Handle,
    in_flight: AtomicUsize,
    events: broadcast::Sender<EditorEvent>,
}

/// One active editing view over one note.
///
/// Dropping the editor cancels an armed timer; edits still pending at that
/// point are not committed.
pub struct NoteEditor {
    shared: Arc<Shared>,
}

impl NoteEditor {
    /// Creates an editor inside the current tokio runtime.
    ///
    /// `session_id` may be `None` while the identity is still loading; commits
    /// are skipped until one is attached.
    pub fn new(
        note: Note,
        session_id: Option<SessionId>,
        dispatcher: WriteDispatcher,
        debounce: Duration,
    ) -> Result<Self, EditorError> {
        let runtime = Handle::try_current().map_err(|_| EditorError::NoRuntime)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EditorState {
                    buffer: EditBuffer::new(note),
                    scheduler: CommitScheduler::new(debounce),
                    session_id,
                }),
                dispatcher,
                runtime,
                in_flight: AtomicUsize::new(0),
                events,
            }),
        })
    }

    /// Applies an edit optimistically and (re)arms the commit timer.
    pub fn apply_update(&self, update: NotePatch) {
        let weak = Arc::downgrade(&self.shared);
        let mut state = self.shared.lock_state();
        state.buffer.apply_update(update);
        state
            .scheduler
            .arm(&self.shared.runtime, move |generation| fire(weak, generation));
    }

    /// Flips visibility when `caller` may toggle it. Returns whether the edit
    /// was applied.
    pub fn toggle_visibility(&self, caller: &Caller) -> bool {
        let current = self.current();
        if !can_toggle_visibility(&current, caller) {
            return false;
        }
        self.apply_update(NotePatch::public(!current.public));
        true
    }

    /// Cancels any armed timer and commits immediately.
    ///
    /// The commit runs on its own task: dropping the returned future stops
    /// waiting for the result but never cancels the writes.
    pub async fn flush(&self) -> Result<CommitOutcome, CommitError> {
        let prepared = {
            let mut state = self.shared.lock_state();
            state.scheduler.cancel();
            prepare_commit(&mut state)
        };
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(reason) => return Ok(skipped(reason)),
        };

        let fields = prepared.diff.fields();
        let in_flight = InFlight::enter(Arc::clone(&self.shared));
        let task = self.shared.runtime.spawn(dispatch(in_flight, prepared));
        task.await.map_err(|err| CommitError::Interrupted {
            fields,
            reason: err.to_string(),
        })?
    }

    /// Attaches the identity once it has been resolved.
    pub fn attach_identity(&self, session_id: SessionId) {
        self.shared.lock_state().session_id = Some(session_id);
    }

    /// Latest optimistic note state.
    pub fn current(&self) -> Note {
        self.shared.lock_state().buffer.current().clone()
    }

    /// Fields changed since the last commit started.
    pub fn pending(&self) -> NotePatch {
        self.shared.lock_state().buffer.pending().clone()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock_state().scheduler.is_armed()
    }

    /// Whether any commit is currently awaiting the store.
    pub fn is_saving(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.shared.events.subscribe()
    }
}

async fn fire(weak: Weak<Shared>, generation: u64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let prepared = {
        let mut state = shared.lock_state();
        if !state.scheduler.fire(generation) {
            return;
        }
        prepare_commit(&mut state)
    };
    match prepared {
        // Timer-driven commits have no caller; failures surface as events.
        Ok(prepared) => {
            let _ = dispatch(InFlight::enter(shared), prepared).await;
        }
        Err(reason) => {
            skipped(reason);
        }
    }
}

fn skipped(reason: SkipReason) -> CommitOutcome {
    debug!(
        "event=note_commit module=sync status=skip reason={}",
        reason.as_str()
    );
    CommitOutcome::Skipped(reason)
}

fn prepare_commit(state: &mut EditorState) -> Result<PreparedCommit, SkipReason> {
    if !state.buffer.has_pending() {
        return Err(SkipReason::EmptyDiff);
    }
    let note = state.buffer.current();
    if note.id.is_nil() {
        return Err(SkipReason::MissingNoteId);
    }
    let session_id = match state.session_id.as_ref() {
        Some(session_id) if !session_id.is_empty() => session_id.clone(),
        _ => return Err(SkipReason::MissingIdentity),
    };
    let note_id = note.id;
    let slug = note.slug.clone();

    Ok(PreparedCommit {
        note_id,
        slug,
        session_id,
        diff: state.buffer.take_pending(),
    })
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks one commit as in flight until dropped, including when its task is
/// aborted.
struct InFlight(Arc<Shared>);

impl InFlight {
    fn enter(shared: Arc<Shared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn dispatch(
    in_flight: InFlight,
    prepared: PreparedCommit,
) -> Result<CommitOutcome, CommitError> {
    let shared = &in_flight.0;
    let _ = shared.events.send(EditorEvent::Saving {
        fields: prepared.diff.fields(),
    });

    let result = shared
        .dispatcher
        .commit(
            prepared.note_id,
            &prepared.slug,
            &prepared.session_id,
            &prepared.diff,
        )
        .await;

    match result {
        Ok(report) => {
            let _ = shared.events.send(EditorEvent::Saved(report.clone()));
            Ok(CommitOutcome::Committed(report))
        }
        Err(err) => {
            warn!(
                "event=note_save module=sync status=error note_id={} error={}",
                prepared.note_id, err
            );
            let _ = shared.events.send(EditorEvent::SaveFailed {
                fields: err.failed_fields(),
                message: "save failed".to_string(),
            });
            Err(err)
        }
    }
}
