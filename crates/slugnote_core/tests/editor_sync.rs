use async_trait::async_trait;
use slugnote_core::access::Caller;
use slugnote_core::identity::SessionId;
use slugnote_core::model::note::{FieldWrite, Note, NoteField, NoteId, NotePatch};
use slugnote_core::repo::note_repo::{RepoError, RepoResult};
use slugnote_core::sync::dispatcher::{
    CacheError, CommitError, NoteListObserver, NoteWriter, RenderCache, WriteDispatcher,
};
use slugnote_core::sync::editor::{CommitOutcome, EditorEvent, NoteEditor, SkipReason};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

const DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
enum WriteCall {
    Field(NoteField, String),
    Visibility(bool),
}

#[derive(Default)]
struct RecordingWriter {
    calls: Mutex<Vec<WriteCall>>,
    failing: Mutex<Vec<NoteField>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingWriter {
    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn fail_on(&self, field: NoteField) {
        self.failing.lock().unwrap().push(field);
    }

    fn calls(&self) -> Vec<WriteCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn outcome(&self, field: NoteField) -> RepoResult<()> {
        if self.failing.lock().unwrap().contains(&field) {
            return Err(RepoError::Unavailable(format!("{field} write rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteWriter for RecordingWriter {
    async fn update_note_field(
        &self,
        _note_id: NoteId,
        _session_id: &SessionId,
        write: &FieldWrite,
    ) -> RepoResult<()> {
        self.pass_gate().await;
        self.calls
            .lock()
            .unwrap()
            .push(WriteCall::Field(write.field(), write.value().to_string()));
        self.outcome(write.field())
    }

    async fn update_note_visibility(&self, _note_id: NoteId, public: bool) -> RepoResult<()> {
        self.pass_gate().await;
        self.calls.lock().unwrap().push(WriteCall::Visibility(public));
        self.outcome(NoteField::Public)
    }
}

#[derive(Default)]
struct RecordingCache {
    invalidated: Mutex<Vec<String>>,
    refreshes: AtomicUsize,
}

#[async_trait]
impl RenderCache for RecordingCache {
    async fn invalidate(&self, slug: &str) -> Result<(), CacheError> {
        self.invalidated.lock().unwrap().push(slug.to_string());
        Ok(())
    }

    async fn refresh_current_view(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingList(AtomicUsize);

impl NoteListObserver for CountingList {
    fn note_list_changed(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    editor: NoteEditor,
    writer: Arc<RecordingWriter>,
    cache: Arc<RecordingCache>,
    list: Arc<CountingList>,
}

fn owned_note(session: &str) -> Note {
    Note::with_id(Uuid::new_v4(), Some(SessionId::new(session)), 0)
}

fn harness_with(note: Note, session: Option<&str>, writer: RecordingWriter) -> Harness {
    let writer = Arc::new(writer);
    let cache = Arc::new(RecordingCache::default());
    let list = Arc::new(CountingList::default());
    let dispatcher = WriteDispatcher::new(writer.clone(), cache.clone())
        .with_list_observer(list.clone());
    let editor = NoteEditor::new(note, session.map(SessionId::new), dispatcher, DEBOUNCE)
        .expect("runtime available");
    Harness {
        editor,
        writer,
        cache,
        list,
    }
}

fn harness(note: Note) -> Harness {
    harness_with(note, Some("S1"), RecordingWriter::default())
}

#[tokio::test(start_paused = true)]
async fn edits_inside_the_quiet_period_coalesce_into_one_commit() {
    let mut note = owned_note("S1");
    note.public = true;
    note.title = "Hello".to_string();
    let slug = note.slug.clone();
    let h = harness(note);

    h.editor.apply_update(NotePatch::title("Hello World"));
    assert_eq!(h.editor.current().title, "Hello World");
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.editor.apply_update(NotePatch::emoji("🎉"));
    assert_eq!(h.editor.current().emoji, "🎉");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.writer.calls().is_empty(), "quiet period restarts on each edit");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut calls = h.writer.calls();
    calls.sort_by_key(|call| format!("{call:?}"));
    assert_eq!(
        calls,
        vec![
            WriteCall::Field(NoteField::Emoji, "🎉".to_string()),
            WriteCall::Field(NoteField::Title, "Hello World".to_string()),
        ]
    );
    assert_eq!(*h.cache.invalidated.lock().unwrap(), vec![slug]);
    assert_eq!(h.cache.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.list.0.load(Ordering::SeqCst), 1);
    assert!(h.editor.pending().is_empty());
    assert!(!h.editor.is_armed());
}

#[tokio::test(start_paused = true)]
async fn visibility_commit_skips_invalidation() {
    let h = harness(owned_note("S1"));
    let owner_admin = Caller::with_session(SessionId::new("S1")).admin();

    assert!(h.editor.toggle_visibility(&owner_admin));
    assert!(h.editor.current().public);

    let outcome = h.editor.flush().await.unwrap();
    let CommitOutcome::Committed(report) = outcome else {
        panic!("expected a commit");
    };
    assert_eq!(report.fields, vec![NoteField::Public]);
    assert!(!report.revalidated);
    assert_eq!(h.writer.calls(), vec![WriteCall::Visibility(true)]);
    assert!(h.cache.invalidated.lock().unwrap().is_empty());
    assert_eq!(h.cache.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(h.list.0.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn visibility_toggle_is_refused_without_admin_ownership() {
    let h = harness(owned_note("S1"));

    assert!(!h.editor.toggle_visibility(&Caller::with_session(SessionId::new("S1"))));
    assert!(!h
        .editor
        .toggle_visibility(&Caller::with_session(SessionId::new("S2")).admin()));
    assert!(!h.editor.current().public);
    assert!(h.editor.pending().is_empty());
    assert!(!h.editor.is_armed());
}

#[tokio::test(start_paused = true)]
async fn mixed_diff_with_visibility_still_skips_invalidation() {
    let h = harness(owned_note("S1"));

    h.editor.apply_update(NotePatch::title("shared"));
    h.editor.apply_update(NotePatch::public(true));
    let outcome = h.editor.flush().await.unwrap();

    let CommitOutcome::Committed(report) = outcome else {
        panic!("expected a commit");
    };
    assert_eq!(report.fields, vec![NoteField::Title, NoteField::Public]);
    assert!(!report.revalidated);
    assert_eq!(h.cache.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn partial_failure_fails_the_commit_and_keeps_local_state() {
    let writer = RecordingWriter::default();
    writer.fail_on(NoteField::Content);
    let h = harness_with(owned_note("S1"), Some("S1"), writer);
    let mut events = h.editor.subscribe();

    h.editor.apply_update(NotePatch::title("kept title"));
    h.editor.apply_update(NotePatch::content("kept body"));
    let err = h.editor.flush().await.unwrap_err();

    let CommitError::Persistence { failures } = &err else {
        panic!("expected a persistence failure");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(err.failed_fields(), vec![NoteField::Content]);

    let current = h.editor.current();
    assert_eq!(current.title, "kept title");
    assert_eq!(current.content, "kept body");
    assert!(h.editor.pending().is_empty(), "failed diff is not merged back");
    assert!(h.cache.invalidated.lock().unwrap().is_empty());
    assert_eq!(h.list.0.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.writer.calls().len(), 2, "no retry is scheduled");

    assert!(matches!(events.try_recv(), Ok(EditorEvent::Saving { .. })));
    match events.try_recv() {
        Ok(EditorEvent::SaveFailed { fields, message }) => {
            assert_eq!(fields, vec![NoteField::Content]);
            assert_eq!(message, "save failed");
        }
        other => panic!("expected SaveFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn edits_during_an_in_flight_commit_land_in_the_next_cycle() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with(
        owned_note("S1"),
        Some("S1"),
        RecordingWriter::gated(gate.clone()),
    );

    h.editor.apply_update(NotePatch::title("first"));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(h.editor.is_saving(), "first commit is waiting on the store");

    h.editor.apply_update(NotePatch::content("second"));
    assert_eq!(h.editor.pending(), NotePatch::content("second"));

    gate.add_permits(8);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(
        h.writer.calls(),
        vec![
            WriteCall::Field(NoteField::Title, "first".to_string()),
            WriteCall::Field(NoteField::Content, "second".to_string()),
        ]
    );
    assert!(!h.editor.is_saving());
    assert!(h.editor.pending().is_empty());
    assert_eq!(h.cache.refreshes.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn flush_commits_immediately_and_cancels_the_timer() {
    let h = harness(owned_note("S1"));
    let mut events = h.editor.subscribe();

    h.editor.apply_update(NotePatch::content("now"));
    assert!(h.editor.is_armed());
    let outcome = h.editor.flush().await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(_)));
    assert!(!h.editor.is_armed());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.writer.calls().len(), 1);

    assert_eq!(
        events.try_recv().unwrap(),
        EditorEvent::Saving {
            fields: vec![NoteField::Content]
        }
    );
    assert!(matches!(events.try_recv(), Ok(EditorEvent::Saved(_))));
}

#[tokio::test(start_paused = true)]
async fn empty_diff_commits_nothing() {
    let h = harness(owned_note("S1"));

    let outcome = h.editor.flush().await.unwrap();
    assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::EmptyDiff));

    h.editor.apply_update(NotePatch::title("once"));
    h.editor.flush().await.unwrap();
    let again = h.editor.flush().await.unwrap();
    assert_eq!(again, CommitOutcome::Skipped(SkipReason::EmptyDiff));
    assert_eq!(h.writer.calls().len(), 1);
    assert_eq!(h.cache.invalidated.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_identity_skips_until_attached() {
    let h = harness_with(owned_note("S1"), None, RecordingWriter::default());

    h.editor.apply_update(NotePatch::title("draft"));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(h.writer.calls().is_empty());
    assert_eq!(h.editor.pending(), NotePatch::title("draft"));

    h.editor.attach_identity(SessionId::new("S1"));
    let outcome = h.editor.flush().await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed(_)));
    assert_eq!(
        h.writer.calls(),
        vec![WriteCall::Field(NoteField::Title, "draft".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn unset_note_id_skips_commit() {
    let note = Note::with_id(Uuid::nil(), Some(SessionId::new("S1")), 0);
    let h = harness(note);

    h.editor.apply_update(NotePatch::emoji("🔥"));
    let outcome = h.editor.flush().await.unwrap();
    assert_eq!(outcome, CommitOutcome::Skipped(SkipReason::MissingNoteId));
    assert!(h.writer.calls().is_empty());
    assert_eq!(h.editor.current().emoji, "🔥");
}

#[tokio::test(start_paused = true)]
async fn dropping_the_editor_cancels_the_armed_timer() {
    let h = harness(owned_note("S1"));
    let writer = h.writer.clone();

    h.editor.apply_update(NotePatch::title("lost"));
    drop(h);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(writer.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn abandoned_flush_still_lands_its_writes() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness_with(
        owned_note("S1"),
        Some("S1"),
        RecordingWriter::gated(gate.clone()),
    );
    let mut events = h.editor.subscribe();

    h.editor.apply_update(NotePatch::title("kept"));
    let waited = tokio::time::timeout(Duration::from_millis(10), h.editor.flush()).await;
    assert!(waited.is_err(), "store is still blocked");
    assert!(h.editor.is_saving());
    assert!(h.editor.pending().is_empty());

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
        h.writer.calls(),
        vec![WriteCall::Field(NoteField::Title, "kept".to_string())]
    );
    assert!(!h.editor.is_saving());
    assert!(matches!(events.try_recv(), Ok(EditorEvent::Saving { .. })));
    assert!(matches!(events.try_recv(), Ok(EditorEvent::Saved(_))));
}

#[tokio::test(start_paused = true)]
async fn failed_visibility_write_leaves_text_unwritten() {
    let writer = RecordingWriter::default();
    writer.fail_on(NoteField::Public);
    let h = harness_with(owned_note("S1"), Some("S1"), writer);

    h.editor.apply_update(NotePatch::title("draft"));
    h.editor.apply_update(NotePatch::public(true));
    let err = h.editor.flush().await.unwrap_err();

    assert_eq!(err.failed_fields(), vec![NoteField::Public]);
    assert_eq!(h.writer.calls(), vec![WriteCall::Visibility(true)]);
    assert!(h.editor.current().public, "optimistic state is kept");
}
