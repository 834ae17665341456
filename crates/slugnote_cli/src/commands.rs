//! Command execution against the local note database.
//!
//! # Responsibility
//! - Resolve this profile's identity once and thread it through every command.
//! - Drive edits through `NoteEditor` so the CLI saves exactly like any
//!   other view: batched, ownership-checked, cache-aware.

use crate::cli::EditArgs;
use async_trait::async_trait;
use log::debug;
use slugnote_core::content::{is_task_line, prefix_lines, toggle_task_checkbox, wrap_selection};
use slugnote_core::db::{open_shared_db, DbError, SharedConnection};
use slugnote_core::identity::{
    CookieJar, FileIdentityStore, IdentityError, IdentityProvider, SessionCookie,
};
use slugnote_core::repo::note_repo::{NoteRepository, RepoError, SqliteNoteRepository};
use slugnote_core::service::note_service::{metadata_for, NoteService, NoteServiceError};
use slugnote_core::sync::dispatcher::{
    CacheError, CommitError, NoteListObserver, RenderCache, SqliteNoteWriter, WriteDispatcher,
};
use slugnote_core::sync::editor::{CommitOutcome, EditorError, EditorEvent, NoteEditor};
use slugnote_core::{AppConfig, Caller, Note, NoteAccess, NotePatch, NotePermissions, SessionId};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const SAVE_GRACE: Duration = Duration::from_secs(5);

/// CLI failures.
#[derive(Debug)]
pub enum CliError {
    Db(DbError),
    Identity(IdentityError),
    Repo(RepoError),
    Service(NoteServiceError),
    Editor(EditorError),
    Save(CommitError),
    /// Missing or not visible to this profile.
    NotFound(String),
    NotEditable(&'static str),
    NothingToEdit,
    /// Background save reported a failure.
    SaveFailed(String),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "database error: {err}"),
            Self::Identity(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Service(err) => write!(f, "{err}"),
            Self::Editor(err) => write!(f, "{err}"),
            Self::Save(err) => write!(f, "{err}"),
            Self::NotFound(slug) => write!(f, "note `{slug}` not found"),
            Self::NotEditable(reason) => write!(f, "cannot edit this note: {reason}"),
            Self::NothingToEdit => write!(f, "no edits given"),
            Self::SaveFailed(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Identity(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Service(err) => Some(err),
            Self::Editor(err) => Some(err),
            Self::Save(err) => Some(err),
            Self::NotFound(_)
            | Self::NotEditable(_)
            | Self::NothingToEdit
            | Self::SaveFailed(_) => None,
        }
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<IdentityError> for CliError {
    fn from(value: IdentityError) -> Self {
        Self::Identity(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<NoteServiceError> for CliError {
    fn from(value: NoteServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<EditorError> for CliError {
    fn from(value: EditorError) -> Self {
        Self::Editor(value)
    }
}

impl From<CommitError> for CliError {
    fn from(value: CommitError) -> Self {
        Self::Save(value)
    }
}

/// A terminal has no cookie store; the identity file is the only copy.
struct TerminalCookies;

impl CookieJar for TerminalCookies {
    fn set_cookie(&self, _cookie: &SessionCookie) -> Result<(), IdentityError> {
        debug!("event=identity_cookie module=cli status=skip reason=no_cookie_store");
        Ok(())
    }
}

/// Resolved profile and database handle shared by every command.
pub struct Context {
    config: AppConfig,
    conn: SharedConnection,
    session_id: SessionId,
    caller: Caller,
}

impl Context {
    pub fn open(config: AppConfig, admin_token: Option<&str>) -> Result<Self, CliError> {
        let identity = IdentityProvider::new(
            FileIdentityStore::new(&config.identity_path),
            TerminalCookies,
            config.secure_cookies,
        );
        let session_id = identity.ensure_identity()?;
        let conn = open_shared_db(&config.db_path)?;

        let mut caller = Caller::with_session(session_id.clone());
        caller.is_admin = admin_token.is_some_and(|token| config.admin_token.verify(token));

        Ok(Self {
            config,
            conn,
            session_id,
            caller,
        })
    }

    fn with_service<T, E: From<RepoError>>(
        &self,
        f: impl FnOnce(&NoteService<SqliteNoteRepository<'_>>) -> Result<T, E>,
    ) -> Result<T, E> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| E::from(RepoError::Unavailable("connection lock poisoned".to_string())))?;
        let repo = SqliteNoteRepository::try_new(&conn).map_err(E::from)?;
        f(&NoteService::new(repo))
    }

    fn open_visible(&self, slug: &str) -> Result<(Note, NotePermissions), CliError> {
        let access =
            self.with_service(|service| Ok::<_, CliError>(service.open_note(slug, &self.caller)?))?;
        match access {
            NoteAccess::Visible { note, permissions } => Ok((note, permissions)),
            NoteAccess::Unavailable => Err(CliError::NotFound(slug.to_string())),
        }
    }
}

pub fn new_note(ctx: &Context) -> Result<(), CliError> {
    let note = ctx.with_service(|service| {
        Ok::<_, CliError>(service.create_note(Some(ctx.session_id.clone()))?)
    })?;
    println!("{}", note.slug);
    Ok(())
}

pub fn show_note(ctx: &Context, slug: &str) -> Result<(), CliError> {
    let (note, _) = ctx.open_visible(slug)?;
    print_note(&note, &ctx.config.site_title);
    Ok(())
}

pub fn list_notes(ctx: &Context, limit: Option<u32>) -> Result<(), CliError> {
    let notes = ctx.with_service(|service| {
        Ok::<_, CliError>(service.list_session_notes(&ctx.session_id, limit)?)
    })?;
    for note in notes {
        let visibility = if note.public { "public" } else { "private" };
        let title = if note.title.is_empty() {
            "new note"
        } else {
            note.title.as_str()
        };
        println!("{}\t{}\t{} {}", note.slug, visibility, note.emoji, title);
    }
    Ok(())
}

pub async fn edit_note(ctx: &Context, args: EditArgs) -> Result<(), CliError> {
    if !args.has_edits() {
        return Err(CliError::NothingToEdit);
    }
    let (note, permissions) = ctx.open_visible(&args.slug)?;
    if text_edit_count(&args) > 0 && !permissions.edit_inline {
        return Err(CliError::NotEditable("owned by another session"));
    }
    if args.public.is_some() && !permissions.toggle_visibility {
        return Err(CliError::NotEditable("visibility needs admin and ownership"));
    }

    let view = Arc::new(TerminalView {
        conn: Arc::clone(&ctx.conn),
        slug: note.slug.clone(),
        site_title: ctx.config.site_title.clone(),
    });
    let dispatcher = WriteDispatcher::new(
        Arc::new(SqliteNoteWriter::new(Arc::clone(&ctx.conn))),
        view.clone(),
    )
    .with_list_observer(view);
    let editor = NoteEditor::new(
        note,
        Some(ctx.session_id.clone()),
        dispatcher,
        ctx.config.debounce,
    )?;
    let mut events = editor.subscribe();

    apply_edits(&editor, &args, &ctx.caller);
    if editor.pending().is_empty() {
        println!("nothing changed");
        return Ok(());
    }

    if args.now {
        report(editor.flush().await?);
        return Ok(());
    }

    let wait = ctx.config.debounce + SAVE_GRACE;
    match tokio::time::timeout(wait, wait_for_save(&mut events)).await {
        Ok(result) => result,
        // Timer-driven commit never reported back; save in the foreground.
        Err(_) => {
            report(editor.flush().await?);
            Ok(())
        }
    }
}

fn text_edit_count(args: &EditArgs) -> usize {
    usize::from(args.title.is_some())
        + usize::from(args.emoji.is_some())
        + usize::from(args.content.is_some())
        + args.append.len()
        + args.format_count()
        + args.check.len()
        + args.uncheck.len()
}

/// Feeds each edit to the editor separately so they coalesce in one save.
fn apply_edits(editor: &NoteEditor, args: &EditArgs, caller: &Caller) {
    if let Some(title) = &args.title {
        editor.apply_update(NotePatch::title(title.as_str()));
    }
    if let Some(emoji) = &args.emoji {
        editor.apply_update(NotePatch::emoji(emoji.as_str()));
    }
    if let Some(content) = &args.content {
        editor.apply_update(NotePatch::content(content.as_str()));
    }
    for line in &args.append {
        let current = editor.current().content;
        let next = if current.is_empty() {
            line.clone()
        } else {
            format!("{current}\n{line}")
        };
        editor.apply_update(NotePatch::content(next));
    }
    for (ranges, marker) in [(&args.bold, "**"), (&args.italic, "_"), (&args.code, "`")] {
        for range in ranges {
            let edit = wrap_selection(&editor.current().content, range.clone(), marker, marker);
            editor.apply_update(edit.into_patch());
        }
    }
    for (ranges, prefix) in [(&args.quote, "> "), (&args.bullet, "- ")] {
        for range in ranges {
            let edit = prefix_lines(&editor.current().content, range.clone(), prefix);
            editor.apply_update(edit.into_patch());
        }
    }
    for (tasks, checked) in [(&args.check, true), (&args.uncheck, false)] {
        for task in tasks {
            let next = toggle_task_checkbox(&editor.current().content, task, checked);
            editor.apply_update(NotePatch::content(next));
        }
    }
    if let Some(public) = args.public {
        if editor.current().public != public {
            editor.toggle_visibility(caller);
        }
    }
}

async fn wait_for_save(events: &mut broadcast::Receiver<EditorEvent>) -> Result<(), CliError> {
    loop {
        match events.recv().await {
            Ok(EditorEvent::Saving { fields }) => {
                debug!("event=cli_save module=cli status=start fields={}", fields.len());
            }
            Ok(EditorEvent::Saved(report)) => {
                println!("saved {} field(s)", report.fields.len());
                return Ok(());
            }
            Ok(EditorEvent::SaveFailed { message, .. }) => {
                return Err(CliError::SaveFailed(message));
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

fn report(outcome: CommitOutcome) {
    match outcome {
        CommitOutcome::Committed(report) => println!("saved {} field(s)", report.fields.len()),
        CommitOutcome::Skipped(reason) => println!("nothing saved ({})", reason.as_str()),
    }
}

fn print_note(note: &Note, site_title: &str) {
    println!("{}", metadata_for(note, site_title).title);
    println!(
        "slug: {}  emoji: {}  {}",
        note.slug,
        note.emoji,
        if note.public { "public" } else { "private" }
    );
    let tasks = note.content.lines().filter(|line| is_task_line(line)).count();
    if tasks > 0 {
        println!("tasks: {tasks}");
    }
    println!();
    println!("{}", note.content);
}

/// The note view of an interactive `edit` run.
struct TerminalView {
    conn: SharedConnection,
    slug: String,
    site_title: String,
}

#[async_trait]
impl RenderCache for TerminalView {
    async fn invalidate(&self, slug: &str) -> Result<(), CacheError> {
        debug!("event=page_invalidate module=cli status=skip slug={slug} reason=no_cache");
        Ok(())
    }

    async fn refresh_current_view(&self) {
        let fresh = self.conn.lock().ok().and_then(|conn| {
            let repo = SqliteNoteRepository::try_new(&conn).ok()?;
            repo.fetch_note_by_slug(&self.slug).ok()?
        });
        match fresh {
            Some(note) => print_note(&note, &self.site_title),
            None => debug!("event=view_refresh module=cli status=error slug={}", self.slug),
        }
    }
}

impl NoteListObserver for TerminalView {
    fn note_list_changed(&self) {
        debug!("event=note_list_changed module=cli status=ok");
    }
}
