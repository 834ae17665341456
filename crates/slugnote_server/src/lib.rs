//! HTTP surface for slugnote.
//! Handlers stay thin: access decisions, writes and cache invalidation all
//! live in `slugnote_core`.

pub mod api;
pub mod auth;
pub mod cache;

use auth::AdminGate;
use axum::routing::{get, post};
use axum::Router;
use cache::{PageCache, DEFAULT_PAGE_TTL};
use slugnote_core::db::SharedConnection;
use slugnote_core::repo::note_repo::{RepoError, SqliteNoteRepository};
use slugnote_core::service::note_service::NoteService;
use slugnote_core::sync::dispatcher::{SqliteNoteWriter, WriteDispatcher};
use slugnote_core::{AppConfig, SecretToken};
use std::sync::Arc;
use std::time::Duration;

/// Server-only settings derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub revalidate_token: SecretToken,
    pub admin_token: SecretToken,
    pub site_title: String,
    pub secure_cookies: bool,
    pub page_ttl: Duration,
}

impl ServerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            revalidate_token: config.revalidate_token.clone(),
            admin_token: config.admin_token.clone(),
            site_title: config.site_title.clone(),
            secure_cookies: config.secure_cookies,
            page_ttl: DEFAULT_PAGE_TTL,
        }
    }
}

/// Shared handler state.
pub struct AppState {
    conn: SharedConnection,
    pages: Arc<PageCache>,
    dispatcher: WriteDispatcher,
    revalidate_token: SecretToken,
    admin: AdminGate,
    site_title: String,
    secure_cookies: bool,
}

impl AppState {
    pub fn new(conn: SharedConnection, settings: ServerSettings) -> Arc<Self> {
        let pages = Arc::new(PageCache::new(settings.page_ttl));
        let dispatcher = WriteDispatcher::new(
            Arc::new(SqliteNoteWriter::new(Arc::clone(&conn))),
            pages.clone(),
        );
        Arc::new(Self {
            conn,
            pages,
            dispatcher,
            revalidate_token: settings.revalidate_token,
            admin: AdminGate::new(settings.admin_token),
            site_title: settings.site_title,
            secure_cookies: settings.secure_cookies,
        })
    }

    pub fn pages(&self) -> &PageCache {
        &self.pages
    }

    /// Runs `f` against a note service bound to the locked connection on the
    /// blocking pool.
    pub(crate) async fn with_service<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<RepoError> + Send + 'static,
        F: FnOnce(&NoteService<SqliteNoteRepository<'_>>) -> Result<T, E> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| {
                E::from(RepoError::Unavailable("connection lock poisoned".to_string()))
            })?;
            let repo = SqliteNoteRepository::try_new(&conn).map_err(E::from)?;
            f(&NoteService::new(repo))
        })
        .await
        .map_err(|err| E::from(RepoError::Unavailable(format!("store task failed: {err}"))))?
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/notes", get(api::list_public_notes).post(api::create_note))
        .route("/notes/revalidate", post(api::revalidate))
        .route(
            "/notes/{slug}",
            get(api::get_note).patch(api::save_note),
        )
        .route("/notes/{slug}/metadata", get(api::note_metadata))
        .with_state(state)
}
