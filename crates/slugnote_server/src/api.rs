//! HTTP handlers and response envelopes.
//!
//! # Responsibility
//! - Map note use cases to JSON endpoints.
//! - Convert core errors into stable status codes and bodies.
//!
//! # Invariants
//! - Handlers never panic.
//! - A denied note and a missing note produce byte-identical responses.
//! - Store calls run on the blocking pool; the connection lock is never
//!   held across an `.await`.
//! - A visibility change purges the cached render of that note.

use crate::auth::RequestCaller;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use slugnote_core::identity::SessionCookie;
use slugnote_core::model::note::normalize_slug;
use slugnote_core::repo::note_repo::RepoError;
use slugnote_core::service::note_service::{NoteServiceError, NOT_FOUND_TITLE};
use slugnote_core::{
    resolve_access, Caller, CommitError, Note, NoteAccess, NoteField, NoteMetadata, NotePatch,
    NotePermissions, SessionId,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const REVALIDATE_TOKEN_HEADER: &str = "x-revalidate-token";

/// Handler error mapped to a status code and JSON body.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or denied note. Carries no reason.
    NotFound,
    BadRequest(String),
    Unauthorized,
    Forbidden,
    SaveFailed(Vec<NoteField>),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": NOT_FOUND_TITLE }))).into_response()
            }
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid token" }))).into_response()
            }
            Self::Forbidden => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": "not allowed" }))).into_response()
            }
            Self::SaveFailed(fields) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "save failed", "fields": fields })),
            )
                .into_response(),
            Self::Internal(message) => {
                error!("event=http_request module=api status=error error={message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<NoteServiceError> for ApiError {
    fn from(value: NoteServiceError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<CommitError> for ApiError {
    fn from(value: CommitError) -> Self {
        Self::SaveFailed(value.failed_fields())
    }
}

/// Public note listing.
#[derive(Debug, Serialize)]
pub struct PublicNotesResponse {
    pub slugs: Vec<String>,
}

/// Access-gated note view.
#[derive(Debug, Serialize)]
pub struct NoteView {
    pub note: Note,
    pub permissions: NotePermissions,
}

/// Revalidation hook payload.
#[derive(Debug, Deserialize)]
pub struct RevalidateRequest {
    #[serde(default)]
    pub slug: Option<String>,
}

/// Revalidation hook result.
#[derive(Debug, Serialize)]
pub struct RevalidateResponse {
    pub revalidated: bool,
    /// Unix epoch milliseconds.
    pub now: u64,
}

/// Result of an explicit save.
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub fields: Vec<NoteField>,
    pub revalidated: bool,
}

pub async fn list_public_notes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PublicNotesResponse>, ApiError> {
    let slugs = state
        .with_service(|service| Ok::<_, ApiError>(service.list_public_slugs()?))
        .await?;
    Ok(Json(PublicNotesResponse { slugs }))
}

/// Creates a private note owned by the caller's session, minting one when
/// the request has no `session_id` cookie.
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    RequestCaller(caller): RequestCaller,
) -> Result<Response, ApiError> {
    let session_id = caller
        .session_id
        .filter(|session_id| !session_id.is_empty())
        .unwrap_or_else(SessionId::generate);
    let owner = session_id.clone();
    let note = state
        .with_service(move |service| Ok::<_, ApiError>(service.create_note(Some(owner))?))
        .await?;

    let cookie = SessionCookie::for_session(&session_id, state.secure_cookies).to_header_value();
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|err| ApiError::Internal(format!("invalid session cookie: {err}")))?;

    let caller = Caller::with_session(session_id);
    let permissions = NotePermissions::for_caller(&note, &caller);
    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(NoteView { note, permissions }),
    )
        .into_response())
}

pub async fn get_note(
    State(state): State<Arc<AppState>>,
    RequestCaller(caller): RequestCaller,
    Path(slug): Path<String>,
) -> Result<Json<NoteView>, ApiError> {
    match open_cached(&state, &slug, &caller).await? {
        NoteAccess::Visible { note, permissions } => Ok(Json(NoteView { note, permissions })),
        NoteAccess::Unavailable => Err(ApiError::NotFound),
    }
}

pub async fn note_metadata(
    State(state): State<Arc<AppState>>,
    RequestCaller(caller): RequestCaller,
    Path(slug): Path<String>,
) -> Result<Json<NoteMetadata>, ApiError> {
    let site_title = state.site_title.clone();
    let metadata = state
        .with_service(move |service| {
            Ok::<_, ApiError>(service.note_metadata(&slug, &caller, &site_title)?)
        })
        .await?;
    if metadata.og_image.is_none() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(metadata))
}

/// Explicit save of a partial note.
///
/// Text fields are still ownership-checked by the store, so an admin saving
/// someone else's public note gets `SaveFailed` for those fields.
pub async fn save_note(
    State(state): State<Arc<AppState>>,
    RequestCaller(caller): RequestCaller,
    Path(slug): Path<String>,
    Json(patch): Json<NotePatch>,
) -> Result<Json<SaveResponse>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("no fields to save".to_string()));
    }
    let (note, permissions) = match open_cached(&state, &slug, &caller).await? {
        NoteAccess::Visible { note, permissions } => (note, permissions),
        NoteAccess::Unavailable => return Err(ApiError::NotFound),
    };
    if !permissions.explicit_save {
        return Err(ApiError::Forbidden);
    }
    if patch.touches_visibility() && !permissions.toggle_visibility {
        return Err(ApiError::Forbidden);
    }

    let session_id = caller
        .session_id
        .unwrap_or_else(|| SessionId::new(String::new()));
    let report = state
        .dispatcher
        .commit(note.id, &note.slug, &session_id, &patch)
        .await?;
    if patch.touches_visibility() {
        // Visibility saves skip render invalidation; drop the stale page here.
        let purged = state.pages.purge(&note.slug);
        info!(
            "event=page_invalidate module=api status=ok slug={} purged={} reason=visibility",
            note.slug, purged
        );
    }
    Ok(Json(SaveResponse {
        fields: report.fields,
        revalidated: report.revalidated,
    }))
}

/// Purges the cached render of one note.
pub async fn revalidate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RevalidateRequest>, JsonRejection>,
) -> Result<Json<RevalidateResponse>, ApiError> {
    let presented = headers
        .get(REVALIDATE_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !state.revalidate_token.verify(presented) {
        warn!("event=revalidate module=api status=error reason=invalid_token");
        return Err(ApiError::Unauthorized);
    }

    let Json(request) = body.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let slug = request
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|slug| !slug.is_empty())
        .ok_or_else(|| ApiError::BadRequest("slug is required".to_string()))?;
    let slug = normalize_slug(slug);

    let purged = state.pages.purge(slug);
    info!(
        "event=revalidate module=api status=ok slug={} purged={}",
        slug, purged
    );
    Ok(Json(RevalidateResponse {
        revalidated: true,
        now: now_epoch_ms(),
    }))
}

async fn open_cached(
    state: &AppState,
    raw_slug: &str,
    caller: &Caller,
) -> Result<NoteAccess, ApiError> {
    if let Some(note) = state.pages.get(normalize_slug(raw_slug)) {
        return Ok(resolve_access(Some(note), caller));
    }
    let slug = raw_slug.to_string();
    let reader = caller.clone();
    let access = state
        .with_service(move |service| Ok::<_, ApiError>(service.open_note(&slug, &reader)?))
        .await?;
    if let NoteAccess::Visible { note, .. } = &access {
        state.pages.put(note);
    }
    Ok(access)
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
