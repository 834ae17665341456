use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use slugnote_core::db::open_db_in_memory;
use slugnote_core::SecretToken;
use slugnote_server::{router, AppState, ServerSettings};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const REVALIDATE_TOKEN: &str = "reval-secret";
const ADMIN_TOKEN: &str = "admin-secret";

fn test_app() -> (Router, Arc<AppState>) {
    let conn = Arc::new(Mutex::new(open_db_in_memory().expect("in-memory db")));
    let state = AppState::new(
        conn,
        ServerSettings {
            revalidate_token: SecretToken::new(REVALIDATE_TOKEN),
            admin_token: SecretToken::new(ADMIN_TOKEN),
            site_title: "notes".to_string(),
            secure_cookies: false,
            page_ttl: Duration::from_secs(60),
        },
    );
    (router(Arc::clone(&state)), state)
}

struct Reply {
    status: StatusCode,
    set_cookie: Option<String>,
    body: Value,
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .map(|value| value.to_str().expect("ascii cookie").to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    Reply {
        status,
        set_cookie,
        body,
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

fn json_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
}

/// Creates a note and returns `(slug, cookie pair)`.
async fn create_note(app: &Router) -> (String, String) {
    let reply = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/notes")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let set_cookie = reply.set_cookie.expect("session cookie is issued");
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age=31536000"));
    let cookie = set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string();
    let slug = reply.body["note"]["slug"]
        .as_str()
        .expect("slug")
        .to_string();
    (slug, cookie)
}

#[tokio::test]
async fn private_note_is_only_visible_to_its_session() {
    let (app, _) = test_app();
    let (slug, cookie) = create_note(&app).await;

    let owner = send(&app, get(&format!("/notes/{slug}"), Some(&cookie))).await;
    assert_eq!(owner.status, StatusCode::OK);
    assert_eq!(owner.body["note"]["public"], json!(false));
    assert_eq!(owner.body["permissions"]["edit_inline"], json!(true));

    let stranger = send(
        &app,
        get(&format!("/notes/{slug}"), Some("session_id=someone-else")),
    )
    .await;
    let anonymous = send(&app, get(&format!("/notes/{slug}"), None)).await;
    let missing = send(&app, get("/notes/never-created", Some(&cookie))).await;

    for reply in [&stranger, &anonymous, &missing] {
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }
    assert_eq!(stranger.body, missing.body);
    assert_eq!(anonymous.body, missing.body);
}

#[tokio::test]
async fn metadata_hides_denied_notes() {
    let (app, _) = test_app();
    let (slug, cookie) = create_note(&app).await;

    let owner = send(&app, get(&format!("/notes/{slug}/metadata"), Some(&cookie))).await;
    assert_eq!(owner.status, StatusCode::OK);
    assert_eq!(owner.body["title"], json!("notes | new note"));

    let denied = send(&app, get(&format!("/notes/{slug}/metadata"), None)).await;
    let missing = send(&app, get("/notes/nothing/metadata", None)).await;
    assert_eq!(denied.status, StatusCode::NOT_FOUND);
    assert_eq!(denied.body, missing.body);
    assert_eq!(denied.body["error"], json!("Note not found"));
}

#[tokio::test]
async fn owner_saves_text_fields_and_admin_owner_publishes() {
    let (app, _) = test_app();
    let (slug, cookie) = create_note(&app).await;

    let saved = send(
        &app,
        json_request("PATCH", &format!("/notes/{slug}"))
            .header(COOKIE, &cookie)
            .body(Body::from(json!({ "title": "Groceries" }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(saved.status, StatusCode::OK);
    assert_eq!(saved.body["fields"], json!(["title"]));
    assert_eq!(saved.body["revalidated"], json!(true));

    let publish_without_admin = send(
        &app,
        json_request("PATCH", &format!("/notes/{slug}"))
            .header(COOKIE, &cookie)
            .body(Body::from(json!({ "public": true }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(publish_without_admin.status, StatusCode::FORBIDDEN);

    let published = send(
        &app,
        json_request("PATCH", &format!("/notes/{slug}"))
            .header(COOKIE, &cookie)
            .header(AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::from(json!({ "public": true }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(published.status, StatusCode::OK);
    assert_eq!(published.body["revalidated"], json!(false));

    let listing = send(&app, get("/notes", None)).await;
    assert_eq!(listing.body["slugs"], json!([slug.clone()]));

    let anonymous = send(&app, get(&format!("/notes/{slug}"), None)).await;
    assert_eq!(anonymous.status, StatusCode::OK);
    assert_eq!(anonymous.body["note"]["title"], json!("Groceries"));
    assert_eq!(anonymous.body["permissions"]["edit_inline"], json!(false));
}

#[tokio::test]
async fn non_owner_cannot_save() {
    let (app, _) = test_app();
    let (slug, _cookie) = create_note(&app).await;

    let reply = send(
        &app,
        json_request("PATCH", &format!("/notes/{slug}"))
            .header(COOKIE, "session_id=intruder")
            .body(Body::from(json!({ "content": "pwned" }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn revalidate_checks_token_and_slug() {
    let (app, _) = test_app();

    let bad_token = send(
        &app,
        json_request("POST", "/notes/revalidate")
            .header("x-revalidate-token", "guess")
            .body(Body::from(json!({ "slug": "a" }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(bad_token.status, StatusCode::UNAUTHORIZED);

    let blank_slug = send(
        &app,
        json_request("POST", "/notes/revalidate")
            .header("x-revalidate-token", REVALIDATE_TOKEN)
            .body(Body::from(json!({ "slug": "  " }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(blank_slug.status, StatusCode::BAD_REQUEST);

    let missing_slug = send(
        &app,
        json_request("POST", "/notes/revalidate")
            .header("x-revalidate-token", REVALIDATE_TOKEN)
            .body(Body::from("{}"))
            .expect("request"),
    )
    .await;
    assert_eq!(missing_slug.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn revalidate_purges_the_cached_render() {
    let (app, state) = test_app();
    let (slug, cookie) = create_note(&app).await;
    let published = send(
        &app,
        json_request("PATCH", &format!("/notes/{slug}"))
            .header(COOKIE, &cookie)
            .header(AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::from(json!({ "public": true }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(published.status, StatusCode::OK);

    send(&app, get(&format!("/notes/{slug}"), None)).await;
    assert!(state.pages().contains(&slug));

    let reply = send(
        &app,
        json_request("POST", "/notes/revalidate")
            .header("x-revalidate-token", REVALIDATE_TOKEN)
            .body(Body::from(json!({ "slug": format!("notes/{slug}") }).to_string()))
            .expect("request"),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["revalidated"], json!(true));
    assert!(!state.pages().contains(&slug));
}

async fn set_visibility(app: &Router, slug: &str, cookie: &str, public: bool) -> Reply {
    send(
        app,
        json_request("PATCH", &format!("/notes/{slug}"))
            .header(COOKIE, cookie)
            .header(AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::from(json!({ "public": public }).to_string()))
            .expect("request"),
    )
    .await
}

#[tokio::test]
async fn unpublished_note_is_denied_even_when_its_page_was_cached() {
    let (app, state) = test_app();
    let (slug, cookie) = create_note(&app).await;
    assert_eq!(set_visibility(&app, &slug, &cookie, true).await.status, StatusCode::OK);

    let warm = send(&app, get(&format!("/notes/{slug}"), None)).await;
    assert_eq!(warm.status, StatusCode::OK);
    assert!(state.pages().contains(&slug));

    let hidden = set_visibility(&app, &slug, &cookie, false).await;
    assert_eq!(hidden.status, StatusCode::OK);
    assert_eq!(hidden.body["revalidated"], json!(false));
    assert!(!state.pages().contains(&slug));

    let anonymous = send(&app, get(&format!("/notes/{slug}"), None)).await;
    let stranger = send(
        &app,
        get(&format!("/notes/{slug}"), Some("session_id=someone-else")),
    )
    .await;
    let missing = send(&app, get("/notes/never-created", None)).await;
    for reply in [&anonymous, &stranger] {
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, missing.body);
    }

    let listing = send(&app, get("/notes", None)).await;
    assert_eq!(listing.body["slugs"], json!([]));

    let owner = send(&app, get(&format!("/notes/{slug}"), Some(&cookie))).await;
    assert_eq!(owner.status, StatusCode::OK);
    assert_eq!(owner.body["note"]["public"], json!(false));
}

#[tokio::test]
async fn note_bodies_never_carry_the_owner_session() {
    let (app, _) = test_app();
    let created = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/notes")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    let cookie = created
        .set_cookie
        .as_deref()
        .and_then(|header| header.split(';').next())
        .expect("cookie pair")
        .to_string();
    let session = cookie.trim_start_matches("session_id=").to_string();
    let slug = created.body["note"]["slug"]
        .as_str()
        .expect("slug")
        .to_string();
    assert_eq!(set_visibility(&app, &slug, &cookie, true).await.status, StatusCode::OK);

    let owner = send(&app, get(&format!("/notes/{slug}"), Some(&cookie))).await;
    let anonymous = send(&app, get(&format!("/notes/{slug}"), None)).await;
    let cached = send(&app, get(&format!("/notes/{slug}"), None)).await;

    for reply in [&created, &owner, &anonymous, &cached] {
        assert!(reply.body["note"].is_object());
        assert!(reply.body["note"].get("session_id").is_none());
        assert!(!reply.body.to_string().contains(&session));
    }
    assert_eq!(anonymous.body["permissions"]["edit_inline"], json!(false));
}
