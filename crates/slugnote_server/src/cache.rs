//! In-process page cache for public note renders.
//!
//! # Responsibility
//! - Serve recently rendered public notes without touching the store.
//! - Act as the `RenderCache` the write dispatcher purges after saves.
//!
//! # Invariants
//! - Only public notes are stored.
//! - Entries older than the TTL are treated as misses.

use async_trait::async_trait;
use log::debug;
use slugnote_core::sync::dispatcher::{CacheError, RenderCache};
use slugnote_core::Note;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lifetime of a cached render.
pub const DEFAULT_PAGE_TTL: Duration = Duration::from_secs(60);

struct CachedPage {
    note: Note,
    stored_at: Instant,
}

/// Slug-keyed cache of rendered public notes.
pub struct PageCache {
    ttl: Duration,
    pages: Mutex<HashMap<String, CachedPage>>,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh cached render for `slug`, if any.
    pub fn get(&self, slug: &str) -> Option<Note> {
        let mut pages = self.lock();
        match pages.get(slug) {
            Some(page) if page.stored_at.elapsed() < self.ttl => Some(page.note.clone()),
            Some(_) => {
                pages.remove(slug);
                None
            }
            None => None,
        }
    }

    /// Stores `note` when it is public; private notes are ignored.
    pub fn put(&self, note: &Note) {
        if !note.public {
            return;
        }
        self.lock().insert(
            note.slug.clone(),
            CachedPage {
                note: note.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops the render for `slug`. Returns whether one was cached.
    pub fn purge(&self, slug: &str) -> bool {
        self.lock().remove(slug).is_some()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.lock().contains_key(slug)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedPage>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RenderCache for PageCache {
    async fn invalidate(&self, slug: &str) -> Result<(), CacheError> {
        let purged = self.purge(slug);
        debug!(
            "event=page_invalidate module=cache status=ok slug={} purged={}",
            slug, purged
        );
        Ok(())
    }

    async fn refresh_current_view(&self) {
        // Server renders on the next request; nothing to push.
        debug!("event=page_refresh module=cache status=skip reason=no_active_view");
    }
}
