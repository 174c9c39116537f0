use crate::playback::SongIdentity;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

const LOG_TARGET: &str = "overlyric::cache";

/// Session-lifetime cache of fetched raw lyric text.
///
/// One entry per song identity. Entries are never evicted during a run and are
/// not persisted. Only successful fetches are stored; a miss is never cached so
/// that the next poll cycle retries.
#[derive(Debug, Default)]
pub struct LyricsCache {
    entries: RwLock<HashMap<SongIdentity, String>>,
}

impl LyricsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up cached lyrics for a song
    #[must_use]
    pub fn get(&self, identity: &SongIdentity) -> Option<String> {
        let hit = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned();
        debug!(
            target: LOG_TARGET,
            "Cache {} for {}",
            if hit.is_some() { "hit" } else { "miss" },
            identity
        );
        hit
    }

    /// Store lyrics for a song, replacing any previous entry
    pub fn store(&self, identity: SongIdentity, lyrics: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity, lyrics);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_get() {
        let cache = LyricsCache::new();
        let identity = SongIdentity::new(Some("Song"), Some("Artist"), Some("Album"));
        assert!(cache.get(&identity).is_none());

        cache.store(identity.clone(), "[00:01.00]hi".to_string());
        assert_eq!(cache.get(&identity).as_deref(), Some("[00:01.00]hi"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_entries_are_per_identity() {
        let cache = LyricsCache::new();
        let first = SongIdentity::new(Some("One"), Some("Artist"), None);
        let second = SongIdentity::new(Some("Two"), Some("Artist"), None);
        cache.store(first.clone(), "one".to_string());

        assert!(cache.get(&second).is_none());
        cache.store(second.clone(), "two".to_string());
        assert_eq!(cache.get(&first).as_deref(), Some("one"));
        assert_eq!(cache.get(&second).as_deref(), Some("two"));
    }
}
