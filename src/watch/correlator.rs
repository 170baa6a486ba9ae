// src/watch/correlator.rs

//! Pairs `MOVED_FROM` / `MOVED_TO` halves of a rename by cookie.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::watch::table::DetachedSubtree;

/// The source half of a rename, waiting for its destination.
#[derive(Debug, Clone)]
pub struct MoveFragment {
    pub cookie: u32,
    pub source: PathBuf,
    pub is_dir: bool,
    pub inserted_at: Instant,
    /// Watches of a renamed directory. Owned by the fragment until the
    /// destination shows up or the fragment is dropped.
    pub detached: Option<DetachedSubtree>,
}

impl MoveFragment {
    pub fn new(cookie: u32, source: PathBuf, is_dir: bool, inserted_at: Instant) -> Self {
        Self {
            cookie,
            source,
            is_dir,
            inserted_at,
            detached: None,
        }
    }

    pub fn with_detached(mut self, detached: DetachedSubtree) -> Self {
        self.detached = Some(detached);
        self
    }
}

/// Pending rename halves keyed by kernel cookie.
///
/// A fragment lives until its `MOVED_TO` arrives, until it is older than
/// the configured TTL, or until the map is full and it is the oldest one.
#[derive(Debug)]
pub struct MoveCorrelator {
    pending: HashMap<u32, MoveFragment>,
    ttl: Duration,
    max_pending: usize,
}

impl MoveCorrelator {
    pub fn new(ttl: Duration, max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
            max_pending: max_pending.max(1),
        }
    }

    /// Record the source half of a rename.
    ///
    /// Returns the fragment that no longer has a place in the map: the
    /// oldest one if the map was full, or the earlier fragment with the
    /// same cookie.
    pub fn moved_from(&mut self, fragment: MoveFragment) -> Option<MoveFragment> {
        let cookie = fragment.cookie;
        if !self.pending.contains_key(&cookie) && self.pending.len() >= self.max_pending {
            let evicted = self.evict_oldest();
            self.pending.insert(cookie, fragment);
            return evicted;
        }
        let replaced = self.pending.insert(cookie, fragment);
        if let Some(old) = &replaced {
            debug!(source = ?old.source, cookie, "pending rename replaced by a reused cookie");
        }
        replaced
    }

    /// Take the source half matching `cookie`, if one is pending.
    pub fn moved_to(&mut self, cookie: u32) -> Option<MoveFragment> {
        self.pending.remove(&cookie)
    }

    /// Drop fragments older than the TTL and return them, oldest first.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<MoveFragment> {
        let ttl = self.ttl;
        let expired: Vec<u32> = self
            .pending
            .values()
            .filter(|f| now.saturating_duration_since(f.inserted_at) >= ttl)
            .map(|f| f.cookie)
            .collect();

        let mut out: Vec<MoveFragment> = expired
            .into_iter()
            .filter_map(|cookie| self.pending.remove(&cookie))
            .collect();
        out.sort_by_key(|f| f.inserted_at);

        for fragment in &out {
            warn!(
                source = ?fragment.source,
                cookie = fragment.cookie,
                "rename source never matched; target is outside the watched tree"
            );
        }
        out
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn evict_oldest(&mut self) -> Option<MoveFragment> {
        let cookie = self
            .pending
            .values()
            .min_by_key(|f| f.inserted_at)
            .map(|f| f.cookie)?;
        let fragment = self.pending.remove(&cookie)?;
        debug!(source = ?fragment.source, cookie, "pending rename evicted, map full");
        Some(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlator() -> MoveCorrelator {
        MoveCorrelator::new(Duration::from_secs(2), 3)
    }

    fn fragment(cookie: u32, source: &str, is_dir: bool, at: Instant) -> MoveFragment {
        MoveFragment::new(cookie, PathBuf::from(source), is_dir, at)
    }

    #[test]
    fn matching_cookie_pairs_and_removes() {
        let mut c = correlator();
        let now = Instant::now();
        c.moved_from(fragment(7, "/w/a", false, now));

        let fragment = c.moved_to(7).unwrap();
        assert_eq!(fragment.source, PathBuf::from("/w/a"));
        assert!(c.moved_to(7).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn unknown_cookie_is_none() {
        let mut c = correlator();
        assert!(c.moved_to(99).is_none());
    }

    #[test]
    fn expired_fragments_are_evicted() {
        let mut c = correlator();
        let start = Instant::now();
        c.moved_from(fragment(1, "/w/old", true, start));
        c.moved_from(fragment(2, "/w/new", false, start + Duration::from_millis(1500)));

        let evicted = c.evict_expired(start + Duration::from_millis(2500));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].cookie, 1);
        assert!(evicted[0].is_dir);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn full_map_evicts_the_oldest() {
        let mut c = correlator();
        let start = Instant::now();
        for cookie in 0..3u32 {
            let at = start + Duration::from_millis(u64::from(cookie));
            let source = format!("/w/{cookie}");
            assert!(c.moved_from(fragment(cookie, &source, false, at)).is_none());
        }

        let evicted = c
            .moved_from(fragment(10, "/w/10", false, start + Duration::from_millis(5)))
            .unwrap();
        assert_eq!(evicted.cookie, 0);
        assert_eq!(c.len(), 3);
        assert!(c.moved_to(0).is_none());
        assert!(c.moved_to(10).is_some());
    }

    #[test]
    fn repeated_cookie_hands_back_the_replaced_fragment() {
        let mut c = correlator();
        let now = Instant::now();
        for cookie in 0..3u32 {
            c.moved_from(fragment(cookie, "/w/x", false, now));
        }
        let replaced = c.moved_from(fragment(1, "/w/y", true, now)).unwrap();
        assert_eq!(replaced.cookie, 1);
        assert_eq!(replaced.source, PathBuf::from("/w/x"));
        assert_eq!(c.len(), 3);
        assert_eq!(c.moved_to(1).unwrap().source, PathBuf::from("/w/y"));
        assert!(c.moved_to(0).is_some());
    }
}
