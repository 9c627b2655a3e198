use crate::metrics::counters;
use eventsub_common::DuplicateCheck;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

/// A remembered message id.
#[derive(Debug, Clone)]
struct SeenEntry {
    id: String,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct Window {
    /// Ids in insertion order, oldest at the front.
    order: VecDeque<SeenEntry>,
    seen: HashSet<String>,
}

/// Message ids accepted within the staleness window.
///
/// Entries expire once they are older than the TTL: a message that old is
/// already rejected by the timestamp check. Live entries are never evicted.
/// When the cache holds `capacity` live ids, new ids are reported as seen
/// until older entries expire.
#[derive(Debug)]
pub struct ReplayCache {
    window: Mutex<Window>,
    ttl: Duration,
    capacity: usize,
}

impl ReplayCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `id` as seen at `now`. Returns `true` if it was already
    /// present, or if the cache is full and `id` could not be recorded.
    pub fn check_and_insert_at(&self, id: &str, now: Instant) -> bool {
        let mut window = self.lock();
        Self::expire(&mut window, now, self.ttl);

        if window.seen.contains(id) {
            return true;
        }
        if window.order.len() >= self.capacity {
            warn!(
                message_id = %id,
                capacity = self.capacity,
                "replay cache full, refusing new id"
            );
            counters::replay_cache_full_total();
            return true;
        }

        window.seen.insert(id.to_string());
        window.order.push_back(SeenEntry {
            id: id.to_string(),
            inserted_at: now,
        });
        false
    }

    fn expire(window: &mut Window, now: Instant, ttl: Duration) {
        while let Some(entry) = window.order.front() {
            if now.saturating_duration_since(entry.inserted_at) >= ttl {
                if let Some(expired) = window.order.pop_front() {
                    window.seen.remove(&expired.id);
                }
            } else {
                break;
            }
        }
    }

    /// Number of ids currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Returns `true` if no ids are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DuplicateCheck for ReplayCache {
    fn check_and_insert(&self, id: &str) -> bool {
        self.check_and_insert_at(id, Instant::now())
    }
}
