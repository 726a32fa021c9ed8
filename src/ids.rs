use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 128-bit opaque identifier, stable across renames, re-creations, and
/// replication. Assigned once, on first local Create or on first merge of
/// a foreign history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 128-bit identifier unique across every event on every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A timestamp counted in 100-nanosecond ticks since the Unix epoch.
///
/// `SystemTime` alone can't express "strictly greater than the previous
/// event even at sub-tick resolution" (§4.C5) without the caller tracking
/// the last-emitted value itself, which is exactly what `Tick::after`
/// does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tick(u64);

impl Tick {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// The current wall-clock tick.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_nanos() as u64 / 100)
    }

    /// `now()` if it strictly exceeds `last`, else `last + 1`. Guarantees
    /// the monotonicity invariant of §3 and §4.C5 even when the OS clock
    /// has coarser resolution than one tick or goes backwards.
    pub fn after(last: Option<Tick>) -> Self {
        let now = Self::now();
        match last {
            Some(last) if now <= last => Tick(last.0 + 1),
            _ => now,
        }
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_after_advances_past_equal_values() {
        let last = Tick::from_raw(1_000_000);
        let next = Tick::after(Some(last));
        assert!(next > last);
    }

    #[test]
    fn tick_after_with_no_predecessor_uses_now() {
        let before = Tick::now();
        let next = Tick::after(None);
        assert!(next >= before);
    }

    #[test]
    fn file_id_and_event_id_are_distinct_per_instance() {
        assert_ne!(FileId::new(), FileId::new());
        assert_ne!(EventId::new(), EventId::new());
    }
}
