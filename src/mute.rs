//! Process-global mute flag (§4.C5, §5, §9). While held, the watcher
//! thread drops raw filesystem notifications instead of enqueueing them,
//! so that writes performed while replaying a merge don't loop back into
//! the detector. Coarse suppression, not a happens-before guarantee — a
//! relaxed atomic is sufficient per §5.

use std::sync::atomic::{AtomicBool, Ordering};

static MUTED: AtomicBool = AtomicBool::new(false);

pub fn is_muted() -> bool {
    MUTED.load(Ordering::Relaxed)
}

/// RAII guard: sets the flag on construction, clears it on drop (even on
/// an early return via `?`), so a replay syscall is never left muted
/// indefinitely. §4.C3 requires the flag to be set "for the full duration
/// of each replay action" and nothing longer.
#[must_use]
pub struct MuteGuard {
    _private: (),
}

impl MuteGuard {
    pub fn enter() -> Self {
        MUTED.store(true, Ordering::Relaxed);
        Self { _private: () }
    }
}

impl Drop for MuteGuard {
    fn drop(&mut self) {
        MUTED.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_mutes_while_held_and_unmutes_on_drop() {
        assert!(!is_muted());
        {
            let _guard = MuteGuard::enter();
            assert!(is_muted());
        }
        assert!(!is_muted());
    }
}
