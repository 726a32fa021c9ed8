//! C5: Change Detector. Watches the sync root recursively (excluding the
//! metadata directory), debounces the raw stream notify delivers, and
//! emits the canonical event stream §4.C5 defines: Created / Changed /
//! Renamed / Deleted, plus an Idle marker once a debounce window drains
//! with nothing left queued.
//!
//! Two threads, same shape as every watcher in this family of tools: one
//! thread owns the notify watcher and pushes raw events onto a
//! mutex-guarded queue, a second thread wakes on a fixed tick, drains the
//! queue, classifies each raw event, and forwards canonical events to the
//! caller over an mpsc channel.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::blobs::BlobPool;
use crate::error::{DistriboxError, Result};
use crate::ids::Tick;
use crate::mute;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    Created {
        name: String,
        is_directory: bool,
        sha1: Option<String>,
        size: u64,
        when: Tick,
    },
    Changed {
        name: String,
        sha1: Option<String>,
        size: u64,
        when: Tick,
    },
    Renamed {
        from: String,
        to: String,
        sha1: Option<String>,
        size: u64,
        when: Tick,
    },
    Deleted {
        name: String,
        when: Tick,
    },
    /// Emitted once a debounce window elapses with nothing pending, the
    /// quiescence point the Version Controller uses to flush (§4.C6).
    Idle,
}

pub struct ChangeDetector {
    _watcher: RecommendedWatcher,
    receiver: Receiver<DetectorEvent>,
}

impl ChangeDetector {
    pub fn watch(root: &Path, metadata_dir_name: &str, poll_interval: Duration, blobs: BlobPool) -> Result<Self> {
        let root = root.to_path_buf();
        let metadata_dir = root.join(metadata_dir_name);
        let queue: Arc<Mutex<VecDeque<Event>>> = Arc::new(Mutex::new(VecDeque::new()));
        let watcher_queue = Arc::clone(&queue);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if mute::is_muted() {
                    return;
                }
                if let Ok(event) = res {
                    if let Ok(mut guard) = watcher_queue.lock() {
                        guard.push_back(event);
                    }
                } else if let Err(err) = res {
                    tracing::warn!(error = %err, "watcher reported an error");
                }
            },
            NotifyConfig::default(),
        )
        .map_err(to_distribox_error)?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(to_distribox_error)?;

        let (tx, rx) = mpsc::channel();
        let ticker_root = root.clone();
        std::thread::spawn(move || {
            let mut last_tick: Option<Tick> = None;
            loop {
                std::thread::sleep(poll_interval);
                let drained: Vec<Event> = {
                    let mut guard = match queue.lock() {
                        Ok(guard) => guard,
                        Err(_) => break,
                    };
                    guard.drain(..).collect()
                };
                if drained.is_empty() {
                    if tx.send(DetectorEvent::Idle).is_err() {
                        break;
                    }
                    continue;
                }
                for event in drained {
                    if let Some(canonical) =
                        classify(&event, &ticker_root, &metadata_dir, &blobs, &mut last_tick)
                    {
                        if tx.send(canonical).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    pub fn recv(&self) -> std::result::Result<DetectorEvent, RecvError> {
        self.receiver.recv()
    }
}

fn to_distribox_error(err: notify::Error) -> DistriboxError {
    DistriboxError::logic(format!("watcher error: {err}"))
}

/// Classifies one raw notify event into a canonical `DetectorEvent`. The
/// emitted tick is always `Tick::after(*last)`, not `Tick::now()` — a
/// burst of filesystem operations inside one debounce window can land
/// faster than the clock's resolution, and every locally originated event
/// must still compare strictly greater than the one before it (§3, §4.C5).
fn classify(
    event: &Event,
    root: &Path,
    metadata_dir: &Path,
    blobs: &BlobPool,
    last: &mut Option<Tick>,
) -> Option<DetectorEvent> {
    let paths: Vec<&PathBuf> = event
        .paths
        .iter()
        .filter(|path| !path.starts_with(metadata_dir))
        .collect();
    if paths.is_empty() {
        return None;
    }

    let mut next_tick = || {
        let tick = Tick::after(*last);
        *last = Some(tick);
        tick
    };

    match &event.kind {
        EventKind::Create(_) => {
            let path = paths[0];
            let name = relative_name(path, root)?;
            let is_directory = path.is_dir();
            let (sha1, size) = hash_if_file(path, is_directory, blobs);
            Some(DetectorEvent::Created {
                name,
                is_directory,
                sha1,
                size,
                when: next_tick(),
            })
        }
        EventKind::Modify(notify::event::ModifyKind::Name(mode)) => match mode {
            notify::event::RenameMode::Both if paths.len() >= 2 => {
                let from = relative_name(paths[0], root)?;
                let to = relative_name(paths[1], root)?;
                let is_directory = paths[1].is_dir();
                let (sha1, size) = hash_if_file(paths[1], is_directory, blobs);
                Some(DetectorEvent::Renamed {
                    from,
                    to,
                    sha1,
                    size,
                    when: next_tick(),
                })
            }
            _ => None,
        },
        EventKind::Modify(_) => {
            let path = paths[0];
            let is_directory = path.is_dir();
            if is_directory {
                return None;
            }
            let name = relative_name(path, root)?;
            let (sha1, size) = hash_if_file(path, false, blobs);
            Some(DetectorEvent::Changed {
                name,
                sha1,
                size,
                when: next_tick(),
            })
        }
        EventKind::Remove(_) => {
            let name = relative_name(paths[0], root)?;
            Some(DetectorEvent::Deleted {
                name,
                when: next_tick(),
            })
        }
        _ => None,
    }
}

fn relative_name(path: &Path, root: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .filter(|name| !name.is_empty())
}

fn hash_if_file(path: &Path, is_directory: bool, blobs: &BlobPool) -> (Option<String>, u64) {
    if is_directory || !path.is_file() {
        return (None, 0);
    }
    match std::fs::metadata(path) {
        Ok(metadata) => match blobs.put_path(path) {
            Ok(digest) => (Some(digest), metadata.len()),
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "failed to hash changed file");
                (None, 0)
            }
        },
        Err(_) => (None, 0),
    }
}
