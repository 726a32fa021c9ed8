//! C2 / C3: File Event and File History. An append-only, causally chained
//! log of everything that has happened to one file identity, plus the
//! merge/replay logic that lets a foreign history be folded into a local
//! one and the implied filesystem action recovered.

use serde::{Deserialize, Serialize};

use crate::error::{DistriboxError, Result};
use crate::ids::{EventId, FileId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Changed,
    Renamed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub file_id: FileId,
    pub event_id: EventId,
    pub parent_event_id: Option<EventId>,
    pub is_directory: bool,
    pub name: String,
    pub when: Tick,
    pub sha1: Option<String>,
    pub size: u64,
    pub kind: EventKind,
}

/// The filesystem action implied by a merged event, to be performed with
/// the detector muted (§4.C3, §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayAction {
    /// The merged event was historical, not the new head; nothing to do.
    None,
    MakeDirectory { name: String },
    /// `digest = None` means create or truncate to an empty file;
    /// `Some(digest)` means copy that blob's content in, overwriting.
    WriteFile { name: String, digest: Option<String> },
    Rename { from: String, to: String },
    RemoveDirectory { name: String },
    RemoveFile { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHistory {
    file_id: FileId,
    is_directory: bool,
    events: Vec<FileEvent>,
}

impl FileHistory {
    pub fn new(file_id: FileId, is_directory: bool) -> Self {
        Self {
            file_id,
            is_directory,
            events: Vec::new(),
        }
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn events(&self) -> &[FileEvent] {
        &self.events
    }

    pub fn current(&self) -> Option<&FileEvent> {
        self.events.last()
    }

    pub fn is_alive(&self) -> bool {
        matches!(
            self.current().map(|event| event.kind),
            Some(EventKind::Created) | Some(EventKind::Changed) | Some(EventKind::Renamed)
        )
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current().map(|event| event.name.as_str())
    }

    fn parent_id(&self) -> Option<EventId> {
        self.events.last().map(|event| event.event_id)
    }

    /// Appends and re-sorts by `when`, with a stable sort so ties keep
    /// insertion order (§3). Local appenders only ever push a strictly
    /// greater `when`, so this is a no-op reorder for them; it only
    /// actually reorders during merge, where a foreign event can be
    /// historical relative to events already present.
    fn append(&mut self, event: FileEvent) {
        self.events.push(event);
        self.events.sort_by_key(|event| event.when);
    }

    pub fn create(&mut self, name: impl Into<String>, when: Tick) -> Result<EventId> {
        if !self.events.is_empty() {
            return Err(DistriboxError::logic(
                "create called on a history that already has events",
            ));
        }
        let event_id = EventId::new();
        self.append(FileEvent {
            file_id: self.file_id,
            event_id,
            parent_event_id: None,
            is_directory: self.is_directory,
            name: name.into(),
            when,
            sha1: None,
            size: 0,
            kind: EventKind::Created,
        });
        Ok(event_id)
    }

    pub fn rename(&mut self, new_name: impl Into<String>, when: Tick) -> Result<EventId> {
        let current = self
            .current()
            .ok_or_else(|| DistriboxError::logic("rename on an empty history"))?
            .clone();
        let event_id = EventId::new();
        self.append(FileEvent {
            file_id: self.file_id,
            event_id,
            parent_event_id: self.parent_id(),
            is_directory: self.is_directory,
            name: new_name.into(),
            when,
            sha1: current.sha1,
            size: current.size,
            kind: EventKind::Renamed,
        });
        Ok(event_id)
    }

    pub fn change(
        &mut self,
        new_sha1: Option<String>,
        size: u64,
        when: Tick,
    ) -> Result<EventId> {
        let current = self
            .current()
            .ok_or_else(|| DistriboxError::logic("change on an empty history"))?
            .clone();
        let event_id = EventId::new();
        let size = if new_sha1.is_none() { 0 } else { size };
        self.append(FileEvent {
            file_id: self.file_id,
            event_id,
            parent_event_id: self.parent_id(),
            is_directory: self.is_directory,
            name: current.name,
            when,
            sha1: new_sha1,
            size,
            kind: EventKind::Changed,
        });
        Ok(event_id)
    }

    pub fn delete(&mut self, when: Tick) -> Result<EventId> {
        let current = self
            .current()
            .ok_or_else(|| DistriboxError::logic("delete on an empty history"))?
            .clone();
        let event_id = EventId::new();
        self.append(FileEvent {
            file_id: self.file_id,
            event_id,
            parent_event_id: self.parent_id(),
            is_directory: self.is_directory,
            name: current.name,
            when,
            sha1: current.sha1,
            size: current.size,
            kind: EventKind::Deleted,
        });
        Ok(event_id)
    }

    /// Appends a foreign event and returns the replay action required to
    /// bring the working tree into line, or `ReplayAction::None` if the
    /// event is historical rather than the new head (§4.C3).
    pub fn merge(&mut self, event: FileEvent) -> Result<ReplayAction> {
        if self.events.is_empty() {
            if event.kind != EventKind::Created {
                return Err(DistriboxError::protocol(
                    "first event of a merged history must be Created",
                ));
            }
            self.file_id = event.file_id;
            self.is_directory = event.is_directory;
            let action = creation_action(&event);
            self.append(event);
            return Ok(action);
        }

        if event.is_directory != self.is_directory {
            return Err(DistriboxError::logic(
                "merge event disagrees with history's is_directory",
            ));
        }

        let last = self.events.last().cloned().expect("checked non-empty");
        let is_new_head = event.when > last.when;
        self.append(event.clone());

        if !is_new_head {
            return Ok(ReplayAction::None);
        }

        Ok(match event.kind {
            EventKind::Created => creation_action(&event),
            EventKind::Changed => {
                if event.is_directory {
                    ReplayAction::None
                } else {
                    ReplayAction::WriteFile {
                        name: event.name.clone(),
                        digest: event.sha1.clone(),
                    }
                }
            }
            EventKind::Renamed => ReplayAction::Rename {
                from: last.name,
                to: event.name.clone(),
            },
            EventKind::Deleted => {
                if event.is_directory {
                    ReplayAction::RemoveDirectory {
                        name: event.name.clone(),
                    }
                } else {
                    ReplayAction::RemoveFile {
                        name: event.name.clone(),
                    }
                }
            }
        })
    }
}

fn creation_action(event: &FileEvent) -> ReplayAction {
    if event.is_directory {
        ReplayAction::MakeDirectory {
            name: event.name.clone(),
        }
    } else {
        ReplayAction::WriteFile {
            name: event.name.clone(),
            digest: event.sha1.clone(),
        }
    }
}
