//! C6: Version Controller. Thin façade: translates each canonical
//! detector event into the matching Version List mutation, and flushes
//! the list to disk when the detector reports quiescence (§4.C6).
//!
//! Deliberately does no filesystem I/O of its own — that's the detector's
//! and bundle acceptor's job — so it stays a pure translation layer.

use crate::error::Result;
use crate::ids::Tick;
use crate::version_list::VersionList;
use crate::watch::{ChangeDetector, DetectorEvent};

pub struct VersionController {
    versions: VersionList,
}

impl VersionController {
    pub fn new(versions: VersionList) -> Self {
        Self { versions }
    }

    pub fn versions(&self) -> &VersionList {
        &self.versions
    }

    pub fn versions_mut(&mut self) -> &mut VersionList {
        &mut self.versions
    }

    pub fn into_versions(self) -> VersionList {
        self.versions
    }

    /// Applies one canonical event. A `Created` event that arrives already
    /// carrying content (the watcher coalesced create+write into one
    /// notify event) is recorded as a Created event followed immediately
    /// by a Changed event, since `FileHistory::create` always starts a
    /// history at the empty state (§4.C3).
    pub fn apply(&mut self, event: DetectorEvent) -> Result<()> {
        match event {
            DetectorEvent::Created {
                name,
                is_directory,
                sha1,
                size,
                when,
            } => {
                self.versions.create(&name, is_directory, when)?;
                if sha1.is_some() {
                    self.versions
                        .change(&name, sha1, size, Tick::after(Some(when)))?;
                }
            }
            DetectorEvent::Changed {
                name,
                sha1,
                size,
                when,
            } => {
                self.versions.change(&name, sha1, size, when)?;
            }
            DetectorEvent::Renamed {
                from,
                to,
                sha1,
                size,
                when,
            } => {
                self.versions.rename(&from, &to, sha1, size, when)?;
            }
            DetectorEvent::Deleted { name, when } => {
                self.versions.delete(&name, when)?;
            }
            DetectorEvent::Idle => {
                self.versions.flush()?;
            }
        }
        Ok(())
    }

    /// Drives the controller off a live detector until its channel closes.
    pub fn run(&mut self, detector: &ChangeDetector) -> Result<()> {
        while let Ok(event) = detector.recv() {
            self.apply(event)?;
        }
        Ok(())
    }
}
