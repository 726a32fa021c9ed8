//! C7: Delta Bundle. A zip archive standing in for the manual transfer
//! step peer discovery and transport would otherwise perform (§1, §6):
//! `Delta.txt` holds the JSON-serialized histories being offered, and
//! every blob any of those histories reference sits alongside it as a
//! flat, top-level entry named by its digest — the wire format any other
//! implementation of this bundle protocol produces and expects.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::blobs::BlobPool;
use crate::error::{DistriboxError, Result};
use crate::history::{FileHistory, ReplayAction};
use crate::mute::MuteGuard;
use crate::version_list::VersionList;

const DELTA_ENTRY: &str = "Delta.txt";

#[derive(Debug, Serialize, Deserialize)]
struct BundleManifest {
    histories: Vec<FileHistory>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BundleAcceptReport {
    pub histories_merged: usize,
    pub replays_applied: usize,
}

/// Writes every history in `histories` and the blobs they reference to
/// `out_path` as a zip archive.
pub fn build(histories: &[FileHistory], blobs: &BlobPool, out_path: &Path) -> Result<()> {
    let file = File::create(out_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = BundleManifest {
        histories: histories.to_vec(),
    };
    let serialized = serde_json::to_vec_pretty(&manifest)?;
    zip.start_file(DELTA_ENTRY, options)?;
    zip.write_all(&serialized)?;

    let mut written = HashSet::new();
    for history in histories {
        for event in history.events() {
            let Some(digest) = &event.sha1 else { continue };
            if !written.insert(digest.clone()) {
                continue;
            }
            let bytes = blobs
                .get(digest)
                .map_err(|_| DistriboxError::blob_missing(digest))?;
            zip.start_file(digest.as_str(), options)?;
            zip.write_all(&bytes)?;
        }
    }

    zip.finish()?;
    Ok(())
}

/// Extracts a bundle's blobs and histories, re-hashing every blob before
/// trusting it (§9), merges each foreign history into `versions`, and
/// replays the filesystem action implied by every new head under a mute
/// guard (§4.C3, §4.C7). Leaves `versions` unflushed and returns the error
/// on the first integrity or protocol violation — the caller decides
/// whether a partially-merged in-memory `VersionList` is still safe to use
/// (a one-shot CLI invocation simply exits without flushing).
pub fn accept(
    bundle_path: &Path,
    blobs: &BlobPool,
    versions: &mut VersionList,
    sync_root: &Path,
) -> Result<BundleAcceptReport> {
    let file = File::open(bundle_path)?;
    let mut archive = ZipArchive::new(file)?;

    let manifest: BundleManifest = {
        let mut entry = archive.by_name(DELTA_ENTRY).map_err(|_| {
            DistriboxError::protocol(format!("bundle is missing the {DELTA_ENTRY} entry"))
        })?;
        let mut raw = String::new();
        entry.read_to_string(&mut raw)?;
        serde_json::from_str(&raw)?
    };

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.name() == DELTA_ENTRY {
            continue;
        }
        let digest = entry.name().to_string();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        blobs.import_verified(&digest, &bytes)?;
    }

    let mut report = BundleAcceptReport::default();
    for history in manifest.histories {
        let file_id = history.file_id();
        let is_directory = history.is_directory();
        let local = versions.get_or_insert_foreign(file_id, is_directory);
        for event in history.events().iter().cloned() {
            let action = local.merge(event)?;
            if action != ReplayAction::None {
                let _guard = MuteGuard::enter();
                apply_replay(sync_root, blobs, &action)?;
                report.replays_applied += 1;
            }
        }
        versions.reindex_after_merge(file_id);
        report.histories_merged += 1;
    }

    versions.flush()?;
    Ok(report)
}

fn apply_replay(sync_root: &Path, blobs: &BlobPool, action: &ReplayAction) -> Result<()> {
    match action {
        ReplayAction::None => Ok(()),
        ReplayAction::MakeDirectory { name } => {
            fs::create_dir_all(sync_root.join(name))?;
            Ok(())
        }
        ReplayAction::WriteFile { name, digest } => {
            let path = sync_root.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            match digest {
                Some(digest) => {
                    let bytes = blobs
                        .get(digest)
                        .map_err(|_| DistriboxError::blob_missing(digest))?;
                    fs::write(path, bytes)?;
                }
                None => {
                    fs::write(path, [])?;
                }
            }
            Ok(())
        }
        ReplayAction::Rename { from, to } => {
            let from_path = sync_root.join(from);
            let to_path = sync_root.join(to);
            if let Some(parent) = to_path.parent() {
                fs::create_dir_all(parent)?;
            }
            if from_path.exists() {
                fs::rename(from_path, to_path)?;
            }
            Ok(())
        }
        ReplayAction::RemoveDirectory { name } => {
            let path = sync_root.join(name);
            if path.exists() {
                fs::remove_dir_all(path)?;
            }
            Ok(())
        }
        ReplayAction::RemoveFile { name } => {
            let path = sync_root.join(name);
            if path.exists() {
                fs::remove_file(path)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FileId, Tick};
    use tempfile::TempDir;

    #[test]
    fn build_then_accept_round_trips_a_new_file() -> Result<()> {
        let sender_tmp = TempDir::new()?;
        let sender_blobs = BlobPool::open(sender_tmp.path().join("blobs"))?;
        let digest = sender_blobs.put(b"hello")?;

        let mut history = FileHistory::new(FileId::new(), false);
        history.create("a.txt", Tick::from_raw(1))?;
        history.change(Some(digest), 5, Tick::from_raw(2))?;

        let bundle_path = sender_tmp.path().join("out.zip");
        build(&[history], &sender_blobs, &bundle_path)?;

        let receiver_tmp = TempDir::new()?;
        let receiver_blobs = BlobPool::open(receiver_tmp.path().join("blobs"))?;
        let mut receiver_versions =
            VersionList::open(receiver_tmp.path().join("VersionList.txt"))?;
        let sync_root = receiver_tmp.path().join("root");
        fs::create_dir_all(&sync_root)?;

        let report = accept(&bundle_path, &receiver_blobs, &mut receiver_versions, &sync_root)?;
        assert_eq!(report.histories_merged, 1);
        assert_eq!(fs::read(sync_root.join("a.txt"))?, b"hello");
        assert!(receiver_versions.alive_by_name("a.txt").is_some());
        Ok(())
    }

    #[test]
    fn accept_rejects_bundle_with_tampered_blob() -> Result<()> {
        let sender_tmp = TempDir::new()?;
        let sender_blobs = BlobPool::open(sender_tmp.path().join("blobs"))?;
        let digest = sender_blobs.put(b"hello")?;
        let mut history = FileHistory::new(FileId::new(), false);
        history.create("a.txt", Tick::from_raw(1))?;
        history.change(Some(digest.clone()), 5, Tick::from_raw(2))?;

        let bundle_path = sender_tmp.path().join("out.zip");
        build(&[history], &sender_blobs, &bundle_path)?;

        // Corrupt the zip's blob entry by rewriting the archive with
        // mismatched bytes under the same claimed digest name.
        let tampered_path = sender_tmp.path().join("tampered.zip");
        {
            let src = File::open(&bundle_path)?;
            let mut archive = ZipArchive::new(src)?;
            let out = File::create(&tampered_path)?;
            let mut zip = ZipWriter::new(out);
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            for index in 0..archive.len() {
                let mut entry = archive.by_index(index)?;
                let name = entry.name().to_string();
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                if name == digest {
                    bytes = b"tampered".to_vec();
                }
                zip.start_file(name, options)?;
                zip.write_all(&bytes)?;
            }
            zip.finish()?;
        }

        let receiver_tmp = TempDir::new()?;
        let receiver_blobs = BlobPool::open(receiver_tmp.path().join("blobs"))?;
        let mut receiver_versions =
            VersionList::open(receiver_tmp.path().join("VersionList.txt"))?;
        let sync_root = receiver_tmp.path().join("root");
        fs::create_dir_all(&sync_root)?;

        let result = accept(&tampered_path, &receiver_blobs, &mut receiver_versions, &sync_root);
        assert!(result.is_err());
        Ok(())
    }
}
