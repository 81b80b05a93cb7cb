// File-level helpers around framed snapshots and deltas.
//
// Each file holds one `Frame`. `commit_file` and `apply_file` load a
// snapshot, run `change_data` / `increment_data`, and write the result back
// only once the in-memory operation has succeeded. Snapshot files are
// replaced through a sibling temp file and a rename.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::delta::Delta;
use crate::integrity::HashAlgorithm;
use crate::snapshot::{PatchError, Snapshot, SnapshotOptions};
use crate::wire::{Frame, WireError};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("patch rejected: {0}")]
    Patch(#[from] PatchError),
    #[error("{path}: expected a {expected} frame, found a {found} frame")]
    UnexpectedFrame {
        path: PathBuf,
        expected: &'static str,
        found: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `commit_file()`.
#[derive(Debug, Clone)]
pub struct CommitStats {
    pub previous_version: i64,
    pub version: i64,
    /// Size of the new payload in bytes.
    pub target_size: u64,
    /// Size of the written delta frame in bytes.
    pub delta_size: u64,
    /// Payload bytes carried by the delta.
    pub changed_bytes: u64,
    pub sparse: bool,
    pub target_sha256: [u8; 32],
}

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    pub previous_version: i64,
    pub version: i64,
    pub delta_size: u64,
    /// Size of the reconstructed payload (0 when the payload was cleared).
    pub output_size: u64,
    pub output_sha256: Option<[u8; 32]>,
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&HashAlgorithm::Sha256.digest(data));
    out
}

// ---------------------------------------------------------------------------
// Frame files
// ---------------------------------------------------------------------------

/// Read a single frame from `path`.
pub fn read_frame(path: &Path) -> Result<Frame, IoError> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUF_SIZE, file);
    let frame = Frame::decode(&mut reader)?;

    let mut probe = [0u8; 1];
    if io::Read::read(&mut reader, &mut probe)? != 0 {
        return Err(WireError::Malformed(format!(
            "{}: trailing bytes after frame",
            path.display()
        ))
        .into());
    }
    Ok(frame)
}

/// Write `frame` to `path`, returning the number of bytes written.
pub fn write_frame(path: &Path, frame: &Frame) -> Result<u64, IoError> {
    let bytes = frame.to_bytes()?;
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(bytes.len() as u64)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `frame` to a sibling temp file of `path`. The temp file is
/// removed again if the write fails.
fn stage_frame(path: &Path, frame: &Frame) -> Result<(PathBuf, u64), IoError> {
    let tmp = tmp_path(path);
    match write_frame(&tmp, frame) {
        Ok(written) => Ok((tmp, written)),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Move a staged temp file onto `path`, dropping it if the rename fails.
fn publish(tmp: &Path, path: &Path) -> Result<(), IoError> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        IoError::from(e)
    })
}

/// Write `frame` next to `path` and rename it into place.
fn replace_frame(path: &Path, frame: &Frame) -> Result<u64, IoError> {
    let (tmp, written) = stage_frame(path, frame)?;
    publish(&tmp, path)?;
    Ok(written)
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot, IoError> {
    match read_frame(path)? {
        Frame::Snapshot(s) => Ok(s),
        other => Err(IoError::UnexpectedFrame {
            path: path.to_path_buf(),
            expected: "snapshot",
            found: other.kind_name(),
        }),
    }
}

pub fn read_delta(path: &Path) -> Result<Delta, IoError> {
    match read_frame(path)? {
        Frame::Delta(d) => Ok(d),
        other => Err(IoError::UnexpectedFrame {
            path: path.to_path_buf(),
            expected: "delta",
            found: other.kind_name(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Snapshot operations
// ---------------------------------------------------------------------------

/// Create an unversioned snapshot file holding the contents of `data_path`.
pub fn init_file(data_path: &Path, snapshot_path: &Path) -> Result<u64, IoError> {
    let data = fs::read(data_path)?;
    write_frame(snapshot_path, &Frame::Snapshot(Snapshot::new(Some(data))))
}

/// Commit the contents of `new_data_path` to the snapshot at
/// `snapshot_path`, writing the resulting delta to `delta_path`.
///
/// On error neither file is modified, except when the final rename of
/// the delta fails after the snapshot has already been replaced.
pub fn commit_file(
    snapshot_path: &Path,
    new_data_path: &Path,
    delta_path: &Path,
    opts: SnapshotOptions,
) -> Result<CommitStats, IoError> {
    let mut snapshot = read_snapshot(snapshot_path)?.with_options(opts);
    let new_data = fs::read(new_data_path)?;
    let previous_version = snapshot.version();

    let delta = snapshot.change_data(&new_data);
    let changed_bytes = delta.stats().changed_bytes as u64;
    let sparse = delta.is_sparse();

    // Nothing becomes visible until both frames are staged, and the delta
    // only appears once the snapshot has moved to its version.
    let (delta_tmp, delta_size) = stage_frame(delta_path, &Frame::Delta(delta))?;
    if let Err(e) = replace_frame(snapshot_path, &Frame::Snapshot(snapshot.clone())) {
        let _ = fs::remove_file(&delta_tmp);
        return Err(e);
    }
    publish(&delta_tmp, delta_path)?;

    log::info!(
        "committed {}: version {previous_version} -> {}",
        snapshot_path.display(),
        snapshot.version()
    );

    Ok(CommitStats {
        previous_version,
        version: snapshot.version(),
        target_size: new_data.len() as u64,
        delta_size,
        changed_bytes,
        sparse,
        target_sha256: sha256(&new_data),
    })
}

/// Apply the delta at `delta_path` to the snapshot at `snapshot_path`.
///
/// The snapshot file is only rewritten when the delta is accepted.
pub fn apply_file(
    snapshot_path: &Path,
    delta_path: &Path,
    forced: bool,
    opts: SnapshotOptions,
) -> Result<ApplyStats, IoError> {
    let mut snapshot = read_snapshot(snapshot_path)?.with_options(opts);
    let delta_size = fs::metadata(delta_path)?.len();
    let delta = read_delta(delta_path)?;
    let previous_version = snapshot.version();

    snapshot.increment_data(&delta, forced)?;
    replace_frame(snapshot_path, &Frame::Snapshot(snapshot.clone()))?;

    log::info!(
        "applied {} to {}: version {previous_version} -> {}",
        delta_path.display(),
        snapshot_path.display(),
        snapshot.version()
    );

    Ok(ApplyStats {
        previous_version,
        version: snapshot.version(),
        delta_size,
        output_size: snapshot.data().map_or(0, |d| d.len() as u64),
        output_sha256: snapshot.data().map(sha256),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::UNVERSIONED;
    use tempfile::tempdir;

    #[test]
    fn init_commit_apply_roundtrip() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.bin");
        let next = dir.path().join("next.bin");
        let writer = dir.path().join("writer.snap");
        let reader = dir.path().join("reader.snap");
        let delta = dir.path().join("change.delta");

        fs::write(&base, b"The quick brown fox").unwrap();
        fs::write(&next, b"The quick brown cat!").unwrap();

        init_file(&base, &writer).unwrap();
        init_file(&base, &reader).unwrap();

        let commit =
            commit_file(&writer, &next, &delta, SnapshotOptions::default()).unwrap();
        assert_eq!(commit.previous_version, UNVERSIONED);
        assert_eq!(commit.version, UNVERSIONED + 1);
        assert_eq!(commit.target_size, 20);
        assert!(commit.sparse);
        assert_eq!(commit.changed_bytes, 4);

        let applied = apply_file(&reader, &delta, false, SnapshotOptions::default()).unwrap();
        assert_eq!(applied.version, UNVERSIONED + 1);
        assert_eq!(applied.output_sha256, Some(commit.target_sha256));

        let snap = read_snapshot(&reader).unwrap();
        assert_eq!(snap.data(), Some(&b"The quick brown cat!"[..]));
        assert_eq!(read_snapshot(&writer).unwrap(), snap);
    }

    #[test]
    fn rejected_apply_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.bin");
        let snap = dir.path().join("s.snap");
        let delta = dir.path().join("d.delta");

        fs::write(&base, b"abc").unwrap();
        init_file(&base, &snap).unwrap();
        let before = fs::read(&snap).unwrap();

        let stale = Frame::Delta(crate::delta::diff_dense(Some(b"xyz")).with_version(UNVERSIONED));
        write_frame(&delta, &stale).unwrap();

        let err = apply_file(&snap, &delta, false, SnapshotOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::Patch(PatchError::VersionMismatch { .. })));
        assert_eq!(fs::read(&snap).unwrap(), before);
    }

    #[test]
    fn failed_snapshot_replace_leaves_no_delta() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.bin");
        let next = dir.path().join("next.bin");
        let snap = dir.path().join("s.snap");
        let delta = dir.path().join("d.delta");

        fs::write(&base, b"abc").unwrap();
        fs::write(&next, b"abd").unwrap();
        init_file(&base, &snap).unwrap();
        let before = fs::read(&snap).unwrap();

        // A directory squatting on the temp name makes staging fail.
        fs::create_dir(tmp_path(&snap)).unwrap();

        let err = commit_file(&snap, &next, &delta, SnapshotOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::Io(_)));
        assert_eq!(fs::read(&snap).unwrap(), before);
        assert!(!delta.exists());
        assert!(!tmp_path(&delta).exists());

        // Once the path is clear the same commit goes through.
        fs::remove_dir(tmp_path(&snap)).unwrap();
        let stats = commit_file(&snap, &next, &delta, SnapshotOptions::default()).unwrap();
        assert_eq!(stats.version, UNVERSIONED + 1);
        assert_eq!(read_delta(&delta).unwrap().version(), UNVERSIONED + 1);
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let dir = tempdir().unwrap();
        // Renaming a file over a non-empty directory fails.
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();

        let frame = Frame::Snapshot(Snapshot::new(Some(b"abc".to_vec())));
        assert!(replace_frame(&target, &frame).is_err());
        assert!(!tmp_path(&target).exists());
        assert!(target.join("keep").exists());
    }

    #[test]
    fn wrong_frame_kind_is_reported() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.bin");
        let snap = dir.path().join("s.snap");
        fs::write(&base, b"abc").unwrap();
        init_file(&base, &snap).unwrap();

        let err = read_delta(&snap).unwrap_err();
        assert!(matches!(
            err,
            IoError::UnexpectedFrame {
                expected: "delta",
                found: "snapshot",
                ..
            }
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.snap");
        let mut bytes = Frame::Snapshot(Snapshot::new(None)).to_bytes().unwrap();
        bytes.push(0xAA);
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            read_frame(&path),
            Err(IoError::Wire(WireError::Malformed(_)))
        ));
    }
}
