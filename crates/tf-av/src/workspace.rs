//! Crash-safe file replacement.
//!
//! New content is produced in a `.__tmp__` sibling of the target and swapped
//! in with three renames through a `.__bak__` sibling:
//!
//! 1. target → backup
//! 2. temp → target
//! 3. delete backup
//!
//! At every point either the original or the complete replacement sits at
//! the target path (or, between steps 1 and 2, at the backup path where
//! [`recover`] finds it). A [`Workspace`] owns the temp file for one
//! operation and deletes it on every path that does not commit it.

use std::io;
use std::path::{Path, PathBuf};

use tf_core::{Error, Result, Rollback};

/// Infix for in-progress output files.
pub const TMP_INFIX: &str = ".__tmp__";
/// Infix for the original while it is being replaced.
pub const BAK_INFIX: &str = ".__bak__";

fn sibling(path: &Path, infix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{infix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{infix}"),
    };
    path.with_file_name(name)
}

/// `dir/name.__tmp__.ext` for `dir/name.ext`.
pub fn temp_path(target: &Path) -> PathBuf {
    sibling(target, TMP_INFIX)
}

/// `dir/name.__bak__.ext` for `dir/name.ext`.
pub fn backup_path(target: &Path) -> PathBuf {
    sibling(target, BAK_INFIX)
}

/// Result of a successful replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub target: PathBuf,
    /// A backup that could not be deleted. The target already holds the new
    /// content; this file is only clutter.
    pub stray_backup: Option<PathBuf>,
}

/// Move `temp` over `target` using the backup protocol.
///
/// If `target` does not exist this is a plain rename. On failure the error
/// carries a [`Rollback`] describing whether the original is back in place.
/// `temp` is left on disk when the swap fails before the original moved.
pub fn replace(target: &Path, temp: &Path) -> Result<ReplaceOutcome> {
    replace_using(target, temp, |from, to| std::fs::rename(from, to))
}

fn replace_using(
    target: &Path,
    temp: &Path,
    mut rename: impl FnMut(&Path, &Path) -> io::Result<()>,
) -> Result<ReplaceOutcome> {
    if !temp.is_file() {
        return Err(Error::replace(
            target,
            format!("replacement {} does not exist", temp.display()),
            Rollback::NotAttempted,
        ));
    }

    let backup = backup_path(target);

    if !target.exists() {
        rename(temp, target).map_err(|e| {
            Error::replace(target, format!("moving new file into place: {e}"), Rollback::NotAttempted)
        })?;
        let stray_backup = backup.exists().then(|| {
            tracing::warn!(
                "{} exists from an interrupted replace; left for inspection",
                backup.display()
            );
            backup
        });
        return Ok(ReplaceOutcome {
            target: target.to_path_buf(),
            stray_backup,
        });
    }

    // The target exists, so any backup is left over from an earlier run.
    if backup.exists() {
        std::fs::remove_file(&backup).map_err(|e| {
            Error::replace(
                target,
                format!("removing stale backup {}: {e}", backup.display()),
                Rollback::NotAttempted,
            )
        })?;
    }

    rename(target, &backup).map_err(|e| {
        Error::replace(target, format!("moving original aside: {e}"), Rollback::NotAttempted)
    })?;

    if let Err(e) = rename(temp, target) {
        let rollback = match rename(&backup, target) {
            Ok(()) => Rollback::Restored,
            Err(re) => {
                tracing::error!(
                    "original of {} is stranded at {}: {re}",
                    target.display(),
                    backup.display()
                );
                Rollback::Failed(re.to_string())
            }
        };
        return Err(Error::replace(
            target,
            format!("moving new file into place: {e}"),
            rollback,
        ));
    }

    let stray_backup = match std::fs::remove_file(&backup) {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!("could not delete backup {}: {e}", backup.display());
            Some(backup)
        }
    };

    Ok(ReplaceOutcome {
        target: target.to_path_buf(),
        stray_backup,
    })
}

/// What [`recover`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// The target was missing and the backup was moved back.
    pub restored_backup: bool,
    /// The target was present, so a leftover backup was deleted.
    pub removed_stale_backup: bool,
    /// A leftover temp file was deleted.
    pub removed_temp: bool,
}

impl RecoveryReport {
    /// Nothing needed fixing.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Repair the siblings of `target` after an interrupted replace.
pub fn recover(target: &Path) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let backup = backup_path(target);
    let temp = temp_path(target);

    if backup.exists() {
        if target.exists() {
            std::fs::remove_file(&backup)?;
            report.removed_stale_backup = true;
        } else {
            std::fs::rename(&backup, target).map_err(|e| {
                Error::replace(
                    target,
                    format!("restoring {}: {e}", backup.display()),
                    Rollback::Failed(e.to_string()),
                )
            })?;
            tracing::info!("restored {} from backup", target.display());
            report.restored_backup = true;
        }
    }

    if temp.exists() {
        std::fs::remove_file(&temp)?;
        report.removed_temp = true;
    }

    Ok(report)
}

/// Owner of one operation's temp file.
///
/// Write the new content to [`Workspace::temp_path`], then call
/// [`Workspace::finalize`]. Dropping the workspace without a successful
/// finalize deletes the temp file.
///
/// ```no_run
/// use tf_av::Workspace;
///
/// let ws = Workspace::new(std::path::Path::new("/music/song.m4a")).unwrap();
/// std::fs::write(ws.temp_path(), b"new content").unwrap();
/// ws.finalize().unwrap();
/// ```
#[derive(Debug)]
pub struct Workspace {
    target: PathBuf,
    temp: PathBuf,
    committed: bool,
}

impl Workspace {
    /// Claim the temp sibling of `target`, deleting any stale one.
    pub fn new(target: &Path) -> Result<Self> {
        let temp = temp_path(target);
        if temp.exists() {
            tracing::debug!("removing stale temp file {}", temp.display());
            std::fs::remove_file(&temp)?;
        }
        Ok(Self {
            target: target.to_path_buf(),
            temp,
            committed: false,
        })
    }

    /// Where the new content must be written.
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Swap the temp file into place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AtomicReplace`] if the temp file is missing or the
    /// rename sequence fails; the temp file is then deleted.
    pub fn finalize(mut self) -> Result<ReplaceOutcome> {
        let outcome = replace(&self.target, &self.temp)?;
        self.committed = true;
        Ok(outcome)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.committed || !self.temp.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.temp) {
            tracing::warn!("could not delete temp file {}: {e}", self.temp.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup(dir: &Path) -> (PathBuf, PathBuf) {
        let target = dir.join("song.m4a");
        let temp = temp_path(&target);
        fs::write(&target, b"original").unwrap();
        fs::write(&temp, b"replacement").unwrap();
        (target, temp)
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn sibling_names() {
        let target = Path::new("/m/My Song.mp3");
        assert_eq!(temp_path(target), Path::new("/m/My Song.__tmp__.mp3"));
        assert_eq!(backup_path(target), Path::new("/m/My Song.__bak__.mp3"));
        assert_eq!(temp_path(Path::new("/m/noext")), Path::new("/m/noext.__tmp__"));
    }

    #[test]
    fn replace_swaps_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (target, temp) = setup(dir.path());

        let outcome = replace(&target, &temp).unwrap();
        assert_eq!(outcome.stray_backup, None);
        assert_eq!(fs::read(&target).unwrap(), b"replacement");
        assert_eq!(names(dir.path()), ["song.m4a"]);
    }

    #[test]
    fn replace_missing_target_is_plain_rename() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("new.mp4");
        let temp = temp_path(&target);
        fs::write(&temp, b"fresh").unwrap();

        replace(&target, &temp).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"fresh");
        assert_eq!(names(dir.path()), ["new.mp4"]);
    }

    #[test]
    fn replace_removes_stale_backup_first() {
        let dir = tempfile::tempdir().unwrap();
        let (target, temp) = setup(dir.path());
        fs::write(backup_path(&target), b"ancient").unwrap();

        replace(&target, &temp).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"replacement");
        assert_eq!(names(dir.path()), ["song.m4a"]);
    }

    #[test]
    fn missing_temp_leaves_original() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("song.m4a");
        fs::write(&target, b"original").unwrap();

        let err = replace(&target, &temp_path(&target)).unwrap_err();
        assert!(matches!(
            err,
            Error::AtomicReplace { rollback: Rollback::NotAttempted, .. }
        ));
        assert_eq!(fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn step_one_failure_keeps_original_and_temp() {
        let dir = tempfile::tempdir().unwrap();
        let (target, temp) = setup(dir.path());

        let err = replace_using(&target, &temp, |_, _| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        })
        .unwrap_err();

        assert!(matches!(
            err,
            Error::AtomicReplace { rollback: Rollback::NotAttempted, .. }
        ));
        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert!(temp.exists());
    }

    #[test]
    fn step_two_failure_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let (target, temp) = setup(dir.path());

        let mut calls = 0;
        let err = replace_using(&target, &temp, |from, to| {
            calls += 1;
            if calls == 2 {
                Err(io::Error::new(io::ErrorKind::Other, "disk yanked"))
            } else {
                fs::rename(from, to)
            }
        })
        .unwrap_err();

        match err {
            Error::AtomicReplace { rollback, message, .. } => {
                assert_eq!(rollback, Rollback::Restored);
                assert!(message.contains("disk yanked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert!(!backup_path(&target).exists());
    }

    #[test]
    fn failed_rollback_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (target, temp) = setup(dir.path());

        let mut calls = 0;
        let err = replace_using(&target, &temp, |from, to| {
            calls += 1;
            if calls >= 2 {
                Err(io::Error::new(io::ErrorKind::Other, "read-only"))
            } else {
                fs::rename(from, to)
            }
        })
        .unwrap_err();

        assert!(matches!(
            err,
            Error::AtomicReplace { rollback: Rollback::Failed(_), .. }
        ));
        // The original survives at the backup path; recover brings it back.
        assert_eq!(fs::read(backup_path(&target)).unwrap(), b"original");
        let report = recover(&target).unwrap();
        assert!(report.restored_backup);
        assert!(report.removed_temp);
        assert_eq!(fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn recover_after_interruption_between_steps() {
        let dir = tempfile::tempdir().unwrap();
        let (target, _temp) = setup(dir.path());
        // Crash right after step 1.
        fs::rename(&target, backup_path(&target)).unwrap();

        let report = recover(&target).unwrap();
        assert_eq!(
            report,
            RecoveryReport {
                restored_backup: true,
                removed_stale_backup: false,
                removed_temp: true,
            }
        );
        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert_eq!(names(dir.path()), ["song.m4a"]);
    }

    #[test]
    fn recover_drops_stale_backup_when_target_present() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        fs::write(&target, b"new").unwrap();
        fs::write(backup_path(&target), b"old").unwrap();

        let report = recover(&target).unwrap();
        assert!(report.removed_stale_backup);
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(recover(&target).unwrap().is_clean());
    }

    #[test]
    fn workspace_finalize_commits() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mkv");
        fs::write(&target, b"original").unwrap();

        let ws = Workspace::new(&target).unwrap();
        fs::write(ws.temp_path(), b"processed").unwrap();
        ws.finalize().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"processed");
        assert_eq!(names(dir.path()), ["movie.mkv"]);
    }

    #[test]
    fn workspace_drop_deletes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mkv");
        fs::write(&target, b"original").unwrap();

        {
            let ws = Workspace::new(&target).unwrap();
            fs::write(ws.temp_path(), b"half written").unwrap();
        }
        assert_eq!(names(dir.path()), ["movie.mkv"]);
        assert_eq!(fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn workspace_finalize_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mkv");
        fs::write(&target, b"original").unwrap();

        let ws = Workspace::new(&target).unwrap();
        assert!(ws.finalize().is_err());
        assert_eq!(fs::read(&target).unwrap(), b"original");
    }

    #[test]
    fn workspace_clears_stale_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("movie.mkv");
        fs::write(temp_path(&target), b"from a crash").unwrap();

        let ws = Workspace::new(&target).unwrap();
        assert!(!ws.temp_path().exists());
    }
}
