//! Local message archive — attachment storage, order-file mirror and the
//! retention sweep.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::ArchiveError;
use crate::rules::OrderDirection;

/// Companion filename for the raw source message of a data file.
pub const COMPANION_FILENAME: &str = "Сообщение Email.eml";
/// Message archives this many days old are pruned after a sweep.
const RETENTION_DAYS: i64 = 8;

/// Filesystem layout: `{root}/app/emails/{YYYY-MM-DD}/{seq}/{filename}` for
/// per-message archives and `{root}/app/files/{direction}/` for the mirror
/// of files uploaded to a confirmed order.
pub struct MessageArchive {
    root: PathBuf,
}

impl MessageArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn emails_dir(&self) -> PathBuf {
        self.root.join("app").join("emails")
    }

    /// Archive directory for one message.
    pub fn message_dir(&self, date: NaiveDate, seq: u32) -> PathBuf {
        self.emails_dir()
            .join(date.format("%Y-%m-%d").to_string())
            .join(seq.to_string())
    }

    /// Write one attachment into the message archive.
    pub fn save_attachment(
        &self,
        date: NaiveDate,
        seq: u32,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, ArchiveError> {
        let dir = self.message_dir(date, seq);
        fs::create_dir_all(&dir).map_err(|e| ArchiveError::io(&dir, e))?;
        let path = dir.join(filename);
        fs::write(&path, data).map_err(|e| ArchiveError::io(&path, e))?;
        debug!(path = %path.display(), "Attachment archived");
        Ok(path)
    }

    /// Mirror a file that was uploaded to a confirmed order.
    pub fn save_order_file(
        &self,
        direction: OrderDirection,
        stored_name: &str,
        data: &[u8],
    ) -> Result<PathBuf, ArchiveError> {
        let dir = self.root.join("app").join("files").join(direction.slug());
        fs::create_dir_all(&dir).map_err(|e| ArchiveError::io(&dir, e))?;
        let path = dir.join(stored_name);
        fs::write(&path, data).map_err(|e| ArchiveError::io(&path, e))?;
        Ok(path)
    }

    /// Delete the message archive dated exactly [`RETENTION_DAYS`] before
    /// `today`. A missing directory is a no-op.
    pub fn prune_old(&self, today: NaiveDate) -> Result<(), ArchiveError> {
        let cutoff = today - chrono::Duration::days(RETENTION_DAYS);
        let dir = self.emails_dir().join(cutoff.format("%Y-%m-%d").to_string());
        if !dir.is_dir() {
            return Ok(());
        }
        remove_tree(&dir)?;
        info!(path = %dir.display(), "Pruned expired message archive");
        Ok(())
    }
}

/// Depth-first removal that unlinks symbolic links instead of following
/// them.
fn remove_tree(root: &Path) -> Result<(), ArchiveError> {
    let mut stack = vec![root.to_path_buf()];
    let mut dirs = Vec::new();

    while let Some(path) = stack.pop() {
        // symlink_metadata never follows links, so a symlink to a
        // directory lands in the unlink branch.
        let meta = fs::symlink_metadata(&path).map_err(|e| ArchiveError::io(&path, e))?;
        if meta.is_dir() {
            for entry in fs::read_dir(&path).map_err(|e| ArchiveError::io(&path, e))? {
                let entry = entry.map_err(|e| ArchiveError::io(&path, e))?;
                stack.push(entry.path());
            }
            dirs.push(path);
        } else {
            fs::remove_file(&path).map_err(|e| ArchiveError::io(&path, e))?;
        }
    }

    // Children were stacked after their parents; remove in reverse.
    for dir in dirs.iter().rev() {
        fs::remove_dir(dir).map_err(|e| ArchiveError::io(dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn save_attachment_creates_dated_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = MessageArchive::new(tmp.path());

        let path = archive
            .save_attachment(date("2024-05-01"), 3, "in2024.dat", b"data")
            .unwrap();

        assert!(path.ends_with("app/emails/2024-05-01/3/in2024.dat"));
        assert_eq!(fs::read(&path).unwrap(), b"data");
    }

    #[test]
    fn prune_removes_only_the_cutoff_date() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = MessageArchive::new(tmp.path());

        archive
            .save_attachment(date("2024-05-01"), 1, "a.dat", b"old")
            .unwrap();
        archive
            .save_attachment(date("2024-05-05"), 1, "b.dat", b"recent")
            .unwrap();

        // 2024-05-09 minus 8 days = 2024-05-01.
        archive.prune_old(date("2024-05-09")).unwrap();

        assert!(!archive.message_dir(date("2024-05-01"), 1).exists());
        assert!(archive.message_dir(date("2024-05-05"), 1).exists());
    }

    #[test]
    fn prune_missing_directory_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = MessageArchive::new(tmp.path());
        archive.prune_old(date("2024-05-09")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn prune_unlinks_symlinks_without_following() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = MessageArchive::new(tmp.path());

        archive
            .save_attachment(date("2024-05-01"), 1, "a.dat", b"old")
            .unwrap();

        // A directory outside the archive, linked from within it.
        let outside = tmp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("keep.txt"), b"keep").unwrap();
        std::os::unix::fs::symlink(
            &outside,
            archive.message_dir(date("2024-05-01"), 1).join("link"),
        )
        .unwrap();

        archive.prune_old(date("2024-05-09")).unwrap();

        assert!(!archive.message_dir(date("2024-05-01"), 1).exists());
        assert!(outside.join("keep.txt").exists());
    }

    #[test]
    fn save_order_file_uses_direction_slug() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = MessageArchive::new(tmp.path());

        let path = archive
            .save_order_file(OrderDirection::Outbound, "f1_p1_100.dat", b"x")
            .unwrap();
        assert!(path.ends_with("app/files/outcoming/f1_p1_100.dat"));
    }
}
