//! Directory listing.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::files::{absolute_path, FileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_symlink: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_human: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    /// `None` (serialised as `null`) at the filesystem root.
    pub parent_dir: Option<String>,
    pub current_dir: String,
    pub dir: Vec<DirEntry>,
}

/// Home directory, or the filesystem root when there is none.
pub fn default_root() -> PathBuf {
    let home = if cfg!(windows) {
        std::env::var_os("USERPROFILE")
    } else {
        std::env::var_os("HOME")
    };

    match home {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ if cfg!(windows) => PathBuf::from("C:\\"),
        _ => PathBuf::from("/"),
    }
}

/// Whole-unit size: `kb`, `MB` or `GB`, rounded to nearest.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{} GB", (bytes + GB / 2) / GB)
    } else if bytes >= MB {
        format!("{} MB", (bytes + MB / 2) / MB)
    } else if bytes >= KB {
        format!("{} kb", (bytes + KB / 2) / KB)
    } else {
        "0 kb".to_string()
    }
}

pub async fn list_directory(
    raw_path: Option<&str>,
    show_hidden: bool,
) -> Result<DirectoryListing, FileError> {
    let path = match raw_path {
        Some(raw) => absolute_path(raw)?,
        None => absolute_path(&default_root().to_string_lossy())?,
    };
    tracing::debug!(path = %path.display(), show_hidden, "Directory request");

    let metadata = tokio::fs::metadata(&path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            FileError::NotFound {
                kind: "Directory",
                path: path.display().to_string(),
            }
        } else {
            FileError::Access(format!("Cannot access path: {}", err))
        }
    })?;
    if !metadata.is_dir() {
        return Err(FileError::NotDirectory);
    }

    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|err| FileError::Access(format!("Failed to read directory: {}", err)))?;

    let mut entries = Vec::new();
    loop {
        let entry = match reader.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                return Err(FileError::Access(format!("Failed to read directory: {}", err)));
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if !show_hidden && name.starts_with('.') {
            continue;
        }

        if let Some(described) = describe_entry(&entry.path(), name).await {
            entries.push(described);
        }
    }
    entries.sort_by(compare_entries);

    tracing::info!(path = %path.display(), entries = entries.len(), "Listed directory");

    Ok(DirectoryListing {
        parent_dir: path.parent().map(|parent| parent.display().to_string()),
        current_dir: path.display().to_string(),
        dir: entries,
    })
}

/// Symlinks are followed to pick their kind; a broken link reads as a file.
/// Entries that cannot even be lstat'ed are skipped.
async fn describe_entry(path: &Path, name: String) -> Option<DirEntry> {
    let link_meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable entry");
            return None;
        }
    };

    let is_symlink = link_meta.file_type().is_symlink();
    let target_meta = if is_symlink {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Cannot follow symlink");
                None
            }
        }
    } else {
        Some(link_meta)
    };

    let (kind, size) = match target_meta {
        Some(meta) if meta.is_dir() => (EntryKind::Directory, None),
        Some(meta) => (EntryKind::File, Some(meta.len())),
        None => (EntryKind::File, None),
    };

    Some(DirEntry {
        name,
        kind,
        is_symlink: is_symlink.then_some(true),
        size_bytes: size,
        size_human: size.map(format_file_size),
    })
}

fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(format_file_size(0), "0 kb");
        assert_eq!(format_file_size(1023), "0 kb");
        assert_eq!(format_file_size(1024), "1 kb");
        assert_eq!(format_file_size(1536), "2 kb");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 + 1), "3 GB");
    }

    #[tokio::test]
    async fn lists_sorted_and_filters_hidden() {
        let root = std::env::temp_dir().join(format!("slingshot-dir-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(root.join("Zeta")).await.unwrap();
        tokio::fs::create_dir_all(root.join("alpha")).await.unwrap();
        tokio::fs::write(root.join("b.txt"), vec![b'x'; 2048]).await.unwrap();
        tokio::fs::write(root.join("A.txt"), b"a").await.unwrap();
        tokio::fs::write(root.join(".hidden"), b"h").await.unwrap();

        let listing = list_directory(root.to_str(), false).await.unwrap();
        let names: Vec<_> = listing.dir.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Zeta", "A.txt", "b.txt"]);
        assert_eq!(listing.current_dir, root.display().to_string());
        assert!(listing.parent_dir.is_some());

        let file = &listing.dir[3];
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size_bytes, Some(2048));
        assert_eq!(file.size_human.as_deref(), Some("2 kb"));
        assert_eq!(listing.dir[0].size_bytes, None);

        let with_hidden = list_directory(root.to_str(), true).await.unwrap();
        assert_eq!(with_hidden.dir.len(), 5);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_flagged() {
        let root = std::env::temp_dir().join(format!("slingshot-links-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(root.join("target")).await.unwrap();
        tokio::fs::symlink(root.join("target"), root.join("to-dir")).await.unwrap();
        tokio::fs::symlink(root.join("gone"), root.join("broken")).await.unwrap();

        let listing = list_directory(root.to_str(), false).await.unwrap();
        let to_dir = listing.dir.iter().find(|e| e.name == "to-dir").unwrap();
        assert_eq!(to_dir.kind, EntryKind::Directory);
        assert_eq!(to_dir.is_symlink, Some(true));

        let broken = listing.dir.iter().find(|e| e.name == "broken").unwrap();
        assert_eq!(broken.kind, EntryKind::File);
        assert_eq!(broken.is_symlink, Some(true));
        assert_eq!(broken.size_bytes, None);

        let target = listing.dir.iter().find(|e| e.name == "target").unwrap();
        assert_eq!(target.is_symlink, None);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn root_has_no_parent() {
        let listing = list_directory(Some("/"), false).await.unwrap();
        assert_eq!(listing.parent_dir, None);
        assert_eq!(listing.current_dir, "/");
    }

    #[tokio::test]
    async fn file_is_not_a_directory() {
        let path = std::env::temp_dir().join(format!("slingshot-notdir-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"x").await.unwrap();
        assert!(matches!(
            list_directory(path.to_str(), false).await,
            Err(FileError::NotDirectory)
        ));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
