//! Local file access for the browser client.
//!
//! # Responsibilities
//! - Serve a single file's bytes with a guessed Content-Type
//! - List a directory (see [`listing`])
//! - Report failures through the shared envelope taxonomy
//!
//! # Design Decisions
//! - Disabled unless `features.local_files` is set; the HTTP layer answers
//!   404 with no body otherwise
//! - Only absolute paths are accepted, after lexical `.`/`..` cleanup

pub mod listing;

use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::forward::error::EnvelopeError;

pub use listing::{format_file_size, list_directory, DirEntry, DirectoryListing, EntryKind};

/// `POST /file` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileRequest {
    pub path: Option<String>,
}

/// `POST /dir` payload. A missing or null `path` lists the home directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRequest {
    pub path: Option<String>,
    pub show_hidden_files: Option<bool>,
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{0}")]
    ReadBody(String),

    #[error("Failed to parse JSON request: {0}")]
    InvalidJson(String),

    #[error("File path is required")]
    MissingPath,

    #[error("Path must be absolute")]
    NotAbsolute,

    #[error("{kind} not found: {path}")]
    NotFound { kind: &'static str, path: String },

    #[error("Path is a directory, not a file")]
    IsDirectory,

    #[error("Path is a file, not a directory")]
    NotDirectory,

    #[error("{0}")]
    Access(String),
}

impl FileError {
    /// Not-found is the one file error with a non-200 transport status.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileError::NotFound { .. })
    }
}

impl EnvelopeError for FileError {
    fn error_type(&self) -> &'static str {
        match self {
            FileError::ReadBody(_) | FileError::InvalidJson(_) | FileError::MissingPath => {
                "request_format_error"
            }
            FileError::NotFound { .. } => "file_not_found",
            _ => "file_access_error",
        }
    }

    fn error_title(&self) -> &'static str {
        match self {
            FileError::ReadBody(_) => "Failed to read request body",
            FileError::InvalidJson(_) => "Invalid JSON",
            FileError::MissingPath => "Missing path",
            FileError::NotFound { .. } => "File Not Found",
            _ => "File Access Error",
        }
    }
}

/// A file read for delivery.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub path: PathBuf,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Lexically resolve `.` and `..`; `..` never climbs above the root.
pub fn clean_path(raw: &str) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

pub(crate) fn absolute_path(raw: &str) -> Result<PathBuf, FileError> {
    let path = clean_path(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(FileError::NotAbsolute)
    }
}

pub async fn read_file(raw_path: &str) -> Result<FileContent, FileError> {
    if raw_path.is_empty() {
        return Err(FileError::MissingPath);
    }
    let path = absolute_path(raw_path)?;
    tracing::debug!(path = %path.display(), "File request");

    let metadata = tokio::fs::metadata(&path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            FileError::NotFound {
                kind: "File",
                path: path.display().to_string(),
            }
        } else {
            FileError::Access(format!("Cannot access file: {}", err))
        }
    })?;
    if metadata.is_dir() {
        return Err(FileError::IsDirectory);
    }

    let data = tokio::fs::read(&path)
        .await
        .map_err(|err| FileError::Access(format!("Failed to read file: {}", err)))?;
    let content_type = detect_content_type(&path, &data);

    tracing::info!(
        path = %path.display(),
        bytes = data.len(),
        content_type = %content_type,
        "Served file"
    );

    Ok(FileContent {
        path,
        content_type,
        data,
    })
}

/// Extension lookup, then a UTF-8 sniff.
pub fn detect_content_type(path: &Path, data: &[u8]) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(known) = extension.as_deref().and_then(content_type_for_extension) {
        return known.to_string();
    }

    if std::str::from_utf8(data).is_ok() {
        "text/plain; charset=utf-8".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let content_type = match extension {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "text/xml; charset=utf-8",
        "txt" | "log" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => return None,
    };
    Some(content_type)
}
