//! Source image lookup.
//!
//! Sources are plain files under a single root directory. A source path is
//! always relative to that root; [`sanitize_source`] rejects anything that
//! could escape it and normalizes the rest, and [`SourceResolver::resolve`]
//! checks again before touching the filesystem.
//!
//! The image format is sniffed from the file header, never taken from the
//! extension.

use crate::error::ServerError;
use crate::types::{Format, Image};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::error;

/// Validate and normalize a client-supplied source path.
///
/// Empty and `.` segments are dropped. Absolute paths, `..` segments, NUL
/// bytes and backslashes are rejected.
pub fn sanitize_source(raw: &str) -> Result<String, ServerError> {
    if raw.contains('\0') || raw.contains('\\') {
        return Err(ServerError::BadSource(format!(
            "'{}' contains forbidden characters",
            raw.escape_default()
        )));
    }
    if raw.starts_with('/') {
        return Err(ServerError::BadSource(format!("'{raw}' is absolute")));
    }

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(ServerError::BadSource(format!(
                    "'{raw}' leaves the source directory"
                )));
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Err(ServerError::BadSource(format!("'{raw}' names no file")));
    }
    Ok(segments.join("/"))
}

/// Reads source images from a directory tree.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    root: PathBuf,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the bytes behind `source` and detect their format.
    pub async fn resolve(&self, source: &str) -> Result<Image, ServerError> {
        let relative = sanitize_source(source)?;
        let path = self.root.join(&relative);

        // Symlinks may still point outside the root
        let (root, resolved) = match tokio::try_join!(
            tokio::fs::canonicalize(&self.root),
            tokio::fs::canonicalize(&path)
        ) {
            Ok(pair) => pair,
            Err(e) => return Err(io_error(&relative, e)),
        };
        if !resolved.starts_with(&root) {
            return Err(ServerError::BadSource(format!(
                "'{relative}' leaves the source directory"
            )));
        }

        let data = tokio::fs::read(&resolved)
            .await
            .map_err(|e| io_error(&relative, e))?;

        let format = image::guess_format(&data)
            .ok()
            .and_then(Format::from_image_format)
            .ok_or_else(|| ServerError::Decode(format!("'{relative}' is not a supported image")))?;

        Ok(Image::new(format, data))
    }
}

fn io_error(relative: &str, err: std::io::Error) -> ServerError {
    match err.kind() {
        // A file used as a directory (`photo.jpg/x.jpg`) is just as absent
        ErrorKind::NotFound
        | ErrorKind::IsADirectory
        | ErrorKind::NotADirectory
        | ErrorKind::InvalidFilename => ServerError::NotFound(relative.to_string()),
        _ => {
            error!(source = relative, error = %err, "failed to read source");
            ServerError::Unexpected(format!("reading '{relative}': {err}"))
        }
    }
}
