//! Discovered input files

use crate::error::{Error, Result};
use crate::hash::{ContentId, compute_content_id};
use crate::template::normalized_extension;
use crate::time::{CaptureTime, TimeResolver};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// One input file and everything known about it
///
/// Immutable after construction except for the content identity, which is
/// computed on first use and cached.
#[derive(Debug)]
pub struct MediaFile {
    path: PathBuf,
    file_name: String,
    extension: Option<String>,
    size: u64,
    capture_time: CaptureTime,
    content: OnceLock<ContentId>,
}

impl MediaFile {
    /// Stat a source file and resolve its capture time
    pub fn open(path: &Path, resolver: &TimeResolver) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| Error::source_unreadable(path, e))?;
        let capture_time = resolver.resolve(path);
        Ok(Self::new(path.to_path_buf(), metadata.len(), capture_time))
    }

    pub fn new(path: PathBuf, size: u64, capture_time: CaptureTime) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = normalized_extension(&file_name);
        Self {
            path,
            file_name,
            extension,
            size,
            capture_time,
            content: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn capture_time(&self) -> &CaptureTime {
        &self.capture_time
    }

    /// Content identity, hashed on first call
    pub fn content_id(&self) -> Result<ContentId> {
        if let Some(id) = self.content.get() {
            return Ok(*id);
        }
        let id = compute_content_id(&self.path).map_err(|e| Error::source_unreadable(&self.path, e))?;
        Ok(*self.content.get_or_init(|| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_media_file_fields() {
        let mut file = Builder::new().prefix("IMG").suffix(".JPG").tempfile().unwrap();
        file.write_all(b"12345").unwrap();
        file.flush().unwrap();

        let resolver = TimeResolver::new(vec![]);
        let media = MediaFile::open(file.path(), &resolver).unwrap();
        assert_eq!(media.size(), 5);
        assert_eq!(media.extension(), Some("jpg"));
        assert!(media.file_name().starts_with("IMG"));
        assert_eq!(media.capture_time(), &CaptureTime::Unknown);
    }

    #[test]
    fn test_content_id_is_cached() {
        let mut file = Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        let media = MediaFile::new(file.path().to_path_buf(), 3, CaptureTime::Unknown);
        let first = media.content_id().unwrap();

        // Changing the file afterwards does not change the cached identity
        std::fs::write(file.path(), b"changed").unwrap();
        assert_eq!(media.content_id().unwrap(), first);
    }

    #[test]
    fn test_missing_source_is_unreadable() {
        let resolver = TimeResolver::new(vec![]);
        let err = MediaFile::open(Path::new("/no/such/photo.jpg"), &resolver).unwrap_err();
        assert!(matches!(err, Error::SourceUnreadable { .. }));
    }
}
