//! File transfer without overwriting
//!
//! Copies go through a temporary file in the destination directory that is
//! renamed into place only if the final name is still free, so an
//! interrupted or failed copy never leaves a partial file behind. Moves
//! never delete the source before the destination is complete.

use crate::config::FileOperation;
use crate::error::{Error, ErrorKind, Result};
use crate::time::TimeSource;
use filetime::FileTime;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Copy buffer size (256KB)
const BUFFER_SIZE: usize = 256 * 1024;

/// Prefix of in-flight temporary files in the destination tree
const TEMP_PREFIX: &str = ".phockup-";

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Moved,
    Copied,
    Linked,
    SkippedDuplicate,
    SkippedError,
}

impl Outcome {
    fn for_operation(operation: FileOperation) -> Self {
        match operation {
            FileOperation::Copy => Outcome::Copied,
            FileOperation::Move => Outcome::Moved,
            FileOperation::Link => Outcome::Linked,
        }
    }
}

/// Error detail attached to a failed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for FileError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Result of processing a single file
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    /// Source file path
    pub source: PathBuf,
    /// Final destination path (absolute), if one was determined
    pub destination: Option<PathBuf>,
    pub outcome: Outcome,
    /// Where the capture time came from, if one was found
    pub time_source: Option<TimeSource>,
    pub error: Option<FileError>,
    /// Nothing was written because the run is a dry run
    pub dry_run: bool,
    /// Problems that did not change the outcome, such as a sidecar left behind
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TransferResult {
    pub fn failed(source: &Path, destination: Option<PathBuf>, error: &Error) -> Self {
        Self {
            source: source.to_path_buf(),
            destination,
            outcome: Outcome::SkippedError,
            time_source: None,
            error: Some(FileError::from(error)),
            dry_run: false,
            warnings: Vec::new(),
        }
    }

    pub fn with_time_source(mut self, time_source: Option<TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn is_error(&self) -> bool {
        self.outcome == Outcome::SkippedError
    }
}

/// Performs the filesystem side of a run
#[derive(Debug, Clone, Copy)]
pub struct TransferExecutor {
    operation: FileOperation,
    dry_run: bool,
}

impl TransferExecutor {
    pub fn new(operation: FileOperation, dry_run: bool) -> Self {
        Self { operation, dry_run }
    }

    /// Place `source` at `destination`
    ///
    /// `duplicate` is the collision verdict: when set nothing is written.
    /// Failures are reported in the result, never returned.
    pub fn execute(&self, source: &Path, destination: &Path, duplicate: bool) -> TransferResult {
        self.execute_with_sidecars(source, destination, duplicate, &[])
    }

    /// Like [`TransferExecutor::execute`], then carry each `(sidecar, target)`
    /// pair along once the file itself is in place
    pub fn execute_with_sidecars(
        &self,
        source: &Path,
        destination: &Path,
        duplicate: bool,
        sidecars: &[(PathBuf, PathBuf)],
    ) -> TransferResult {
        let result = |outcome: Outcome, error: Option<FileError>| TransferResult {
            source: source.to_path_buf(),
            destination: Some(destination.to_path_buf()),
            outcome,
            time_source: None,
            error,
            dry_run: self.dry_run,
            warnings: Vec::new(),
        };

        if duplicate {
            warn!(?source, ?destination, "Skipped, duplicated file");
            return result(Outcome::SkippedDuplicate, None);
        }

        let outcome = Outcome::for_operation(self.operation);

        if self.dry_run {
            info!(?source, ?destination, ?outcome, "Dry run: would place file");
            return result(outcome, None);
        }

        match self.place(source, destination) {
            Ok(()) => {
                info!(?source, ?destination, ?outcome, "Placed file");
                let warnings = self.transfer_sidecars(sidecars);
                result(outcome, None).with_warnings(warnings)
            }
            Err(e) => {
                tracing::error!(?source, ?destination, error = %e, "Failed to place file");
                result(Outcome::SkippedError, Some(FileError::from(&e)))
            }
        }
    }

    fn place(&self, source: &Path, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::write_failed(parent, e))?;
        }

        match self.operation {
            FileOperation::Copy => copy_no_clobber(source, destination),
            FileOperation::Move => move_no_clobber(source, destination),
            FileOperation::Link => {
                let target = link_target(source)?;
                fs::hard_link(&target, destination).map_err(|e| link_error(&target, destination, e))
            }
        }
    }

    /// Sidecar failures never change the outcome of the media file
    fn transfer_sidecars(&self, sidecars: &[(PathBuf, PathBuf)]) -> Vec<String> {
        let mut warnings = Vec::new();
        for (sidecar, target) in sidecars {
            match self.place(sidecar, target) {
                Ok(()) => info!(source = ?sidecar, destination = ?target, "Placed sidecar"),
                Err(e) => {
                    warn!(source = ?sidecar, destination = ?target, error = %e, "Failed to place sidecar");
                    warnings.push(format!("sidecar {}: {}", sidecar.display(), e));
                }
            }
        }
        warnings
    }
}

/// XMP sidecar names for a source file, with the names each may take next
/// to the final file, in order of preference
///
/// `IMG_1.CR2.xmp` becomes `<final>.xmp`; `IMG_1.xmp` becomes
/// `<final stem>.xmp`, or `<final>.xmp` when the stem name is taken.
pub fn sidecar_candidates(source: &Path, final_name: &str) -> Vec<(PathBuf, Vec<String>)> {
    let appended_source = {
        let mut name = source.as_os_str().to_os_string();
        name.push(".xmp");
        PathBuf::from(name)
    };
    let appended_name = format!("{}.xmp", final_name);
    let mut candidates = vec![(appended_source, vec![appended_name.clone()])];

    if source.extension().is_some() {
        let stem_name = match Path::new(final_name).file_stem().and_then(|s| s.to_str()) {
            Some(stem) if Path::new(final_name).extension().is_some() => format!("{}.xmp", stem),
            _ => appended_name.clone(),
        };
        let mut names = vec![stem_name];
        if names[0] != appended_name {
            names.push(appended_name);
        }
        candidates.push((source.with_extension("xmp"), names));
    }

    candidates
}

/// The file a source path stands for: symlinks are resolved so the
/// content is linked, not the link
fn link_target(source: &Path) -> Result<PathBuf> {
    let meta = fs::symlink_metadata(source).map_err(|e| Error::source_unreadable(source, e))?;
    if meta.file_type().is_symlink() {
        fs::canonicalize(source).map_err(|e| Error::source_unreadable(source, e))
    } else {
        Ok(source.to_path_buf())
    }
}

fn link_error(source: &Path, destination: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound && !source.exists() {
        Error::source_unreadable(source, e)
    } else {
        Error::write_failed(destination, e)
    }
}

/// Copy content, permissions and timestamps, then rename into place
/// unless `destination` exists
fn copy_no_clobber(source: &Path, destination: &Path) -> Result<()> {
    let parent = destination
        .parent()
        .ok_or_else(|| Error::write_failed(destination, io::Error::other("no parent directory")))?;

    let src_file = File::open(source).map_err(|e| Error::source_unreadable(source, e))?;
    let src_meta = src_file
        .metadata()
        .map_err(|e| Error::source_unreadable(source, e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| Error::write_failed(destination, e))?;

    {
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, src_file);
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, temp.as_file_mut());
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| Error::source_unreadable(source, e))?;
            if bytes_read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| Error::write_failed(destination, e))?;
        }
        writer.flush().map_err(|e| Error::write_failed(destination, e))?;
    }

    let temp_file = temp.as_file();
    temp_file
        .sync_all()
        .map_err(|e| Error::write_failed(destination, e))?;

    let written = temp_file
        .metadata()
        .map_err(|e| Error::write_failed(destination, e))?
        .len();
    if written != src_meta.len() {
        return Err(Error::write_failed(
            destination,
            io::Error::other(format!(
                "short write: {} of {} bytes",
                written,
                src_meta.len()
            )),
        ));
    }

    if let Err(e) = temp_file.set_permissions(src_meta.permissions()) {
        debug!(?destination, error = %e, "Could not copy permissions");
    }
    let atime = FileTime::from_last_access_time(&src_meta);
    let mtime = FileTime::from_last_modification_time(&src_meta);
    if let Err(e) = filetime::set_file_handle_times(temp_file, Some(atime), Some(mtime)) {
        debug!(?destination, error = %e, "Could not preserve timestamps");
    }

    temp.persist_noclobber(destination)
        .map_err(|e| Error::write_failed(destination, e.error))?;
    Ok(())
}

/// Link-then-unlink on the same filesystem, verified copy-then-delete
/// otherwise
///
/// A symlinked source places the file it points to and removes the link.
fn move_no_clobber(source: &Path, destination: &Path) -> Result<()> {
    let target = link_target(source)?;
    match fs::hard_link(&target, destination) {
        Ok(()) => remove_source(source, destination),
        Err(e) if matches!(e.kind(), io::ErrorKind::AlreadyExists | io::ErrorKind::NotFound) => {
            Err(link_error(&target, destination, e))
        }
        Err(e) => {
            debug!(?source, error = %e, "Hard link failed, falling back to copy and delete");
            move_by_copy(source, destination)
        }
    }
}

/// Move across filesystems
fn move_by_copy(source: &Path, destination: &Path) -> Result<()> {
    copy_no_clobber(source, destination)?;
    remove_after_verified_copy(source, destination)
}

/// The source is only removed once the copy has the full size
fn remove_after_verified_copy(source: &Path, destination: &Path) -> Result<()> {
    verify_same_size(source, destination)?;
    remove_source(source, destination)
}

fn remove_source(source: &Path, destination: &Path) -> Result<()> {
    fs::remove_file(source).map_err(|e| Error::SourceNotRemoved {
        path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        source: e,
    })
}

fn verify_same_size(source: &Path, destination: &Path) -> Result<()> {
    let src_len = fs::metadata(source)
        .map_err(|e| Error::source_unreadable(source, e))?
        .len();
    let dest_len = fs::metadata(destination)
        .map_err(|e| Error::write_failed(destination, e))?
        .len();
    if src_len != dest_len {
        return Err(Error::write_failed(
            destination,
            io::Error::other(format!(
                "size mismatch after copy: {} != {}",
                dest_len, src_len
            )),
        ));
    }
    Ok(())
}
