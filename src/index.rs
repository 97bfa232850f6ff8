//! Destination index and collision resolution
//!
//! The index records which names are taken in every destination directory:
//! entries already on disk when the run starts plus names claimed by files
//! placed during the run. Claiming a name is atomic per directory, so two
//! distinct contents can never be assigned the same final path.
//!
//! Content identities are computed lazily: sizes are compared first and
//! files are only hashed when a name is taken by a file of equal size.

use crate::error::{Error, Result};
use crate::hash::{ContentId, compute_content_id};
use crate::media::MediaFile;
use crate::template::{Placement, with_counter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of claiming a destination name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Final path relative to the destination root
    pub relative_path: PathBuf,
    /// The name already holds identical content; nothing must be written
    pub duplicate: bool,
    /// For a duplicate of a name claimed during this run: the source that
    /// claimed it. The duplicate only holds if that file gets placed.
    pub claimant: Option<PathBuf>,
}

/// Whatever currently holds a name
#[derive(Debug)]
enum Occupant {
    /// Present on disk before the run
    Existing {
        path: PathBuf,
        size: Option<u64>,
        content: Option<ContentId>,
    },
    /// Claimed by a file during this run
    Claimed(Arc<MediaFile>),
}

impl Occupant {
    fn claimant(&self) -> Option<PathBuf> {
        match self {
            Occupant::Claimed(other) => Some(other.path().to_path_buf()),
            Occupant::Existing { .. } => None,
        }
    }

    /// Whether the occupant holds exactly the same bytes as `file`
    ///
    /// Unreadable occupants never match, so they are never overwritten.
    fn same_content(&mut self, file: &MediaFile) -> Result<bool> {
        match self {
            Occupant::Claimed(other) => {
                if other.size() != file.size() {
                    return Ok(false);
                }
                let Ok(other_id) = other.content_id() else {
                    return Ok(false);
                };
                Ok(other_id == file.content_id()?)
            }
            Occupant::Existing {
                path,
                size,
                content,
            } => {
                if *size != Some(file.size()) {
                    return Ok(false);
                }
                let existing = if let Some(id) = *content {
                    id
                } else {
                    match compute_content_id(path) {
                        Ok(id) => {
                            *content = Some(id);
                            id
                        }
                        Err(e) => {
                            warn!(?path, error = %e, "Cannot read existing destination file");
                            *size = None;
                            return Ok(false);
                        }
                    }
                };
                Ok(existing == file.content_id()?)
            }
        }
    }
}

type DirEntries = HashMap<String, Occupant>;

/// Names taken in the destination tree, scoped to one run
#[derive(Debug)]
pub struct DestinationIndex {
    root: PathBuf,
    max_attempts: u32,
    dirs: Mutex<HashMap<PathBuf, Arc<Mutex<DirEntries>>>>,
}

impl DestinationIndex {
    /// An index that assumes the destination is empty
    pub fn empty(root: &Path, max_attempts: u32) -> Self {
        Self {
            root: root.to_path_buf(),
            max_attempts,
            dirs: Mutex::new(HashMap::new()),
        }
    }

    /// Build the index from the current contents of the destination tree
    pub fn open(root: &Path, max_attempts: u32) -> Result<Self> {
        let index = Self::empty(root, max_attempts);
        if !root.exists() {
            debug!(?root, "Destination does not exist yet, starting with an empty index");
            return Ok(index);
        }

        let mut dirs: HashMap<PathBuf, DirEntries> = HashMap::new();
        let mut count = 0usize;

        for entry in WalkDir::new(root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable destination entry");
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let parent = relative.parent().map(Path::to_path_buf).unwrap_or_default();
            let name = entry.file_name().to_string_lossy().into_owned();
            let size = entry
                .metadata()
                .ok()
                .filter(|m| m.is_file())
                .map(|m| m.len());

            dirs.entry(parent).or_default().insert(
                name,
                Occupant::Existing {
                    path: entry.path().to_path_buf(),
                    size,
                    content: None,
                },
            );
            count += 1;
        }

        info!(?root, entries = count, directories = dirs.len(), "Indexed destination tree");

        *index.dirs.lock().unwrap_or_else(PoisonError::into_inner) = dirs
            .into_iter()
            .map(|(dir, entries)| (dir, Arc::new(Mutex::new(entries))))
            .collect();
        Ok(index)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of names currently taken
    pub fn len(&self) -> usize {
        let dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        dirs.values()
            .map(|d| d.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dir(&self, relative_dir: &Path) -> Arc<Mutex<DirEntries>> {
        let mut dirs = self.dirs.lock().unwrap_or_else(PoisonError::into_inner);
        dirs.entry(relative_dir.to_path_buf()).or_default().clone()
    }

    /// Find the final name for a file and register it
    ///
    /// Tries the base name, then `-1`, `-2`, ... up to the configured
    /// number of attempts. A name holding identical content is reported as
    /// a duplicate instead of being skipped over.
    pub fn claim(&self, placement: &Placement, file: &Arc<MediaFile>) -> Result<Claim> {
        let relative_dir = placement.relative_dir();
        let dir = self.dir(&relative_dir);
        let mut entries = dir.lock().unwrap_or_else(PoisonError::into_inner);

        for attempt in 0..=self.max_attempts {
            let name = if attempt == 0 {
                placement.base_name.clone()
            } else {
                with_counter(&placement.base_name, attempt)
            };

            match entries.get_mut(&name) {
                None => {
                    entries.insert(name.clone(), Occupant::Claimed(Arc::clone(file)));
                    return Ok(Claim {
                        relative_path: relative_dir.join(name),
                        duplicate: false,
                        claimant: None,
                    });
                }
                Some(occupant) => {
                    if occupant.same_content(file)? {
                        return Ok(Claim {
                            relative_path: relative_dir.join(name),
                            duplicate: true,
                            claimant: occupant.claimant(),
                        });
                    }
                    debug!(source = ?file.path(), name, "Name taken by different content");
                }
            }
        }

        Err(Error::PathCollisionExhausted {
            path: placement.relative_path(),
            attempts: self.max_attempts,
        })
    }

    /// Register one of a fixed list of names, without counters
    ///
    /// Used for sidecars, which must keep a name matching their file.
    /// Returns `None` when every name is held by different content.
    pub fn reserve(
        &self,
        relative_dir: &Path,
        names: &[String],
        file: &Arc<MediaFile>,
    ) -> Result<Option<Claim>> {
        let dir = self.dir(relative_dir);
        let mut entries = dir.lock().unwrap_or_else(PoisonError::into_inner);

        for name in names {
            match entries.get_mut(name) {
                None => {
                    entries.insert(name.clone(), Occupant::Claimed(Arc::clone(file)));
                    return Ok(Some(Claim {
                        relative_path: relative_dir.join(name),
                        duplicate: false,
                        claimant: None,
                    }));
                }
                Some(occupant) => {
                    if occupant.same_content(file)? {
                        return Ok(Some(Claim {
                            relative_path: relative_dir.join(name),
                            duplicate: true,
                            claimant: occupant.claimant(),
                        }));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Give back a name whose transfer failed
    ///
    /// Only names claimed during this run are released.
    pub fn release(&self, relative_path: &Path) {
        let (Some(parent), Some(name)) = (relative_path.parent(), relative_path.file_name()) else {
            return;
        };
        let dir = self.dir(parent);
        let mut entries = dir.lock().unwrap_or_else(PoisonError::into_inner);
        let name = name.to_string_lossy();
        if matches!(entries.get(name.as_ref()), Some(Occupant::Claimed(_))) {
            entries.remove(name.as_ref());
            debug!(?relative_path, "Released destination claim");
        }
    }
}
