//! phockup - sort photos and videos into a dated directory tree
//!
//! This library provides the engine behind the `phockup` binary:
//! - Capture time resolution from EXIF data, exiftool, file names and
//!   file system timestamps
//! - Template based destination paths (`YYYY/MM/DD/YYYYMMDD-HHMMSS.ext`)
//! - Collision resolution with xxHash content identity, so identical files
//!   are never stored twice under one name and distinct files never
//!   overwrite each other
//! - Copy, move and hard-link transfers that never clobber existing files
//! - Parallel processing with Rayon and a deterministic result

pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod media;
pub mod process;
pub mod scan;
pub mod summary;
pub mod template;
pub mod time;
pub mod transfer;

pub use cli::Cli;
pub use config::{Config, ConfigError, FileOperation};
pub use error::{Error, ErrorKind, Result};
pub use process::{Processor, RunPhase};
pub use summary::RunSummary;
pub use time::{CaptureTime, ExtractedTime, TimeExtractor, TimeResolver, TimeSource};
pub use transfer::{Outcome, TransferResult};
