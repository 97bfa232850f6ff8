//! xxHash-based content identity for duplicate detection
//!
//! A file's identity is its size plus a streamed xxh3-128 digest of the
//! whole content. Size is compared first so most collisions are settled
//! without reading either file.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::trace;
use xxhash_rust::xxh3::Xxh3;

/// Read buffer size (256KB)
const BUFFER_SIZE: usize = 256 * 1024;

/// Fingerprint used to tell true duplicates from name collisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId {
    pub size: u64,
    pub hash: u128,
}

impl ContentId {
    /// Hex form of the digest, for logs and reports
    pub fn hex(&self) -> String {
        format!("{:032x}", self.hash)
    }
}

/// Compute the content identity of a file
pub fn compute_content_id(path: &Path) -> io::Result<ContentId> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let hash = hash_reader(file)?;

    trace!(?path, size, hash = %format!("{:032x}", hash), "Computed content hash");
    Ok(ContentId { size, hash })
}

fn hash_reader<R: Read>(inner: R) -> io::Result<u128> {
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, inner);
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.digest128())
}
