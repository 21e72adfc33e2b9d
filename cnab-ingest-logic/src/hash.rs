//! Content fingerprints (C1).
//!
//! Three pure operations over bytes. `fileHash` is base64-encoded to match
//! the idempotency-key construction in [`crate::line_processor`]; line and
//! stream hashes are lower-hex, matching the line-hash uniqueness fence in
//! the upload tracker.

use base64::{prelude::BASE64_STANDARD, Engine};
use sha2::{Digest, Sha256};
use std::io::{Read, Seek, SeekFrom};

pub fn file_hash(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(Sha256::digest(bytes))
}

pub fn line_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hashes an entire reader's contents. Resets the position to the start
/// afterwards if the reader is seekable, so callers can read it again.
pub fn stream_hash<R: Read + Seek>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    reader.seek(SeekFrom::Start(0))?;
    Ok(hex::encode(hasher.finalize()))
}
