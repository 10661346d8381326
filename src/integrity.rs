//! Checksum validation for downloaded files
//!
//! The hash algorithm is picked from the length of the expected digest:
//! 32 hex characters is MD5, 64 is SHA-256.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Digest algorithm implied by an expected checksum
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// 128-bit MD5
    Md5,
    /// 256-bit SHA-2
    Sha256,
}

impl HashAlgorithm {
    /// Pick the algorithm for a hex digest, or fail if it has an unknown shape
    pub fn for_digest(expected: &str) -> Result<Self> {
        if !expected.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::config(
                format!("checksum '{expected}' is not hexadecimal"),
                "checksum",
            ));
        }
        match expected.len() {
            32 => Ok(HashAlgorithm::Md5),
            64 => Ok(HashAlgorithm::Sha256),
            n => Err(Error::config(
                format!("checksum has {n} hex characters, expected 32 (MD5) or 64 (SHA-256)"),
                "checksum",
            )),
        }
    }
}

/// Hex digest of the file at `path`
pub fn file_digest(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut reader = BufReader::with_capacity(READ_BUFFER, File::open(path)?);
    let mut buffer = vec![0u8; READ_BUFFER];

    match algorithm {
        HashAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            loop {
                let n = reader.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                context.consume(&buffer[..n]);
            }
            Ok(format!("{:x}", context.compute()))
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = reader.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

/// Check a downloaded file against an optional expected checksum
///
/// Without a checksum the file only has to exist and be readable. Returns
/// `Ok(false)` on a digest mismatch and `Err` when the file cannot be read or
/// the checksum has an unknown shape.
pub fn validate_file_integrity(path: &Path, expected: Option<&str>) -> Result<bool> {
    let Some(expected) = expected.map(str::trim) else {
        File::open(path)?;
        return Ok(true);
    };
    let algorithm = HashAlgorithm::for_digest(expected)?;
    let actual = file_digest(path, algorithm)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

/// Like [`validate_file_integrity`] but reports a mismatch as
/// [`Error::IntegrityMismatch`]
pub fn verify_checksum(path: &Path, file_name: &str, expected: &str) -> Result<()> {
    let expected = expected.trim();
    let actual = file_digest(path, HashAlgorithm::for_digest(expected)?)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::IntegrityMismatch {
            file: file_name.to_string(),
            expected: expected.to_lowercase(),
            actual,
        });
    }
    Ok(())
}
