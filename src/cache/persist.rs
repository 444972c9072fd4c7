//! Persistent-cache file framing
//!
//! Every cache file starts with a fixed header (magic + version) and ends
//! with a crc32 of the payload. Loading refuses version mismatches and any
//! payload whose checksum disagrees.

use std::fs;
use std::path::Path;

use crate::error::{RenderError, RenderResult};
use crate::utils::SafeSave;

const HEADER_LEN: usize = 8;
const CRC_LEN: usize = 4;

/// Frame and write a cache payload
pub fn write_cache_file(
    path: &Path,
    magic: u32,
    version: u32,
    payload: &[u8],
    safe_save: bool,
) -> RenderResult<()> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    bytes.extend_from_slice(&magic.to_le_bytes());
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(payload);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    bytes.extend_from_slice(&hasher.finalize().to_le_bytes());

    if safe_save {
        let save = SafeSave::new(path);
        save.write(&bytes)?;
        save.commit()
    } else {
        fs::write(path, &bytes).map_err(|e| RenderError::io(path, e))
    }
}

/// Read and validate a cache payload
pub fn read_cache_file(path: &Path, magic: u32, expected_version: u32) -> RenderResult<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| RenderError::io(path, e))?;
    if bytes.len() < HEADER_LEN + CRC_LEN {
        return Err(RenderError::corrupt(format!(
            "{}: file too short",
            path.display()
        )));
    }

    let file_magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if file_magic != magic {
        return Err(RenderError::corrupt(format!(
            "{}: bad magic {:#010x}",
            path.display(),
            file_magic
        )));
    }

    let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    if version != expected_version {
        return Err(RenderError::PersistentCacheVersionMismatch {
            expected: expected_version,
            found: version,
        });
    }

    let payload = &bytes[HEADER_LEN..bytes.len() - CRC_LEN];
    let stored_crc = u32::from_le_bytes(bytes[bytes.len() - CRC_LEN..].try_into().unwrap());
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(RenderError::corrupt(format!(
            "{}: checksum mismatch",
            path.display()
        )));
    }

    Ok(payload.to_vec())
}
