//! Atomic file replacement
//!
//! Writers produce `<file>.tmp`, fsync it, then rename over the target so a
//! crash mid-write never leaves a torn file behind. Dropping a `SafeSave`
//! without committing removes the temporary.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RenderError, RenderResult};

/// Pending atomic replacement of `final_path`
#[derive(Debug)]
pub struct SafeSave {
    final_path: PathBuf,
    tmp_path: PathBuf,
    committed: bool,
}

impl SafeSave {
    pub fn new(final_path: impl Into<PathBuf>) -> Self {
        let final_path = final_path.into();
        let mut tmp_name = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = final_path.with_file_name(tmp_name);
        Self {
            final_path,
            tmp_path,
            committed: false,
        }
    }

    /// Where the caller must write the new content
    pub fn save_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Write `bytes` to the temporary file and fsync it
    pub fn write(&self, bytes: &[u8]) -> RenderResult<()> {
        use std::io::Write;

        let mut file = fs::File::create(&self.tmp_path)
            .map_err(|e| RenderError::io(&self.tmp_path, e))?;
        file.write_all(bytes)
            .map_err(|e| RenderError::io(&self.tmp_path, e))?;
        file.sync_all()
            .map_err(|e| RenderError::io(&self.tmp_path, e))?;
        Ok(())
    }

    /// Atomically rename the temporary over the target
    pub fn commit(mut self) -> RenderResult<()> {
        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| RenderError::io(&self.final_path, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for SafeSave {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache.bin");
        fs::write(&target, b"old").unwrap();

        let save = SafeSave::new(&target);
        save.write(b"new content").unwrap();
        // Target untouched until commit
        assert_eq!(fs::read(&target).unwrap(), b"old");
        save.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new content");
    }

    #[test]
    fn test_drop_without_commit_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache.bin");
        let tmp = {
            let save = SafeSave::new(&target);
            save.write(b"partial").unwrap();
            save.save_path().to_path_buf()
        };
        assert!(!tmp.exists());
        assert!(!target.exists());
    }
}
