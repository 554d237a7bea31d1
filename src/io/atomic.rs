// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Temp-file-then-rename output

use crate::error::{Error, Result};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Write `path` through a temporary file in the same directory.
///
/// The target only appears once `write` succeeded and produced at least one
/// byte; on any failure the temporary file is removed and an existing target
/// is left untouched.
pub fn write_atomic<F>(path: impl AsRef<Path>, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let path = path.as_ref();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }

    let len = tmp.as_file().metadata()?.len();
    if len == 0 {
        return Err(Error::format(format!(
            "refusing to write empty output to {}",
            path.display()
        )));
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    debug!(path = %path.display(), bytes = len, "wrote file");
    Ok(())
}

/// Atomic write of an in-memory buffer
pub fn write_bytes_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    write_atomic(path, |w| Ok(w.write_all(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_successful_write() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.txt");
        write_bytes_atomic(&target, b"hello").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"hello");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.txt");
        let result = write_atomic(&target, |w| {
            w.write_all(b"partial")?;
            Err(Error::tessellation("boom"))
        });
        assert!(result.is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_output_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("empty.txt");
        assert!(write_bytes_atomic(&target, b"").is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_existing_target_survives_failure() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("keep.txt");
        std::fs::write(&target, "old").unwrap();
        let _ = write_atomic(&target, |_| Err(Error::format("nope")));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
    }
}
