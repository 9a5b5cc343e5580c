//! Run-scoped scratch directory for staging output files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BinderError, Result};

/// A temporary directory owned by one run.
///
/// Removed with everything in it when dropped, on success and failure alike.
#[derive(Debug)]
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Create the directory under `root`, or under the system temp directory.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mailbinder-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| BinderError::io(root, e))?;
                builder.tempdir_in(root).map_err(|e| BinderError::io(root, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| BinderError::io(std::env::temp_dir(), e))?,
        };
        debug!(path = %dir.path().display(), "Created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `bytes` to a file in the workspace.
    pub fn stage(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).map_err(|e| BinderError::io(&path, e))?;
        Ok(path)
    }

    /// Move a staged file to its final location, copying when a rename is
    /// not possible (for example across filesystems).
    pub fn publish(&self, staged: &Path, dest: &Path) -> Result<()> {
        if std::fs::rename(staged, dest).is_ok() {
            return Ok(());
        }
        std::fs::copy(staged, dest).map_err(|e| BinderError::Output {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;
        let _ = std::fs::remove_file(staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_publish_and_cleanup() {
        let root = tempfile::tempdir().expect("root");
        let out = tempfile::tempdir().expect("out");
        let ws = Workspace::create(Some(root.path())).expect("workspace");
        let ws_path = ws.path().to_path_buf();
        assert!(ws_path.starts_with(root.path()));

        let staged = ws.stage("a.pdf", b"%PDF").expect("stage");
        let dest = out.path().join("a.pdf");
        ws.publish(&staged, &dest).expect("publish");
        assert_eq!(std::fs::read(&dest).expect("read"), b"%PDF");
        assert!(!staged.exists());

        ws.stage("left-over.pdf", b"x").expect("stage");
        drop(ws);
        assert!(!ws_path.exists());
    }
}
