//! Filesystem utilities for finalizing rendered files.
//!
//! Renders go to a `.partial` sibling first and are moved into place only
//! once complete, so a failed run never leaves a truncated final video.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// `EXDEV` on Linux and macOS.
const CROSS_DEVICE: i32 = 18;

/// Rename `src` onto `dst`, creating `dst`'s directory as needed.
///
/// Across filesystems the file is copied next to `dst`, renamed over it and
/// the source removed afterwards.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE) => {
            debug!(src = %src.display(), dst = %dst.display(), "Moving across filesystems");
            let staged = dst.with_extension("moving");
            fs::copy(src, &staged).await?;
            if let Err(e) = fs::rename(&staged, dst).await {
                let _ = fs::remove_file(&staged).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                warn!(src = %src.display(), error = %e, "Source left behind after move");
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// A render target that only becomes visible at `target` after [`finalize`].
///
/// Dropping an unfinalized `PartialOutput` removes the partial file.
///
/// [`finalize`]: PartialOutput::finalize
#[derive(Debug)]
pub struct PartialOutput {
    partial: PathBuf,
    target: PathBuf,
    finalized: bool,
}

impl PartialOutput {
    /// `final/name.mp4` renders to `final/name.partial.mp4`.
    pub fn for_target(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let ext = target
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());
        let partial = target.with_file_name(format!("{stem}.partial.{ext}"));

        Self {
            partial,
            target,
            finalized: false,
        }
    }

    /// Path the renderer should write to.
    pub fn path(&self) -> &Path {
        &self.partial
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Move the completed partial file into place.
    ///
    /// Fails if the partial file is missing or empty.
    pub async fn finalize(mut self) -> MediaResult<PathBuf> {
        let len = match fs::metadata(&self.partial).await {
            Ok(meta) => meta.len(),
            Err(_) => return Err(MediaError::FileNotFound(self.partial.clone())),
        };
        if len == 0 {
            return Err(MediaError::InvalidMedia(format!(
                "Rendered file is empty: {}",
                self.partial.display()
            )));
        }

        move_file(&self.partial, &self.target).await?;
        self.finalized = true;
        Ok(self.target.clone())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.finalized && self.partial.exists() {
            if let Err(e) = std::fs::remove_file(&self.partial) {
                warn!(path = %self.partial.display(), error = %e, "Failed to remove partial output");
            }
        }
    }
}
