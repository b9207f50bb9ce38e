//! Screenshot capture through a self-deleting scratch file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use proto::ToolError;
use tracing::{debug, warn};

use super::driver::InputDriver;
use super::scaling::Resolution;

/// Uniquely named PNG path that is removed when dropped.
pub(crate) struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub(crate) fn new(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let name = format!("screenshot_{}.png", uuid::Uuid::new_v4().simple());
        Ok(Self {
            path: dir.join(name),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed screenshot scratch file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove scratch file: {e}"),
        }
    }
}

/// Captures the screen and returns the PNG as base64.
///
/// `resize_to` is the API resolution when scaling is active.
pub(crate) async fn capture_base64(
    driver: &dyn InputDriver,
    resize_to: Option<Resolution>,
    dir: &Path,
    settle: Duration,
) -> Result<String, ToolError> {
    let scratch = ScratchFile::new(dir)?;
    let image = driver.capture().await?;

    let path = scratch.path().to_path_buf();
    tokio::task::spawn_blocking(move || encode_png(image, resize_to, &path))
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("Screenshot encoding task failed: {e}")))??;

    tokio::time::sleep(settle).await;

    let bytes = tokio::fs::read(scratch.path()).await?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

fn encode_png(
    image: RgbaImage,
    resize_to: Option<Resolution>,
    path: &Path,
) -> Result<(), ToolError> {
    let image = match resize_to {
        Some(target) if image.dimensions() != (target.width, target.height) => {
            imageops::resize(&image, target.width, target.height, FilterType::Lanczos3)
        }
        _ => image,
    };
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to encode PNG: {e}")))
}
