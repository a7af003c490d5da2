//! Image resizing backends.
//!
//! The production backend shells out to `vipsthumbnail`; tests use
//! [`NoopResizer`], which copies bytes unchanged.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::format::ThumbnailSize;
use super::id::ThumbnailId;
use crate::identity::file_ext;

/// Errors from a resize backend.
#[derive(Debug, Error)]
pub enum ResizeError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A backend that produces a downscaled copy of an image.
///
/// Implementations must tolerate being handed the same input concurrently
/// for different outputs and must not touch the output path on failure.
pub trait Resizer: Send + Sync {
    /// Resize `input` into `output` at the target size for `id`.
    fn resize<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        id: &'a ThumbnailId,
        size: ThumbnailSize,
    ) -> Pin<Box<dyn Future<Output = Result<(), ResizeError>> + Send + 'a>>;
}

/// Resizer backed by the `vipsthumbnail` command line tool.
#[derive(Debug, Default, Clone)]
pub struct VipsResizer;

const VIPSTHUMBNAIL: &str = "vipsthumbnail";

impl VipsResizer {
    pub fn new() -> Self {
        Self
    }

    /// Verify that `vipsthumbnail` is installed and runnable.
    pub async fn check_deps() -> Result<(), ResizeError> {
        let output = Command::new(VIPSTHUMBNAIL)
            .arg("--vips-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ResizeError::Spawn {
                command: VIPSTHUMBNAIL,
                source,
            })?;
        if !output.status.success() {
            return Err(ResizeError::CommandFailed {
                command: VIPSTHUMBNAIL,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Output save parameters for the target container, keyed off the output
    /// path extension.
    fn output_arg(output: &Path) -> String {
        let path = output.display();
        let ext = output
            .file_name()
            .map(|n| file_ext(&n.to_string_lossy()))
            .unwrap_or_default();
        match ext.as_str() {
            ".jpg" | ".jpeg" => format!("{path}[Q=80,optimize_coding,keep=icc]"),
            ".webp" => format!("{path}[keep=icc]"),
            ".avif" => format!("{path}[Q=65,speed=8,keep=icc]"),
            _ => format!("{path}[keep=icc]"),
        }
    }
}

impl Resizer for VipsResizer {
    fn resize<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        id: &'a ThumbnailId,
        size: ThumbnailSize,
    ) -> Pin<Box<dyn Future<Output = Result<(), ResizeError>> + Send + 'a>> {
        Box::pin(async move {
            let out = Self::output_arg(output);
            debug!(thumbnail = %id, size_arg = size.vips_size_arg(), "running vipsthumbnail");

            let result = Command::new(VIPSTHUMBNAIL)
                .arg("--rotate")
                .arg(input)
                .arg("--size")
                .arg(size.vips_size_arg())
                .arg("-o")
                .arg(&out)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|source| ResizeError::Spawn {
                    command: VIPSTHUMBNAIL,
                    source,
                })?;

            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            if !result.status.success() {
                return Err(ResizeError::CommandFailed {
                    command: VIPSTHUMBNAIL,
                    status: result.status,
                    stderr,
                });
            }
            if !stderr.is_empty() {
                info!(thumbnail = %id, %stderr, "vipsthumbnail wrote to stderr");
            }
            Ok(())
        })
    }
}

/// Test backend that copies the input bytes verbatim.
#[derive(Debug, Default, Clone)]
pub struct NoopResizer;

impl NoopResizer {
    pub fn new() -> Self {
        Self
    }
}

impl Resizer for NoopResizer {
    fn resize<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        _id: &'a ThumbnailId,
        _size: ThumbnailSize,
    ) -> Pin<Box<dyn Future<Output = Result<(), ResizeError>> + Send + 'a>> {
        let input = PathBuf::from(input);
        let output = PathBuf::from(output);
        Box::pin(async move {
            tokio::fs::copy(&input, &output).await?;
            Ok(())
        })
    }
}
