//! Input resolution: normalise a user-supplied path or URL to a decoded image.
//!
//! ## Downloads
//!
//! URLs are fetched into a `TempDir` under a filename with a real extension,
//! then decoded like any local file. The directory lives as long as the
//! `ResolvedInput` and is removed on drop.

use crate::error::OcrError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Raster formats the decoder is built with.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input named an image on disk.
    Local(PathBuf),
    /// Input was a URL, fetched into `_temp_dir`, which is removed on drop.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the image file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// `true` for `http://` and `https://` inputs.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local image file path.
///
/// URLs are fetched into a temporary directory first.
/// If the input is a local file, validate it exists, is readable, and has a
/// supported extension.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, OcrError> {
    if input.trim().is_empty() {
        return Err(OcrError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve and decode in one step.
pub async fn load_image(input: &str, timeout_secs: u64) -> Result<DynamicImage, OcrError> {
    let resolved = resolve_input(input, timeout_secs).await?;
    let path = resolved.path().to_path_buf();

    // Decoding large TIFFs is CPU-bound.
    let img = tokio::task::spawn_blocking(move || decode(&path))
        .await
        .map_err(|e| OcrError::Internal(format!("decode task panicked: {e}")))??;

    drop(resolved);
    Ok(img)
}

/// Reject paths whose extension is not a supported raster format.
pub fn validate_image_extension(path: &Path) -> Result<(), OcrError> {
    let ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()));
    if ok {
        Ok(())
    } else {
        Err(OcrError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }
}

fn decode(path: &Path) -> Result<DynamicImage, OcrError> {
    let img = image::open(path).map_err(|e| OcrError::ImageDecode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    debug!(
        "Decoded {} ({}x{})",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(img)
}

/// Resolve a local file path, validating existence and readability.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, OcrError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(OcrError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OcrError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(OcrError::FileNotFound { path });
        }
    }

    validate_image_extension(&path)?;

    debug!("Resolved local image: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Fetch `url` into a fresh temp directory, naming the file after its URL or content type.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, OcrError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = extract_filename(url, content_type.as_deref());

    let temp_dir = TempDir::new().map_err(|e| OcrError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {}", e)))?;

    validate_image_extension(&file_path)?;

    info!(
        "Downloaded {} bytes to: {}",
        bytes.len(),
        file_path.display()
    );

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Pick a filename for a download: the URL's last path segment when it has
/// an extension, otherwise one derived from the response content type.
fn extract_filename(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    let ext = match content_type.map(|c| c.split(';').next().unwrap_or(c).trim()) {
        Some("image/jpeg") => "jpg",
        Some("image/bmp") => "bmp",
        Some("image/tiff") => "tiff",
        _ => "png",
    };
    format!("downloaded.{ext}")
}
