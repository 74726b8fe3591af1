//! Image resolution contract for board backgrounds and token art.
//!
//! The engine never decodes pixels; it only needs each image's source and
//! pixel dimensions to size the grid and place tokens. Hosts provide an
//! [`ImageLoader`] backed by whatever fetch path they have, and the merge
//! pipeline suspends on it whenever a diff introduces an unresolved source.

#[cfg(test)]
#[path = "image_test.rs"]
mod image_test;

use std::collections::HashMap;
use std::future::Future;

/// A successfully resolved image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub source: String,
    /// Pixel width of the decoded image.
    pub width: u32,
    /// Pixel height of the decoded image.
    pub height: u32,
}

impl LoadedImage {
    #[must_use]
    pub fn new(source: impl Into<String>, width: u32, height: u32) -> Self {
        Self { source: source.into(), width, height }
    }
}

/// Error resolving a required image source.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to load image {path}: {reason}")]
    LoadFailed { path: String, reason: String },
}

/// Host-provided image fetch seam.
pub trait ImageLoader {
    /// Resolve a single source to a loaded image.
    ///
    /// The returned future is not required to be `Send`: the merge pipeline
    /// is single-threaded and awaits loads in place.
    fn load_image(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<LoadedImage, ImageError>>;
}

/// Resolve every distinct source once.
///
/// # Errors
///
/// Fails with the first [`ImageError`]; a board is never exposed with only
/// some of its required images resolved.
pub async fn load_images<L: ImageLoader>(
    loader: &L,
    sources: &[String],
) -> Result<HashMap<String, LoadedImage>, ImageError> {
    let mut images = HashMap::new();
    for source in sources {
        if images.contains_key(source) {
            continue;
        }
        let image = loader.load_image(source).await?;
        images.insert(source.clone(), image);
    }
    Ok(images)
}
