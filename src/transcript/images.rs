//! Image store collaborator used when building image segments.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ImageConfig;
use crate::error::{ImageError, ImageResult};

/// Where a stored image lives. `file_id` is the assistant-side identifier,
/// reused when the image is fed back into a later turn or a report prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Stores image bytes and turns stored references into displayable markup.
pub trait ImageStore: Send + Sync {
    /// Persist `bytes` under `file_id`.
    fn store(&self, file_id: &str, bytes: &[u8]) -> ImageResult<ImageRef>;

    /// Produce the displayable form of a stored image.
    fn render(&self, image: &ImageRef) -> ImageResult<String>;

    /// Read the stored bytes back.
    fn load(&self, image: &ImageRef) -> ImageResult<Vec<u8>>;
}

/// Inline `<img>` markup with the image embedded as a base64 data URI.
pub fn inline_html(bytes: &[u8], width: u32) -> String {
    format!(
        "<p align=\"center\"><img src=\"data:image/png;base64,{}\" width=\"{}\"></p>",
        STANDARD.encode(bytes),
        width
    )
}

/// In-memory store, used by tests and short-lived sessions.
#[derive(Debug)]
pub struct MemoryImageStore {
    images: RwLock<HashMap<String, Vec<u8>>>,
    width: u32,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::with_width(600)
    }

    pub fn with_width(width: u32) -> Self {
        Self {
            images: RwLock::new(HashMap::new()),
            width,
        }
    }

    /// Number of stored images.
    pub fn len(&self) -> usize {
        self.images.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageStore for MemoryImageStore {
    fn store(&self, file_id: &str, bytes: &[u8]) -> ImageResult<ImageRef> {
        self.images
            .write()
            .map_err(|_| ImageError::Poisoned)?
            .insert(file_id.to_string(), bytes.to_vec());
        Ok(ImageRef {
            file_id: file_id.to_string(),
            location: None,
        })
    }

    fn render(&self, image: &ImageRef) -> ImageResult<String> {
        let bytes = self.load(image)?;
        Ok(inline_html(&bytes, self.width))
    }

    fn load(&self, image: &ImageRef) -> ImageResult<Vec<u8>> {
        self.images
            .read()
            .map_err(|_| ImageError::Poisoned)?
            .get(&image.file_id)
            .cloned()
            .ok_or_else(|| ImageError::NotFound {
                file_id: image.file_id.clone(),
            })
    }
}

/// Filesystem store writing `<dir>/<file_id>.png`.
#[derive(Debug, Clone)]
pub struct DirImageStore {
    dir: PathBuf,
    width: u32,
}

impl DirImageStore {
    /// Create the store, creating the directory if needed.
    pub fn new(config: &ImageConfig) -> ImageResult<Self> {
        std::fs::create_dir_all(&config.dir).map_err(|source| ImageError::Io {
            file_id: config.dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir: config.dir.clone(),
            width: config.width,
        })
    }

    /// `<id>.png` for plain ids, otherwise `<base64url(id)>.b64.png`. Plain
    /// names never contain a dot, so the two forms cannot collide.
    fn path_for(&self, file_id: &str) -> PathBuf {
        let plain = !file_id.is_empty()
            && file_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let name = if plain {
            format!("{}.png", file_id)
        } else {
            format!("{}.b64.png", URL_SAFE_NO_PAD.encode(file_id))
        };
        self.dir.join(name)
    }
}

impl ImageStore for DirImageStore {
    fn store(&self, file_id: &str, bytes: &[u8]) -> ImageResult<ImageRef> {
        let path = self.path_for(file_id);
        std::fs::write(&path, bytes).map_err(|source| ImageError::Io {
            file_id: file_id.to_string(),
            source,
        })?;
        debug!(file_id = %file_id, path = %path.display(), "Image stored");
        Ok(ImageRef {
            file_id: file_id.to_string(),
            location: Some(path.display().to_string()),
        })
    }

    fn render(&self, image: &ImageRef) -> ImageResult<String> {
        let bytes = self.load(image)?;
        Ok(inline_html(&bytes, self.width))
    }

    fn load(&self, image: &ImageRef) -> ImageResult<Vec<u8>> {
        let path = image
            .location
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.path_for(&image.file_id));
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ImageError::NotFound {
                file_id: image.file_id.clone(),
            },
            _ => ImageError::Io {
                file_id: image.file_id.clone(),
                source,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_html_embeds_base64() {
        let html = inline_html(b"png", 320);
        assert!(html.contains("data:image/png;base64,cG5n"));
        assert!(html.contains("width=\"320\""));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryImageStore::new();
        let image = store.store("file-1", b"abc").unwrap();
        assert_eq!(image.file_id, "file-1");
        assert_eq!(store.load(&image).unwrap(), b"abc");
        assert_eq!(store.len(), 1);
        assert!(store.render(&image).unwrap().starts_with("<p align=\"center\">"));
    }

    #[test]
    fn test_memory_store_missing_image() {
        let store = MemoryImageStore::new();
        let missing = ImageRef {
            file_id: "nope".to_string(),
            location: None,
        };
        assert!(matches!(
            store.render(&missing),
            Err(ImageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_dir_store_writes_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirImageStore::new(&ImageConfig {
            dir: dir.path().join("images"),
            width: 600,
        })
        .unwrap();

        let image = store.store("file-abc", b"bytes").unwrap();
        let location = image.location.clone().unwrap();
        assert!(location.ends_with("file-abc.png"));
        assert_eq!(std::fs::read(&location).unwrap(), b"bytes");
        assert_eq!(store.load(&image).unwrap(), b"bytes");

        let escaped = store.store("file/../x", b"other").unwrap();
        assert!(escaped.location.unwrap().ends_with("ZmlsZS8uLi94.b64.png"));
    }

    #[test]
    fn test_dir_store_distinct_ids_never_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirImageStore::new(&ImageConfig {
            dir: dir.path().to_path_buf(),
            width: 600,
        })
        .unwrap();

        let slashed = store.store("a/b", b"first").unwrap();
        let underscored = store.store("a_b", b"second").unwrap();
        assert_ne!(slashed.location, underscored.location);

        let by_id = |file_id: &str| ImageRef {
            file_id: file_id.to_string(),
            location: None,
        };
        assert_eq!(store.load(&by_id("a/b")).unwrap(), b"first");
        assert_eq!(store.load(&by_id("a_b")).unwrap(), b"second");
    }

    #[test]
    fn test_dir_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirImageStore::new(&ImageConfig {
            dir: dir.path().to_path_buf(),
            width: 600,
        })
        .unwrap();
        let missing = ImageRef {
            file_id: "gone".to_string(),
            location: None,
        };
        assert!(matches!(store.load(&missing), Err(ImageError::NotFound { .. })));
    }
}
