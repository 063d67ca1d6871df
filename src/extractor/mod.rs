//! Content Extractor: produces a textual excerpt + MIME category for an
//! arbitrary file.
//!
//! The binary-format collaborators (PDF text, audio tags, image EXIF,
//! archive listings) are explicitly out of scope for the core crate;
//! this module makes that boundary concrete as small traits with a
//! pass-through/no-op default implementation, and does its own
//! best-effort image dimension probing via the `image` crate.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ExtractError;
use crate::provider::ChatProvider;

/// MIME-sniffed top-level category (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeCategory {
    Documents,
    Pictures,
    Music,
    Videos,
    Archives,
    Others,
}

impl MimeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documents => "Documents",
            Self::Pictures => "Pictures",
            Self::Music => "Music",
            Self::Videos => "Videos",
            Self::Archives => "Archives",
            Self::Others => "Others",
        }
    }

    /// Sniff from the file's MIME type guess, the way
    /// `mime_guess::from_path` is used throughout the teacher's
    /// thumbnail/VFS scanning code.
    fn from_mime(mime: &mime_guess::Mime) -> Self {
        match mime.type_() {
            mime_guess::mime::IMAGE => Self::Pictures,
            mime_guess::mime::AUDIO => Self::Music,
            mime_guess::mime::VIDEO => Self::Videos,
            mime_guess::mime::TEXT | mime_guess::mime::APPLICATION => Self::Documents,
            _ => Self::Others,
        }
    }
}

/// `{mimeCategory, textExcerpt, originalName, extension}` (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub mime_category: MimeCategory,
    pub text_excerpt: String,
    pub original_name: String,
    pub extension: String,
}

/// "Text from document" collaborator (PDF, DOCX, ...). Documents category
/// delegates to this for anything other than `.txt`/`.md`, which are
/// read as plain-text passthrough.
#[async_trait]
pub trait DocumentTextCollaborator: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, String>;
}

/// EXIF/structured image metadata collaborator.
#[async_trait]
pub trait ImageMetadataCollaborator: Send + Sync {
    async fn extract_metadata(&self, path: &Path) -> Result<String, String>;
}

/// Audio tag collaborator (artist, title, album, year, ...).
#[async_trait]
pub trait AudioTagCollaborator: Send + Sync {
    async fn extract_tags(&self, path: &Path) -> Result<String, String>;
}

/// Archive listing collaborator (contained entry name + size).
#[async_trait]
pub trait ArchiveListingCollaborator: Send + Sync {
    async fn list_entries(&self, path: &Path) -> Result<String, String>;
}

/// No-op default: returns an empty excerpt, never fails. Used whenever a
/// caller hasn't plugged in a real system-tool collaborator; keeps the
/// core usable out of the box at reduced fidelity rather than unbuildable.
struct NoopCollaborator;

#[async_trait]
impl DocumentTextCollaborator for NoopCollaborator {
    async fn extract_text(&self, _path: &Path) -> Result<String, String> {
        Ok(String::new())
    }
}

#[async_trait]
impl AudioTagCollaborator for NoopCollaborator {
    async fn extract_tags(&self, _path: &Path) -> Result<String, String> {
        Ok(String::new())
    }
}

#[async_trait]
impl ArchiveListingCollaborator for NoopCollaborator {
    async fn list_entries(&self, _path: &Path) -> Result<String, String> {
        Ok(String::new())
    }
}

/// Best-effort image metadata probe using the `image` crate: format and
/// pixel dimensions. No EXIF/GPS parsing — that belongs to a richer
/// collaborator a caller can plug in.
struct DefaultImageCollaborator;

#[async_trait]
impl ImageMetadataCollaborator for DefaultImageCollaborator {
    async fn extract_metadata(&self, path: &Path) -> Result<String, String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || match image::image_dimensions(&path) {
            Ok((w, h)) => format!("dimensions: {}x{}", w, h),
            Err(_) => String::new(),
        })
        .await
        .map_err(|e| e.to_string())
    }
}

/// Given a local path, produces `{mimeCategory, textExcerpt, originalName,
/// extension}` per the per-category policy of spec.md §4.1.
pub struct ContentExtractor {
    document: Box<dyn DocumentTextCollaborator>,
    image: Box<dyn ImageMetadataCollaborator>,
    audio: Box<dyn AudioTagCollaborator>,
    archive: Box<dyn ArchiveListingCollaborator>,
    max_words: usize,
}

impl ContentExtractor {
    pub fn new(max_words: usize) -> Self {
        Self {
            document: Box::new(NoopCollaborator),
            image: Box::new(DefaultImageCollaborator),
            audio: Box::new(NoopCollaborator),
            archive: Box::new(NoopCollaborator),
            max_words,
        }
    }

    pub fn with_collaborators(
        max_words: usize,
        document: Box<dyn DocumentTextCollaborator>,
        image: Box<dyn ImageMetadataCollaborator>,
        audio: Box<dyn AudioTagCollaborator>,
        archive: Box<dyn ArchiveListingCollaborator>,
    ) -> Self {
        Self {
            document,
            image,
            audio,
            archive,
            max_words,
        }
    }

    /// `textExcerpt` is truncated to at most `MAX_CONTENT_WORDS`
    /// whitespace-separated words (spec.md §4.1).
    fn truncate_words(&self, text: &str) -> String {
        text.split_whitespace()
            .take(self.max_words)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `vision_provider` is consulted for Pictures/Videos when present, to
    /// produce an optional caption concatenated onto the excerpt
    /// (spec.md §4.1). Passing `None` skips the vision call entirely —
    /// the extractor degrades gracefully rather than requiring a
    /// provider.
    pub async fn extract(
        &self,
        path: &Path,
        vision_provider: Option<&dyn ChatProvider>,
        vision_prompt: &str,
    ) -> Result<ExtractedContent, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::Unreadable {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            });
        }

        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();

        let guess = mime_guess::from_path(path).first();
        let mime_category = guess
            .as_ref()
            .map(MimeCategory::from_mime)
            .unwrap_or(MimeCategory::Others);

        let excerpt = match mime_category {
            MimeCategory::Documents => self.extract_document(path, &extension).await?,
            MimeCategory::Pictures => {
                self.extract_picture(path, vision_provider, vision_prompt).await?
            }
            MimeCategory::Music => self.extract_music(path).await?,
            MimeCategory::Videos => self.extract_video(path, vision_provider, vision_prompt).await?,
            MimeCategory::Archives => self.extract_archive(path).await?,
            MimeCategory::Others => String::new(),
        };

        Ok(ExtractedContent {
            mime_category,
            text_excerpt: self.truncate_words(&excerpt),
            original_name,
            extension,
        })
    }

    async fn extract_document(&self, path: &Path, extension: &str) -> Result<String, ExtractError> {
        if extension.eq_ignore_ascii_case("txt") || extension.eq_ignore_ascii_case("md") {
            return tokio::fs::read_to_string(path).await.map_err(|source| ExtractError::Unreadable {
                path: path.to_path_buf(),
                source,
            });
        }
        match self.document.extract_text(path).await {
            Ok(text) => Ok(text),
            Err(_) => Ok(String::new()),
        }
    }

    async fn extract_picture(
        &self,
        path: &Path,
        vision_provider: Option<&dyn ChatProvider>,
        vision_prompt: &str,
    ) -> Result<String, ExtractError> {
        let metadata = self.image.extract_metadata(path).await.unwrap_or_default();
        let caption = if let Some(provider) = vision_provider {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let mime = mime_guess::from_path(path)
                        .first_raw()
                        .unwrap_or("image/png")
                        .to_string();
                    provider.vision(&bytes, &mime, vision_prompt).await.ok()
                }
                Err(_) => None,
            }
        } else {
            None
        };

        Ok([Some(metadata), caption]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn extract_music(&self, path: &Path) -> Result<String, ExtractError> {
        Ok(self.audio.extract_tags(path).await.unwrap_or_default())
    }

    async fn extract_video(
        &self,
        path: &Path,
        vision_provider: Option<&dyn ChatProvider>,
        vision_prompt: &str,
    ) -> Result<String, ExtractError> {
        // No first-frame extraction collaborator is plugged in by
        // default; a caller that wants this wires a collaborator through
        // a richer `ContentExtractor::with_collaborators` in a future
        // revision. For now, videos degrade to filename-only metadata.
        let _ = (vision_provider, vision_prompt);
        Ok(format!(
            "video file: {}",
            path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        ))
    }

    async fn extract_archive(&self, path: &Path) -> Result<String, ExtractError> {
        Ok(self.archive.list_entries(path).await.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn plain_text_is_passed_through() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello world this is a test file").unwrap();

        let extractor = ContentExtractor::new(2000);
        let content = extractor.extract(&path, None, "").await.unwrap();
        assert_eq!(content.mime_category.as_str(), "Documents");
        assert_eq!(content.text_excerpt, "hello world this is a test file");
    }

    #[tokio::test]
    async fn excerpt_truncated_to_max_words() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "one two three four five").unwrap();

        let extractor = ContentExtractor::new(3);
        let content = extractor.extract(&path, None, "").await.unwrap();
        assert_eq!(content.text_excerpt, "one two three");
    }

    #[tokio::test]
    async fn unreadable_path_fails() {
        let extractor = ContentExtractor::new(2000);
        let err = extractor
            .extract(Path::new("/nonexistent/path/file.txt"), None, "")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn unknown_extension_degrades_to_others() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.xyz123unknown");
        std::fs::write(&path, "binary-ish content").unwrap();

        let extractor = ContentExtractor::new(2000);
        let content = extractor.extract(&path, None, "").await.unwrap();
        assert_eq!(content.mime_category.as_str(), "Others");
        assert_eq!(content.text_excerpt, "");
    }
}
