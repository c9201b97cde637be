//! External collaborator seams.
//!
//! The generative-content service and asset sources are external systems.
//! The pipeline consumes them only through these object-safe traits so that
//! components are testable without live services and lifecycle stays
//! caller-controlled. Implementations return [`BoxFuture`] so trait objects
//! work without an async-trait dependency.

use deck_core::{BoxFuture, Error, GenerateRequest, GeneratedContent, Result};

/// The content-generation collaborator: turns a prompt into text or image
/// bytes.
///
/// Repeated calls with the same inputs must be acceptable to substitute
/// with a cached prior result; the collaborator itself does not have to be
/// deterministic.
pub trait ContentGenerator: Send + Sync {
    /// Generate text content for a request.
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> BoxFuture<'a, Result<GeneratedContent>>;

    /// Generate image bytes for a prompt.
    fn generate_image<'a>(
        &'a self,
        prompt: &'a str,
        style: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Fetches declared asset bytes from a remote URL.
pub trait AssetFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Offline collaborators for local use (CLI) and tests.
///
/// These stand in for the hosted generation service with deterministic
/// output; they are collaborators like any other, not pipeline logic.
pub mod offline {
    use super::*;

    /// Deterministic text generator. Produces a compact summary-style
    /// rendition of the prompt instead of calling a hosted model.
    #[derive(Debug, Clone, Default)]
    pub struct OfflineGenerator;

    impl OfflineGenerator {
        pub fn new() -> Self {
            Self
        }
    }

    impl ContentGenerator for OfflineGenerator {
        fn generate<'a>(
            &'a self,
            request: &'a GenerateRequest,
        ) -> BoxFuture<'a, Result<GeneratedContent>> {
            Box::pin(async move {
                let words: Vec<&str> = request.prompt.split_whitespace().collect();
                let limit = request.max_length.unwrap_or(40).max(1);
                let content = words
                    .iter()
                    .take(limit)
                    .copied()
                    .collect::<Vec<_>>()
                    .join(" ");
                Ok(GeneratedContent {
                    tokens_used: words.len() as u64,
                    cost: 0.0,
                    content,
                })
            })
        }

        fn generate_image<'a>(
            &'a self,
            _prompt: &'a str,
            _style: Option<&'a str>,
        ) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move { Ok(SOLID_PNG.to_vec()) })
        }
    }

    /// Offline asset fetcher. Only `file://` URLs resolve; anything remote
    /// fails, which exercises the degraded-asset path locally.
    #[derive(Debug, Clone, Default)]
    pub struct OfflineFetcher;

    impl OfflineFetcher {
        pub fn new() -> Self {
            Self
        }
    }

    impl AssetFetcher for OfflineFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move {
                if let Some(path) = url.strip_prefix("file://") {
                    return tokio::fs::read(path)
                        .await
                        .map_err(|e| Error::AssetFetch(format!("{url}: {e}")));
                }
                Err(Error::AssetFetch(format!(
                    "offline fetcher cannot reach {url}"
                )))
            })
        }
    }

    /// A valid single-pixel PNG used for offline image generation.
    pub const SOLID_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78,
        0x9C, 0x62, 0x62, 0x60, 0x60, 0x60, 0x00, 0x00, 0x00, 0x04, 0x00, 0x01, 0x27, 0x34,
        0x27, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];
}

#[cfg(test)]
mod tests {
    use super::offline::*;
    use super::*;

    #[tokio::test]
    async fn test_offline_generator_is_deterministic() {
        let generator = OfflineGenerator::new();
        let request = GenerateRequest::from_prompt("summarize the quarterly results");
        let a = generator.generate(&request).await.unwrap();
        let b = generator.generate(&request).await.unwrap();
        assert_eq!(a, b);
        assert!(!a.content.is_empty());
    }

    #[tokio::test]
    async fn test_offline_generator_respects_max_length() {
        let generator = OfflineGenerator::new();
        let mut request = GenerateRequest::from_prompt("one two three four five");
        request.max_length = Some(2);
        let out = generator.generate(&request).await.unwrap();
        assert_eq!(out.content, "one two");
    }

    #[tokio::test]
    async fn test_offline_fetcher_rejects_remote_urls() {
        let fetcher = OfflineFetcher::new();
        let err = fetcher.fetch("https://example.com/a.png").await.unwrap_err();
        assert!(matches!(err, Error::AssetFetch(_)));
    }

    #[test]
    fn test_solid_png_has_png_magic() {
        assert!(SOLID_PNG.starts_with(&[0x89, 0x50, 0x4E, 0x47]));
    }
}
