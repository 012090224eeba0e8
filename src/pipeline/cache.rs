//! The rasterizer adapter: page number → cached PNG path.
//!
//! Images live at `<root>/<document-name>/images/page_<n>.png`. A page that
//! is already on disk is never rendered again, across calls and across runs.
//!
//! Writes go to a temp file in the same directory followed by a rename, so
//! a reader never sees a half-written PNG and two writers racing on the same
//! page simply leave whichever finished last. Both produce identical bytes,
//! since rendering is deterministic for the same PDF and DPI.

use crate::error::RasterizationError;
use crate::pipeline::render::PageRenderer;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Deterministic cache layout for one document.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(root: impl AsRef<Path>, document_name: &str) -> Self {
        Self {
            dir: root.as_ref().join(document_name).join("images"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where page `page` (1-based) is cached.
    pub fn page_path(&self, page: usize) -> PathBuf {
        self.dir.join(format!("page_{page}.png"))
    }
}

/// Renders pages on demand and caches them.
pub struct Rasterizer {
    renderer: Arc<dyn PageRenderer>,
    cache: ImageCache,
    dpi: u32,
}

impl Rasterizer {
    pub fn new(renderer: Arc<dyn PageRenderer>, cache: ImageCache, dpi: u32) -> Self {
        Self {
            renderer,
            cache,
            dpi,
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    /// Return the image path for `page`, rendering it first if not cached.
    pub async fn render(&self, pdf: &Path, page: usize) -> Result<PathBuf, RasterizationError> {
        let target = self.cache.page_path(page);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!("Page {}: using cached image {}", page, target.display());
            return Ok(target);
        }

        let image = self.renderer.render_page(pdf, page, self.dpi).await?;

        let dir = self.cache.dir().to_path_buf();
        let dest = target.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &dest, &image))
            .await
            .map_err(|e| RasterizationError::Cache {
                path: target.clone(),
                detail: format!("write task panicked: {e}"),
            })??;

        debug!("Page {}: cached image at {}", page, target.display());
        Ok(target)
    }
}

fn write_atomically(
    dir: &Path,
    dest: &Path,
    image: &image::DynamicImage,
) -> Result<(), RasterizationError> {
    let cache_err = |detail: String| RasterizationError::Cache {
        path: dest.to_path_buf(),
        detail,
    };

    std::fs::create_dir_all(dir).map_err(|e| cache_err(e.to_string()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".page_")
        .suffix(".png.tmp")
        .tempfile_in(dir)
        .map_err(|e| cache_err(e.to_string()))?;

    image
        .write_to(tmp.as_file_mut(), ImageFormat::Png)
        .map_err(|e| cache_err(e.to_string()))?;
    tmp.persist(dest).map_err(|e| cache_err(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MagnifierError;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageRenderer for CountingRenderer {
        async fn page_count(&self, _pdf: &Path) -> Result<usize, MagnifierError> {
            Ok(3)
        }

        async fn render_page(
            &self,
            _pdf: &Path,
            page: usize,
            _dpi: u32,
        ) -> Result<DynamicImage, RasterizationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if page == 3 {
                return Err(RasterizationError::Render {
                    page,
                    detail: "broken page".into(),
                });
            }
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                2,
                2,
                Rgba([page as u8, 0, 0, 255]),
            )))
        }
    }

    #[test]
    fn page_path_layout() {
        let cache = ImageCache::new("data", "My Book");
        assert_eq!(
            cache.page_path(7),
            PathBuf::from("data").join("My Book").join("images").join("page_7.png")
        );
    }

    #[tokio::test]
    async fn second_render_hits_cache() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
        });
        let raster = Rasterizer::new(renderer.clone(), ImageCache::new(root.path(), "doc"), 200);

        let first = raster.render(Path::new("doc.pdf"), 1).await.unwrap();
        let second = raster.render(Path::new("doc.pdf"), 1).await.unwrap();

        assert_eq!(first, second);
        assert!(first.exists());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_file_skips_renderer_entirely() {
        let root = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(root.path(), "doc");
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.page_path(2), b"already here").unwrap();

        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
        });
        let raster = Rasterizer::new(renderer.clone(), cache.clone(), 200);
        let path = raster.render(Path::new("doc.pdf"), 2).await.unwrap();

        assert_eq!(path, cache.page_path(2));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn render_failure_leaves_no_file() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
        });
        let raster = Rasterizer::new(renderer, ImageCache::new(root.path(), "doc"), 200);

        let err = raster.render(Path::new("doc.pdf"), 3).await.unwrap_err();
        assert!(matches!(err, RasterizationError::Render { page: 3, .. }));
        assert!(!raster.cache().page_path(3).exists());
    }

    #[tokio::test]
    async fn written_image_is_a_png() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
        });
        let raster = Rasterizer::new(renderer, ImageCache::new(root.path(), "doc"), 200);
        let path = raster.render(Path::new("doc.pdf"), 1).await.unwrap();

        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
        let leftovers: Vec<_> = std::fs::read_dir(raster.cache().dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
