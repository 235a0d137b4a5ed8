//! Page rasterizer collaborator.
//!
//! Rendering document formats (PDF and friends) lives outside this crate;
//! hosts plug a renderer in through [`PageRasterizer`].

use image::{ImageFormat, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Render failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RgbaImage,
    pub page_count: u32,
}

pub trait PageRasterizer: Send + Sync {
    /// Rasterize 1-based `page` of the decrypted `document`.
    fn render_page(&self, document: &[u8], page: u32) -> Result<RenderedPage, RenderError>;
}

/// Reject page numbers outside `1..=page_count`.
pub fn check_page(page: u32, page_count: u32) -> Result<(), RenderError> {
    if page == 0 || page > page_count {
        return Err(RenderError::PageOutOfRange { page, page_count });
    }
    Ok(())
}

/// Treats the document as one PNG image: a single-page document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngRasterizer;

impl PageRasterizer for PngRasterizer {
    fn render_page(&self, document: &[u8], page: u32) -> Result<RenderedPage, RenderError> {
        check_page(page, 1)?;
        let image = image::load_from_memory_with_format(document, ImageFormat::Png)
            .map_err(|e| RenderError::Failed(e.to_string()))?
            .to_rgba8();
        Ok(RenderedPage {
            image,
            page_count: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, Rgba};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255])))
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn page_bounds_are_one_based() {
        assert!(check_page(1, 3).is_ok());
        assert!(check_page(3, 3).is_ok());
        assert!(matches!(
            check_page(0, 3),
            Err(RenderError::PageOutOfRange { page: 0, page_count: 3 })
        ));
        assert!(check_page(4, 3).is_err());
    }

    #[test]
    fn png_rasterizer_renders_single_page() {
        let page = PngRasterizer.render_page(&png(20, 10), 1).unwrap();
        assert_eq!(page.page_count, 1);
        assert_eq!(page.image.dimensions(), (20, 10));
        assert!(PngRasterizer.render_page(&png(20, 10), 2).is_err());
        assert!(matches!(
            PngRasterizer.render_page(b"%PDF-1.7", 1),
            Err(RenderError::Failed(_))
        ));
    }
}
