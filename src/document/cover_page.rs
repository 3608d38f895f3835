use super::pdf::{FragmentWriter, PageSize, PdfFragment, A4, POINTS_PER_INCH};
use super::{AssemblyError, RenderError};
use crate::cover_cache::CoverCache;
use crate::imaging;
use lopdf::content::Operation;
use lopdf::{dictionary, Stream};
use tracing::debug;

/// Area of the page the cover image is fitted into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Renders the one-page cover of a collection document
#[derive(Debug, Clone)]
pub struct CoverPageBuilder {
    page: PageSize,
    image_box: MarginBox,
}

impl Default for CoverPageBuilder {
    fn default() -> Self {
        CoverPageBuilder {
            page: A4,
            image_box: MarginBox {
                x: 0.5 * POINTS_PER_INCH,
                y: 0.5 * POINTS_PER_INCH,
                width: 7.0 * POINTS_PER_INCH,
                height: 10.0 * POINTS_PER_INCH,
            },
        }
    }
}

impl CoverPageBuilder {
    /// Fetch the cover through the run's cache and render it
    pub async fn build(&self, cache: &CoverCache, url: &str) -> Result<PdfFragment, AssemblyError> {
        let bytes = cache.fetch(url).await?;
        Ok(self.render(&bytes)?)
    }

    /// Render a cover page from raw image bytes
    pub fn render(&self, image_bytes: &[u8]) -> Result<PdfFragment, RenderError> {
        let jpeg = imaging::encode_jpeg(image_bytes).map_err(|e| match e {
            image::ImageError::Encoding(e) => RenderError::ImageEncode(e.to_string()),
            other => RenderError::UndecodableImage(other.to_string()),
        })?;
        debug!(
            "Cover image {}x{} ({} bytes as JPEG)",
            jpeg.width,
            jpeg.height,
            jpeg.data.len()
        );

        let (x, y, width, height) = self.fit(jpeg.width, jpeg.height);

        let mut writer = FragmentWriter::new();
        let image_id = writer.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => jpeg.width as i64,
                "Height" => jpeg.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.data,
        ));
        let resources_id = writer.add_object(dictionary! {
            "XObject" => dictionary! {
                "Cover" => image_id,
            },
        });

        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec!["Cover".into()]),
            Operation::new("Q", vec![]),
        ];
        writer.add_page(self.page, resources_id, operations)?;
        writer.finish()
    }

    /// Largest placement of the image inside the margin box that keeps its
    /// aspect ratio, centered in the box
    fn fit(&self, image_width: u32, image_height: u32) -> (f32, f32, f32, f32) {
        let bx = self.image_box;
        let scale = (bx.width / image_width as f32).min(bx.height / image_height as f32);
        let width = image_width as f32 * scale;
        let height = image_height as f32 * scale;
        let x = bx.x + (bx.width - width) / 2.0;
        let y = bx.y + (bx.height - height) / 2.0;
        (x, y, width, height)
    }
}
