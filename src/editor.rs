use std::io::Cursor;

use kurbo::Vec2;

use crate::{
    assets::ensure_image_mime,
    error::{PosterError, PosterResult},
};

#[derive(Clone, Copy, Debug)]
pub struct EditorConfig {
    /// Side length of the square viewport, and of the confirmed crop.
    pub viewport_size: u32,
    pub min_scale: f64,
    pub max_scale: f64,
    /// JPEG quality for the confirmed crop (0-100).
    pub crop_quality: u8,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            viewport_size: 300,
            min_scale: 0.5,
            max_scale: 5.0,
            crop_quality: 80,
        }
    }
}

/// Interactive pan/zoom state. `position` is re-clamped every time it is read,
/// so a covering image can never expose an empty viewport edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportTransform {
    pub scale: f64,
    pub position: Vec2,
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            position: Vec2::ZERO,
        }
    }
}

/// Smallest scale at which the image, drawn aspect-preserving inside the square
/// viewport, fully covers it. The dominant axis is drawn at `viewport * scale`
/// and the other derived from the aspect ratio, so the cover condition solves to
/// `aspect` for wide sources and `1/aspect` for tall ones.
pub fn cover_scale(natural_width: u32, natural_height: u32) -> PosterResult<f64> {
    if natural_width == 0 || natural_height == 0 {
        return Err(PosterError::invalid_image(format!(
            "degenerate image dimensions {natural_width}x{natural_height}"
        )));
    }
    let aspect = natural_width as f64 / natural_height as f64;
    if aspect > 1.0 {
        Ok(aspect)
    } else {
        Ok(1.0 / aspect)
    }
}

/// Cover-fit draw extents for a source at `scale` inside a square viewport.
pub fn draw_size(scale: f64, natural_width: u32, natural_height: u32, viewport: u32) -> (f64, f64) {
    let vs = viewport as f64;
    let aspect = natural_width as f64 / natural_height as f64;
    let mut draw_w = vs * scale;
    let mut draw_h = vs * scale;
    if aspect > 1.0 {
        draw_h = draw_w / aspect;
    } else {
        draw_w = draw_h * aspect;
    }
    (draw_w, draw_h)
}

struct SourceImage {
    pixels: image::RgbaImage,
}

/// The confirmed square crop: produced once, lossy-encoded, immutable.
#[derive(Clone, Debug)]
pub struct CroppedRaster {
    size: u32,
    jpeg: Vec<u8>,
}

impl CroppedRaster {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.jpeg
    }
}

/// Owns the single live decoded source image and its viewport transform.
/// Loading a new source drops the previous one; `confirm` and `discard` both
/// release it.
pub struct TransformEditor {
    config: EditorConfig,
    source: Option<SourceImage>,
    transform: ViewportTransform,
}

impl TransformEditor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            source: None,
            transform: ViewportTransform::default(),
        }
    }

    /// Decode `bytes` as the new source image. The MIME gate and dimension
    /// checks fail synchronously with `InvalidImage`, before any editor state
    /// changes.
    pub fn load(&mut self, bytes: &[u8], mime: &str) -> PosterResult<()> {
        ensure_image_mime(mime)?;
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PosterError::invalid_image(format!("decode failed: {e}")))?;
        let pixels = decoded.to_rgba8();
        let (width, height) = pixels.dimensions();
        let scale = cover_scale(width, height)?;

        self.source = Some(SourceImage { pixels });
        self.transform = ViewportTransform {
            scale,
            position: Vec2::ZERO,
        };
        tracing::debug!(width, height, cover_scale = scale, "source image loaded");
        Ok(())
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn natural_size(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|s| s.pixels.dimensions())
    }

    /// Current transform with the position clamp applied.
    pub fn transform(&self) -> ViewportTransform {
        ViewportTransform {
            scale: self.transform.scale,
            position: self.clamped_position(self.transform.position),
        }
    }

    pub fn set_scale(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.transform.scale = value.clamp(self.config.min_scale, self.config.max_scale);
    }

    pub fn pan(&mut self, delta: Vec2) {
        let moved = self.transform.position + delta;
        self.transform.position = self.clamped_position(moved);
    }

    /// Restore scale 1 and a centered position. Note this is scale 1, not the
    /// cover scale, so non-square sources can under-fill the viewport until the
    /// user zooms back out.
    pub fn reset(&mut self) {
        self.transform = ViewportTransform::default();
    }

    /// Rasterize exactly the visible viewport region into the square crop and
    /// lossy-encode it. Consumes the source image; the editor returns to its
    /// unloaded state.
    pub fn confirm(&mut self) -> PosterResult<CroppedRaster> {
        let source = self
            .source
            .take()
            .ok_or_else(|| PosterError::validation("confirm requires a loaded source image"))?;

        let vs = self.config.viewport_size;
        let (natural_w, natural_h) = source.pixels.dimensions();
        let (draw_w, draw_h) = draw_size(self.transform.scale, natural_w, natural_h, vs);
        let position = self.clamped_position_for(self.transform.position, draw_w, draw_h);

        let resized = image::imageops::resize(
            &source.pixels,
            (draw_w.round().max(1.0)) as u32,
            (draw_h.round().max(1.0)) as u32,
            image::imageops::FilterType::Lanczos3,
        );

        let draw_x = ((vs as f64 - draw_w) / 2.0 + position.x).round() as i64;
        let draw_y = ((vs as f64 - draw_h) / 2.0 + position.y).round() as i64;

        // The lossy target has no alpha channel; uncovered area and source
        // transparency flatten to black, matching the reference encoder.
        let mut canvas = image::RgbImage::from_pixel(vs, vs, image::Rgb([0, 0, 0]));
        for (sx, sy, px) in resized.enumerate_pixels() {
            let dx = draw_x + sx as i64;
            let dy = draw_y + sy as i64;
            if dx < 0 || dy < 0 || dx >= vs as i64 || dy >= vs as i64 {
                continue;
            }
            let a = px.0[3] as u16;
            let flatten = |c: u8| ((c as u16 * a + 127) / 255) as u8;
            canvas.put_pixel(
                dx as u32,
                dy as u32,
                image::Rgb([flatten(px.0[0]), flatten(px.0[1]), flatten(px.0[2])]),
            );
        }

        let mut jpeg = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            Cursor::new(&mut jpeg),
            self.config.crop_quality,
        );
        image::DynamicImage::ImageRgb8(canvas)
            .write_with_encoder(encoder)
            .map_err(|e| PosterError::encode(format!("crop encode failed: {e}")))?;

        self.transform = ViewportTransform::default();
        Ok(CroppedRaster { size: vs, jpeg })
    }

    /// Drop the source image and transform state.
    pub fn discard(&mut self) {
        self.source = None;
        self.transform = ViewportTransform::default();
    }

    fn clamped_position(&self, position: Vec2) -> Vec2 {
        let Some(source) = &self.source else {
            return Vec2::ZERO;
        };
        let (natural_w, natural_h) = source.pixels.dimensions();
        let (draw_w, draw_h) = draw_size(
            self.transform.scale,
            natural_w,
            natural_h,
            self.config.viewport_size,
        );
        self.clamped_position_for(position, draw_w, draw_h)
    }

    fn clamped_position_for(&self, position: Vec2, draw_w: f64, draw_h: f64) -> Vec2 {
        let vs = self.config.viewport_size as f64;
        let max_x = ((draw_w - vs) / 2.0).max(0.0);
        let max_y = ((draw_h - vs) / 2.0).max(0.0);
        Vec2::new(
            position.x.clamp(-max_x, max_x),
            position.y.clamp(-max_y, max_y),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn loaded_editor(width: u32, height: u32, config: EditorConfig) -> TransformEditor {
        let mut editor = TransformEditor::new(config);
        editor
            .load(&png_bytes(width, height, [40, 80, 120, 255]), "image/png")
            .unwrap();
        editor
    }

    #[test]
    fn cover_scale_wide_source() {
        let scale = cover_scale(1600, 900).unwrap();
        assert!((scale - 16.0 / 9.0).abs() < 1e-12);

        let (w, h) = draw_size(scale, 1600, 900, 300);
        assert!((h - 300.0).abs() < 1e-9);
        assert!((w - 533.333_333_333_333_3).abs() < 1e-9);
        assert!(w >= 300.0);
    }

    #[test]
    fn cover_scale_tall_source() {
        let scale = cover_scale(900, 1600).unwrap();
        assert!((scale - 0.5625_f64.recip()).abs() < 1e-12);

        let (w, h) = draw_size(scale, 900, 1600, 300);
        assert!((w - 300.0).abs() < 1e-9);
        assert!((h - 533.333_333_333_333_3).abs() < 1e-9);
        assert!(h >= 300.0);
    }

    #[test]
    fn cover_scale_square_is_one() {
        assert_eq!(cover_scale(512, 512).unwrap(), 1.0);
    }

    #[test]
    fn cover_scale_rejects_degenerate_dimensions() {
        assert!(matches!(
            cover_scale(0, 100),
            Err(PosterError::InvalidImage(_))
        ));
        assert!(matches!(
            cover_scale(100, 0),
            Err(PosterError::InvalidImage(_))
        ));
    }

    #[test]
    fn load_rejects_non_image_mime() {
        let mut editor = TransformEditor::new(EditorConfig::default());
        let err = editor.load(b"whatever", "text/plain").unwrap_err();
        assert!(matches!(err, PosterError::InvalidImage(_)));
        assert!(!editor.has_source());
    }

    #[test]
    fn load_rejects_undecodable_bytes() {
        let mut editor = TransformEditor::new(EditorConfig::default());
        let err = editor.load(b"not an image", "image/png").unwrap_err();
        assert!(matches!(err, PosterError::InvalidImage(_)));
    }

    #[test]
    fn load_initializes_cover_scale_and_replaces_prior_source() {
        let mut editor = loaded_editor(160, 90, EditorConfig::default());
        assert_eq!(editor.natural_size(), Some((160, 90)));
        assert!((editor.transform().scale - 16.0 / 9.0).abs() < 1e-12);

        editor
            .load(&png_bytes(90, 160, [1, 2, 3, 255]), "image/jpeg")
            .unwrap();
        assert_eq!(editor.natural_size(), Some((90, 160)));
        assert!((editor.transform().scale - 16.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn set_scale_clamps_to_configured_bounds() {
        let mut editor = loaded_editor(100, 100, EditorConfig::default());
        editor.set_scale(99.0);
        assert_eq!(editor.transform().scale, 5.0);
        editor.set_scale(0.01);
        assert_eq!(editor.transform().scale, 0.5);
        editor.set_scale(f64::NAN);
        assert_eq!(editor.transform().scale, 0.5);
    }

    #[test]
    fn pan_clamps_to_cover_bounds() {
        let mut editor = loaded_editor(160, 90, EditorConfig::default());
        // At the cover scale the vertical draw size equals the viewport, so
        // only horizontal panning has any slack.
        let (draw_w, _) = draw_size(editor.transform().scale, 160, 90, 300);
        let max_x = (draw_w - 300.0) / 2.0;

        editor.pan(Vec2::new(1e6, 1e6));
        let pos = editor.transform().position;
        assert!((pos.x - max_x).abs() < 1e-9);
        assert!(pos.y.abs() < 1e-9);

        editor.pan(Vec2::new(-1e9, -5.0));
        let pos = editor.transform().position;
        assert!((pos.x + max_x).abs() < 1e-9);
        assert!(pos.y.abs() < 1e-9);
    }

    #[test]
    fn pan_on_square_source_at_scale_one_stays_centered() {
        let mut editor = loaded_editor(100, 100, EditorConfig::default());
        assert_eq!(editor.transform().scale, 1.0);
        editor.pan(Vec2::new(10_000.0, 0.0));
        assert_eq!(editor.transform().position, Vec2::ZERO);
    }

    #[test]
    fn reset_restores_scale_one_and_center() {
        let mut editor = loaded_editor(160, 90, EditorConfig::default());
        editor.set_scale(3.0);
        editor.pan(Vec2::new(50.0, 20.0));
        editor.reset();
        let t = editor.transform();
        assert_eq!(t.scale, 1.0);
        assert_eq!(t.position, Vec2::ZERO);
    }

    #[test]
    fn confirm_produces_square_jpeg_and_consumes_source() {
        let config = EditorConfig {
            viewport_size: 64,
            ..EditorConfig::default()
        };
        let mut editor = loaded_editor(128, 96, config);
        let crop = editor.confirm().unwrap();
        assert_eq!(crop.size(), 64);

        let decoded = image::load_from_memory(crop.bytes()).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 64);

        assert!(!editor.has_source());
        assert!(editor.confirm().is_err());
    }

    #[test]
    fn discard_drops_the_source() {
        let mut editor = loaded_editor(100, 100, EditorConfig::default());
        editor.discard();
        assert!(!editor.has_source());
        assert_eq!(editor.transform(), ViewportTransform::default());
    }
}
