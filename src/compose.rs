use std::io::Cursor;

use image::ImageEncoder;

use crate::{
    assets::{FontStore, PreparedImage, PreparedTemplate, decode_image},
    composite::{over_region, scale_premul, smoothstep, unpremultiply_rgba8_in_place},
    error::{AssetTag, PosterError, PosterResult},
    model::{FrameGeometry, OutputSize, TextFill, TextLayer},
    text::{LinePaint, dilate, paint_mask, rasterize_line},
};

/// Caller-allocated output surface for one `compose` call. Premultiplied RGBA8,
/// `width * height * 4` bytes.
#[derive(Clone, Debug)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RenderTarget {
    pub fn new(size: OutputSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            data: vec![0u8; size.pixel_count() * 4],
        }
    }

    pub fn size(&self) -> OutputSize {
        OutputSize {
            width: self.width,
            height: self.height,
        }
    }
}

/// Everything one compose call reads: encoded input rasters, frame geometry,
/// the overlay text set, and the fonts those layers reference.
pub struct ComposeInputs<'a> {
    pub template: &'a [u8],
    pub user_photo: &'a [u8],
    pub frame: FrameGeometry,
    pub text: &'a [TextLayer],
    pub fonts: &'a FontStore,
}

impl<'a> ComposeInputs<'a> {
    pub fn from_prepared(template: &'a PreparedTemplate, user_photo: &'a [u8]) -> Self {
        Self {
            template: &template.background,
            user_photo,
            frame: template.spec.frame,
            text: &template.spec.text,
            fonts: &template.fonts,
        }
    }
}

/// The final poster raster, losslessly encoded. Recomputed from scratch per
/// export; never cached.
#[derive(Clone, Debug)]
pub struct ComposedPoster {
    width: u32,
    height: u32,
    png: Vec<u8>,
}

impl ComposedPoster {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.png
    }
}

/// Layer the template, the circularly clipped user photo, and the overlay text
/// into `target`, then PNG-encode it.
///
/// Paint order is fixed: template blit, clipped photo, text layers in declared
/// order (stroke pass before fill pass per layer). Both inputs decode before
/// any painting starts; the decodes run concurrently and failures are tagged
/// with the asset that broke.
#[tracing::instrument(skip_all, fields(width = target.width, height = target.height))]
pub fn compose(mut target: RenderTarget, inputs: &ComposeInputs<'_>) -> PosterResult<ComposedPoster> {
    if target.width == 0
        || target.height == 0
        || target.data.len() != target.width as usize * target.height as usize * 4
    {
        return Err(PosterError::encode("render target unavailable"));
    }

    let (template, user) = rayon::join(
        || decode_image(inputs.template, AssetTag::Template),
        || decode_image(inputs.user_photo, AssetTag::UserPhoto),
    );
    let template = template?;
    let user = user?;

    blit_template(&mut target, &template)?;

    let (clip, side) = clip_user_circle(&user, inputs.frame.radius)?;
    let (frame_x, frame_y, _) = inputs.frame.bounding_square();
    over_region(
        &mut target.data,
        target.width,
        target.height,
        &clip,
        side,
        side,
        frame_x.round() as i64,
        frame_y.round() as i64,
    )?;

    draw_text_layers(&mut target, inputs.frame, inputs.text, inputs.fonts)?;

    let png = encode_png(&target)?;
    Ok(ComposedPoster {
        width: target.width,
        height: target.height,
        png,
    })
}

/// Direct blit: templates are pre-authored at the output resolution, so this
/// only resamples when the authored raster deviates from the target.
fn blit_template(target: &mut RenderTarget, template: &PreparedImage) -> PosterResult<()> {
    if template.width == target.width && template.height == target.height {
        target.data.copy_from_slice(&template.rgba8_premul);
        return Ok(());
    }

    let img = image::RgbaImage::from_raw(
        template.width,
        template.height,
        template.rgba8_premul.clone(),
    )
    .ok_or_else(|| PosterError::encode("template raster buffer size mismatch"))?;
    let resized = image::imageops::resize(
        &img,
        target.width,
        target.height,
        image::imageops::FilterType::Lanczos3,
    );
    target.data.copy_from_slice(resized.as_raw());
    Ok(())
}

/// Cover-scale the user raster to the circle's bounding square, center-crop,
/// and feather a circular alpha mask over it. Non-square rasters end up
/// center-cropped, so nothing ever paints outside the circle.
fn clip_user_circle(user: &PreparedImage, radius: f64) -> PosterResult<(Vec<u8>, u32)> {
    let side = (radius * 2.0).round().max(1.0) as u32;
    let scale = (side as f64 / user.width as f64).max(side as f64 / user.height as f64);
    let scaled_w = ((user.width as f64 * scale).round() as u32).max(side);
    let scaled_h = ((user.height as f64 * scale).round() as u32).max(side);

    let img = image::RgbaImage::from_raw(user.width, user.height, user.rgba8_premul.clone())
        .ok_or_else(|| PosterError::encode("user raster buffer size mismatch"))?;
    let resized = image::imageops::resize(
        &img,
        scaled_w,
        scaled_h,
        image::imageops::FilterType::Lanczos3,
    );
    let crop_x = (scaled_w - side) / 2;
    let crop_y = (scaled_h - side) / 2;
    let mut data = image::imageops::crop_imm(&resized, crop_x, crop_y, side, side)
        .to_image()
        .into_raw();

    let center = (side as f32 - 1.0) / 2.0;
    let r = radius as f32;
    for y in 0..side {
        for x in 0..side {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let dist = (dx * dx + dy * dy).sqrt();
            let coverage = 1.0 - smoothstep(r - 1.0, r, dist);
            if coverage >= 1.0 {
                continue;
            }
            let i = (y as usize * side as usize + x as usize) * 4;
            let px = [data[i], data[i + 1], data[i + 2], data[i + 3]];
            data[i..i + 4].copy_from_slice(&scale_premul(px, coverage));
        }
    }

    Ok((data, side))
}

fn draw_text_layers(
    target: &mut RenderTarget,
    frame: FrameGeometry,
    layers: &[TextLayer],
    fonts: &FontStore,
) -> PosterResult<()> {
    let (width, height) = (target.width, target.height);
    for layer in layers {
        let font = fonts.get(&layer.font).ok_or_else(|| {
            PosterError::validation(format!("unknown font key '{}'", layer.font))
        })?;
        let mask = rasterize_line(font, layer.size_px as f32, &layer.content);

        let center_x = frame.center.x + layer.anchor.x;
        let center_y = frame.center.y + layer.anchor.y;
        let origin_x = (center_x - mask.width as f64 / 2.0).round() as i64;
        let origin_y = (center_y - mask.height as f64 / 2.0).round() as i64;

        if let Some(stroke) = &layer.stroke {
            let outline = dilate(&mask, (stroke.width / 2.0) as f32);
            paint_mask(
                &mut target.data,
                width,
                height,
                &outline,
                origin_x,
                origin_y,
                LinePaint::Solid(stroke.color),
            )?;
        }

        let paint = match &layer.fill {
            TextFill::Solid(color) => LinePaint::Solid(*color),
            TextFill::HorizontalGradient(stops) => LinePaint::Horizontal {
                stops,
                output_width: width,
            },
        };
        paint_mask(
            &mut target.data,
            width,
            height,
            &mask,
            origin_x,
            origin_y,
            paint,
        )?;
    }
    Ok(())
}

fn encode_png(target: &RenderTarget) -> PosterResult<Vec<u8>> {
    let mut rgba = target.data.clone();
    unpremultiply_rgba8_in_place(&mut rgba);

    let mut png = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(Cursor::new(&mut png));
    encoder
        .write_image(
            &rgba,
            target.width,
            target.height,
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| PosterError::encode(format!("poster encode failed: {e}")))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use kurbo::Point;

    use super::*;
    use crate::model::Color;

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn small_frame() -> FrameGeometry {
        FrameGeometry {
            center: Point::new(32.0, 32.0),
            radius: 12.0,
        }
    }

    fn textless_inputs<'a>(
        template: &'a [u8],
        user: &'a [u8],
        fonts: &'a FontStore,
    ) -> ComposeInputs<'a> {
        ComposeInputs {
            template,
            user_photo: user,
            frame: small_frame(),
            text: &[],
            fonts,
        }
    }

    const SIZE: OutputSize = OutputSize {
        width: 64,
        height: 64,
    };

    #[test]
    fn compose_output_has_exactly_the_target_dimensions() {
        let template = png_bytes(64, 64, [0, 255, 0, 255]);
        let user = png_bytes(32, 32, [255, 0, 0, 255]);
        let fonts = FontStore::new();

        let poster = compose(
            RenderTarget::new(SIZE),
            &textless_inputs(&template, &user, &fonts),
        )
        .unwrap();
        assert_eq!((poster.width(), poster.height()), (64, 64));

        let decoded = image::load_from_memory(poster.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn compose_is_deterministic() {
        let template = png_bytes(64, 64, [10, 20, 200, 255]);
        let user = png_bytes(48, 20, [200, 40, 40, 255]);
        let fonts = FontStore::new();

        let a = compose(
            RenderTarget::new(SIZE),
            &textless_inputs(&template, &user, &fonts),
        )
        .unwrap();
        let b = compose(
            RenderTarget::new(SIZE),
            &textless_inputs(&template, &user, &fonts),
        )
        .unwrap();
        assert_eq!(a.bytes(), b.bytes());
    }

    #[test]
    fn non_square_user_raster_stays_inside_the_circle() {
        let template = png_bytes(64, 64, [0, 255, 0, 255]);
        let user = png_bytes(40, 20, [255, 0, 0, 255]);
        let fonts = FontStore::new();

        let poster = compose(
            RenderTarget::new(SIZE),
            &textless_inputs(&template, &user, &fonts),
        )
        .unwrap();
        let decoded = image::load_from_memory(poster.bytes()).unwrap().to_rgba8();

        // Center of the frame shows the photo; anywhere past the radius shows
        // untouched template.
        assert_eq!(decoded.get_pixel(32, 32).0, [255, 0, 0, 255]);
        assert_eq!(decoded.get_pixel(1, 1).0, [0, 255, 0, 255]);
        assert_eq!(decoded.get_pixel(32 + 14, 32).0, [0, 255, 0, 255]);
        assert_eq!(decoded.get_pixel(32, 32 - 14).0, [0, 255, 0, 255]);
    }

    #[test]
    fn template_smaller_than_target_is_resampled_to_fill() {
        let template = png_bytes(16, 16, [7, 7, 7, 255]);
        let user = png_bytes(8, 8, [250, 250, 250, 255]);
        let fonts = FontStore::new();

        let poster = compose(
            RenderTarget::new(SIZE),
            &textless_inputs(&template, &user, &fonts),
        )
        .unwrap();
        let decoded = image::load_from_memory(poster.bytes()).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 63).0, [7, 7, 7, 255]);
    }

    #[test]
    fn decode_failures_are_tagged_per_asset() {
        let good = png_bytes(64, 64, [1, 1, 1, 255]);
        let fonts = FontStore::new();

        let err = compose(
            RenderTarget::new(SIZE),
            &textless_inputs(b"garbage", &good, &fonts),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PosterError::ImageLoad {
                asset: AssetTag::Template,
                ..
            }
        ));

        let err = compose(
            RenderTarget::new(SIZE),
            &textless_inputs(&good, b"garbage", &fonts),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PosterError::ImageLoad {
                asset: AssetTag::UserPhoto,
                ..
            }
        ));
    }

    #[test]
    fn missing_font_key_is_a_validation_error() {
        let template = png_bytes(64, 64, [1, 1, 1, 255]);
        let user = png_bytes(8, 8, [2, 2, 2, 255]);
        let fonts = FontStore::new();
        let text = vec![TextLayer {
            content: "HELLO".to_string(),
            font: "display".to_string(),
            size_px: 12.0,
            fill: TextFill::Solid(Color::WHITE),
            stroke: None,
            anchor: kurbo::Vec2::ZERO,
        }];

        let inputs = ComposeInputs {
            template: &template,
            user_photo: &user,
            frame: small_frame(),
            text: &text,
            fonts: &fonts,
        };
        let err = compose(RenderTarget::new(SIZE), &inputs).unwrap_err();
        assert!(matches!(err, PosterError::Validation(_)));
    }

    #[test]
    fn broken_render_target_is_an_encode_error() {
        let template = png_bytes(64, 64, [1, 1, 1, 255]);
        let user = png_bytes(8, 8, [2, 2, 2, 255]);
        let fonts = FontStore::new();

        let broken = RenderTarget {
            width: 64,
            height: 64,
            data: vec![0u8; 3],
        };
        let err = compose(broken, &textless_inputs(&template, &user, &fonts)).unwrap_err();
        assert!(matches!(err, PosterError::Encode(_)));
    }
}
