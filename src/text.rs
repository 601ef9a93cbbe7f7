use rusttype::{Font, Scale, point};

use crate::{
    composite::{mul_div255, over, smoothstep},
    error::{PosterError, PosterResult},
    model::{Color, GradientStop},
};

/// Grayscale coverage for one laid-out line of text. `left`/`top` offset the
/// buffer relative to the line box origin, so a dilated mask stays registered
/// with the fill mask it was derived from.
#[derive(Clone, Debug)]
pub struct GlyphMask {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
    pub coverage: Vec<u8>,
}

impl GlyphMask {
    fn get(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.coverage[y as usize * self.width as usize + x as usize]
    }
}

/// Lay out and rasterize a single line at `size_px`, left edge at x=0, top of
/// the em box at y=0. Glyph parts overhanging the left edge are clipped.
pub fn rasterize_line(font: &Font<'_>, size_px: f32, text: &str) -> GlyphMask {
    let scale = Scale::uniform(size_px);
    let v_metrics = font.v_metrics(scale);
    let glyphs: Vec<_> = font.layout(text, scale, point(0.0, v_metrics.ascent)).collect();

    let mut max_x = 0i32;
    for g in &glyphs {
        if let Some(bb) = g.pixel_bounding_box() {
            max_x = max_x.max(bb.max.x);
        }
    }
    let width = (max_x.max(1)) as u32;
    let height = ((v_metrics.ascent - v_metrics.descent).ceil().max(1.0)) as u32;

    let mut coverage = vec![0u8; width as usize * height as usize];
    for g in &glyphs {
        let Some(bb) = g.pixel_bounding_box() else {
            continue;
        };
        g.draw(|gx, gy, v| {
            let x = gx as i32 + bb.min.x;
            let y = gy as i32 + bb.min.y;
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                return;
            }
            let c = (v * 255.0).round().clamp(0.0, 255.0) as u8;
            let slot = &mut coverage[y as usize * width as usize + x as usize];
            *slot = (*slot).max(c);
        });
    }

    GlyphMask {
        width,
        height,
        left: 0,
        top: 0,
        coverage,
    }
}

/// Grow coverage outward by `radius` pixels with a half-pixel soft edge. The
/// stroke pass paints the dilated mask, then the fill pass paints the original
/// on top, which reads as an outline around the glyphs.
pub fn dilate(mask: &GlyphMask, radius: f32) -> GlyphMask {
    if radius <= 0.0 {
        return mask.clone();
    }
    let ir = radius.ceil() as i32;
    let width = mask.width + 2 * ir as u32;
    let height = mask.height + 2 * ir as u32;
    let mut coverage = vec![0u8; width as usize * height as usize];

    for oy in 0..height as i32 {
        for ox in 0..width as i32 {
            let mut best = 0.0f32;
            for dy in -ir..=ir {
                for dx in -ir..=ir {
                    let src = mask.get(ox - ir + dx, oy - ir + dy);
                    if src == 0 {
                        continue;
                    }
                    let dist = ((dx * dx + dy * dy) as f32).sqrt();
                    let weight = 1.0 - smoothstep(radius - 0.5, radius + 0.5, dist);
                    if weight <= 0.0 {
                        continue;
                    }
                    best = best.max(src as f32 * weight);
                    if best >= 255.0 {
                        break;
                    }
                }
            }
            coverage[oy as usize * width as usize + ox as usize] =
                best.round().clamp(0.0, 255.0) as u8;
        }
    }

    GlyphMask {
        width,
        height,
        left: mask.left - ir,
        top: mask.top - ir,
        coverage,
    }
}

/// Per-column paint for a text pass. A horizontal gradient is sampled against
/// absolute output x over the full output width.
#[derive(Clone, Copy, Debug)]
pub enum LinePaint<'a> {
    Solid(Color),
    Horizontal {
        stops: &'a [GradientStop],
        output_width: u32,
    },
}

impl LinePaint<'_> {
    fn color_at(&self, x: i64) -> Color {
        match self {
            LinePaint::Solid(c) => *c,
            LinePaint::Horizontal {
                stops,
                output_width,
            } => {
                let span = (output_width.saturating_sub(1)).max(1) as f64;
                gradient_color_at(stops, x.clamp(0, span as i64) as f64 / span)
            }
        }
    }
}

pub fn gradient_color_at(stops: &[GradientStop], t: f64) -> Color {
    let Some(first) = stops.first() else {
        return Color::BLACK;
    };
    let last = stops.last().unwrap_or(first);
    let t = t.clamp(0.0, 1.0);
    if t <= first.offset {
        return first.color;
    }
    if t >= last.offset {
        return last.color;
    }
    for pair in stops.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if t < a.offset || t > b.offset {
            continue;
        }
        let span = b.offset - a.offset;
        if span <= 0.0 {
            return b.color;
        }
        let f = (t - a.offset) / span;
        let lerp = |x: u8, y: u8| -> u8 {
            (x as f64 + (y as f64 - x as f64) * f).round().clamp(0.0, 255.0) as u8
        };
        return Color {
            r: lerp(a.color.r, b.color.r),
            g: lerp(a.color.g, b.color.g),
            b: lerp(a.color.b, b.color.b),
            a: lerp(a.color.a, b.color.a),
        };
    }
    last.color
}

/// Composite a coverage mask over a premultiplied RGBA8 buffer. `origin` is the
/// destination position of the mask's line box origin; the mask's own
/// `left`/`top` shift is applied on top of it.
pub fn paint_mask(
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    mask: &GlyphMask,
    origin_x: i64,
    origin_y: i64,
    paint: LinePaint<'_>,
) -> PosterResult<()> {
    if dst.len() != dst_w as usize * dst_h as usize * 4 {
        return Err(PosterError::encode(
            "paint_mask dst buffer does not match dst_w*dst_h*4",
        ));
    }

    for my in 0..mask.height as i64 {
        let dy = origin_y + mask.top as i64 + my;
        if dy < 0 || dy >= dst_h as i64 {
            continue;
        }
        for mx in 0..mask.width as i64 {
            let dx = origin_x + mask.left as i64 + mx;
            if dx < 0 || dx >= dst_w as i64 {
                continue;
            }
            let cov = mask.coverage[my as usize * mask.width as usize + mx as usize];
            if cov == 0 {
                continue;
            }
            let color = paint.color_at(dx);
            let alpha = mul_div255(u16::from(color.a), u16::from(cov));
            if alpha == 0 {
                continue;
            }
            let src = [
                mul_div255(u16::from(color.r), u16::from(alpha)),
                mul_div255(u16::from(color.g), u16::from(alpha)),
                mul_div255(u16::from(color.b), u16::from(alpha)),
                alpha,
            ];
            let di = (dy as usize * dst_w as usize + dx as usize) * 4;
            let dp = [dst[di], dst[di + 1], dst[di + 2], dst[di + 3]];
            let out = over(dp, src, 1.0);
            dst[di..di + 4].copy_from_slice(&out);
        }
    }
    Ok(())
}
