use std::collections::BTreeMap;

use kurbo::{Point, Vec2};

use crate::error::{PosterError, PosterResult};

/// Output raster dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl OutputSize {
    /// The standard 9:16 poster resolution.
    pub const POSTER: OutputSize = OutputSize {
        width: 1080,
        height: 1920,
    };

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Straight-alpha RGBA color, written as `#rrggbb` or `#rrggbbaa` in specs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    pub fn from_hex(s: &str) -> PosterResult<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(PosterError::validation(format!("invalid color '{s}'")));
        }
        let parse = |range: std::ops::Range<usize>| -> PosterResult<u8> {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| PosterError::validation(format!("invalid color '{s}'")))
        };
        match hex.len() {
            6 => Ok(Self {
                r: parse(0..2)?,
                g: parse(2..4)?,
                b: parse(4..6)?,
                a: 0xff,
            }),
            8 => Ok(Self {
                r: parse(0..2)?,
                g: parse(2..4)?,
                b: parse(4..6)?,
                a: parse(6..8)?,
            }),
            _ => Err(PosterError::validation(format!("invalid color '{s}'"))),
        }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 0xff {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Color::from_hex(&s).map_err(|e| e.to_string())
    }
}

impl From<Color> for String {
    fn from(c: Color) -> String {
        c.to_hex()
    }
}

/// The fixed circular region in template coordinates reserved for the user photo.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameGeometry {
    pub center: Point,
    pub radius: f64,
}

impl FrameGeometry {
    /// Top-left corner and side length of the circle's bounding square.
    pub fn bounding_square(&self) -> (f64, f64, f64) {
        let side = self.radius * 2.0;
        (self.center.x - self.radius, self.center.y - self.radius, side)
    }

    pub fn validate(&self, canvas: OutputSize) -> PosterResult<()> {
        if !(self.radius > 0.0) {
            return Err(PosterError::validation("frame radius must be > 0"));
        }
        let (x, y, side) = self.bounding_square();
        if x < 0.0 || y < 0.0 || x + side > canvas.width as f64 || y + side > canvas.height as f64 {
            return Err(PosterError::validation(
                "frame circle must lie inside the canvas",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GradientStop {
    pub offset: f64,
    pub color: Color,
}

/// Text fill paint: flat color, or a horizontal gradient spanning the full output width.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFill {
    Solid(Color),
    HorizontalGradient(Vec<GradientStop>),
}

impl TextFill {
    fn validate(&self) -> PosterResult<()> {
        let TextFill::HorizontalGradient(stops) = self else {
            return Ok(());
        };
        if stops.is_empty() {
            return Err(PosterError::validation(
                "gradient must have at least one stop",
            ));
        }
        for pair in stops.windows(2) {
            if pair[1].offset < pair[0].offset {
                return Err(PosterError::validation(
                    "gradient stop offsets must be non-decreasing",
                ));
            }
        }
        if stops
            .iter()
            .any(|s| !s.offset.is_finite() || !(0.0..=1.0).contains(&s.offset))
        {
            return Err(PosterError::validation(
                "gradient stop offsets must lie in [0, 1]",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextStroke {
    pub color: Color,
    pub width: f64,
}

/// One overlay line. Layers render back-to-front in declared order: stroke pass
/// first, then fill, centered horizontally and anchored at `anchor` relative to
/// the frame center.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TextLayer {
    pub content: String,
    pub font: String, // key into TemplateSpec.fonts
    pub size_px: f64,
    pub fill: TextFill,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<TextStroke>,
    pub anchor: Vec2,
}

/// A pre-authored poster template: background raster, frame geometry, and the
/// fixed overlay text set. Paths are resolved relative to the spec document.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TemplateSpec {
    pub id: String,
    pub background: String,
    pub canvas: OutputSize,
    pub frame: FrameGeometry,
    pub fonts: BTreeMap<String, String>, // key -> font file path
    pub text: Vec<TextLayer>,
}

impl TemplateSpec {
    pub fn validate(&self) -> PosterResult<()> {
        if self.id.trim().is_empty() {
            return Err(PosterError::validation("template id must be non-empty"));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(PosterError::validation("canvas width/height must be > 0"));
        }
        if self.background.trim().is_empty() {
            return Err(PosterError::validation(
                "template background path must be non-empty",
            ));
        }
        self.frame.validate(self.canvas)?;

        for (i, layer) in self.text.iter().enumerate() {
            if layer.content.is_empty() {
                return Err(PosterError::validation(format!(
                    "text layer {i} has empty content"
                )));
            }
            if !(layer.size_px > 0.0) {
                return Err(PosterError::validation(format!(
                    "text layer {i} size_px must be > 0"
                )));
            }
            if !self.fonts.contains_key(&layer.font) {
                return Err(PosterError::validation(format!(
                    "text layer {i} references missing font key '{}'",
                    layer.font
                )));
            }
            layer.fill.validate()?;
            if let Some(stroke) = &layer.stroke
                && !(stroke.width > 0.0)
            {
                return Err(PosterError::validation(format!(
                    "text layer {i} stroke width must be > 0"
                )));
            }
        }
        Ok(())
    }

    /// The standard "I'M ATTENDING" overlay layout against a 1080x1920 canvas
    /// with a centered 620px circular photo frame. `headline` gets the gradient
    /// treatment; all layers share one display font.
    pub fn attending(
        id: impl Into<String>,
        background: impl Into<String>,
        font: impl Into<String>,
        headline: impl Into<String>,
        subtitle: impl Into<String>,
        date_line: impl Into<String>,
    ) -> TemplateSpec {
        let canvas = OutputSize::POSTER;
        let frame = FrameGeometry {
            center: Point::new(540.0, 960.0),
            radius: 310.0,
        };
        let mut fonts = BTreeMap::new();
        fonts.insert("display".to_string(), font.into());

        let stroke = |c: Color, w: f64| Some(TextStroke { color: c, width: w });
        let layer = |content: String, size_px: f64, fill: TextFill, st, dy: f64| TextLayer {
            content,
            font: "display".to_string(),
            size_px,
            fill,
            stroke: st,
            anchor: Vec2::new(0.0, dy),
        };

        let headline_gradient = TextFill::HorizontalGradient(vec![
            GradientStop {
                offset: 0.0,
                color: Color::rgb(0x21, 0x75, 0x9b),
            },
            GradientStop {
                offset: 0.5,
                color: Color::rgb(0xd5, 0x4e, 0x21),
            },
            GradientStop {
                offset: 1.0,
                color: Color::rgb(0x21, 0x75, 0x9b),
            },
        ]);

        TemplateSpec {
            id: id.into(),
            background: background.into(),
            canvas,
            frame,
            fonts,
            text: vec![
                layer(
                    "I'M ATTENDING".to_string(),
                    68.0,
                    TextFill::Solid(Color::WHITE),
                    stroke(Color::BLACK, 4.0),
                    -720.0,
                ),
                layer(
                    headline.into(),
                    88.0,
                    headline_gradient,
                    stroke(Color::WHITE, 5.0),
                    -620.0,
                ),
                layer(
                    subtitle.into(),
                    74.0,
                    TextFill::Solid(Color::WHITE),
                    stroke(Color::WHITE, 5.0),
                    -530.0,
                ),
                layer(
                    date_line.into(),
                    54.0,
                    TextFill::Solid(Color::rgb(0xfb, 0xbc, 0x04)),
                    stroke(Color::BLACK, 3.0),
                    120.0,
                ),
                layer(
                    "SEE YOU THERE!".to_string(),
                    58.0,
                    TextFill::Solid(Color::WHITE),
                    stroke(Color::BLACK, 3.0),
                    195.0,
                ),
            ],
        }
    }
}
