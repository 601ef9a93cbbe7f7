#![forbid(unsafe_code)]

pub mod assets;
pub mod compose;
pub mod composite;
pub mod editor;
pub mod error;
pub mod export;
pub mod model;
pub mod text;

pub use kurbo::{Point, Vec2};

pub use assets::{FontStore, PreparedImage, PreparedTemplate, decode_image, ensure_image_mime};
pub use compose::{ComposeInputs, ComposedPoster, RenderTarget, compose};
pub use editor::{
    CroppedRaster, EditorConfig, TransformEditor, ViewportTransform, cover_scale, draw_size,
};
pub use error::{AssetTag, PosterError, PosterResult};
pub use export::{ExportOutcome, Exporter, ShareSink, poster_filename};
pub use model::{
    Color, FrameGeometry, GradientStop, OutputSize, TemplateSpec, TextFill, TextLayer, TextStroke,
};
