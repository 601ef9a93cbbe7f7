use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use rusttype::Font;

use crate::{
    composite::premultiply_rgba8_in_place,
    error::{AssetTag, PosterError, PosterResult},
    model::TemplateSpec,
};

/// Decoded raster, premultiplied RGBA8, row-major, tightly packed.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Vec<u8>,
}

/// Decode an encoded raster from memory. Failures carry the `asset` tag so the
/// caller can tell a broken template apart from a broken user photo.
pub fn decode_image(bytes: &[u8], asset: AssetTag) -> PosterResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes)
        .context("decode image from memory")
        .map_err(|e| PosterError::image_load(asset, e))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul,
    })
}

/// Gate raw input on its declared MIME type before any decode work happens.
pub fn ensure_image_mime(mime: &str) -> PosterResult<()> {
    if mime.starts_with("image/") {
        Ok(())
    } else {
        Err(PosterError::invalid_image(format!(
            "unsupported input type '{mime}'"
        )))
    }
}

/// Parsed fonts keyed the way template specs reference them.
#[derive(Default)]
pub struct FontStore {
    fonts: BTreeMap<String, Font<'static>>,
}

impl FontStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bytes(&mut self, key: impl Into<String>, bytes: Vec<u8>) -> PosterResult<()> {
        let key = key.into();
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| PosterError::validation(format!("font '{key}' failed to parse")))?;
        self.fonts.insert(key, font);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Font<'static>> {
        self.fonts.get(key)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

/// A template spec with its file-backed resources resolved: the encoded
/// background raster and every referenced font, read relative to `root`.
pub struct PreparedTemplate {
    pub spec: TemplateSpec,
    pub background: Vec<u8>,
    pub fonts: FontStore,
}

impl PreparedTemplate {
    #[tracing::instrument(skip(spec, root), fields(template = %spec.id))]
    pub fn prepare(spec: &TemplateSpec, root: &Path) -> PosterResult<PreparedTemplate> {
        spec.validate()?;

        let bg_path = root.join(&spec.background);
        let background = std::fs::read(&bg_path)
            .with_context(|| format!("read template background '{}'", bg_path.display()))?;

        let mut fonts = FontStore::new();
        for (key, rel) in &spec.fonts {
            let path = root.join(rel);
            let bytes = std::fs::read(&path)
                .with_context(|| format!("read font '{key}' from '{}'", path.display()))?;
            fonts.insert_bytes(key.clone(), bytes)?;
        }

        tracing::debug!(
            background_bytes = background.len(),
            fonts = fonts.len(),
            "prepared template"
        );

        Ok(PreparedTemplate {
            spec: spec.clone(),
            background,
            fonts,
        })
    }
}
