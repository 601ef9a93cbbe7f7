use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

use crate::{
    compose::ComposedPoster,
    error::{PosterError, PosterResult},
};

/// Download artifact name: `<event-id>-<timestamp>.png`.
pub fn poster_filename(event_id: &str, timestamp_ms: u128) -> String {
    format!("{event_id}-{timestamp_ms}.png")
}

/// Platform share collaborator. Implementations receive only the encoded
/// raster, never editor or engine state.
pub trait ShareSink {
    fn can_share(&self) -> bool;
    fn share(&mut self, filename: &str, png: &[u8]) -> PosterResult<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Shared,
    Downloaded(PathBuf),
}

/// Writes composed posters to disk and dispatches them to a share sink, with
/// the share path falling back to download when the sink lacks the capability.
pub struct Exporter {
    event_id: String,
    out_dir: PathBuf,
}

impl Exporter {
    pub fn new(event_id: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            event_id: event_id.into(),
            out_dir: out_dir.into(),
        }
    }

    pub fn download(&self, poster: &ComposedPoster) -> PosterResult<PathBuf> {
        let name = poster_filename(&self.event_id, now_ms());
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("create output dir '{}'", self.out_dir.display()))?;
        let path = self.out_dir.join(name);
        std::fs::write(&path, poster.bytes())
            .with_context(|| format!("write poster '{}'", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = poster.bytes().len(), "poster written");
        Ok(path)
    }

    pub fn share(
        &self,
        poster: &ComposedPoster,
        sink: &mut dyn ShareSink,
    ) -> PosterResult<ExportOutcome> {
        if sink.can_share() {
            let name = poster_filename(&self.event_id, now_ms());
            match sink.share(&name, poster.bytes()) {
                Ok(()) => return Ok(ExportOutcome::Shared),
                Err(PosterError::ShareUnsupported) => {}
                Err(e) => return Err(e),
            }
        }
        let path = self.download(poster)?;
        Ok(ExportOutcome::Downloaded(path))
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
