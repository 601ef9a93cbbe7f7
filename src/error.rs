pub type PosterResult<T> = Result<T, PosterError>;

/// Which compose input failed to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetTag {
    Template,
    UserPhoto,
}

impl std::fmt::Display for AssetTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetTag::Template => f.write_str("template"),
            AssetTag::UserPhoto => f.write_str("user photo"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PosterError {
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("image load error ({asset}): {source}")]
    ImageLoad {
        asset: AssetTag,
        source: anyhow::Error,
    },

    #[error("encode error: {0}")]
    Encode(String),

    #[error("share is not supported by this sink")]
    ShareUnsupported,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PosterError {
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn image_load(asset: AssetTag, source: impl Into<anyhow::Error>) -> Self {
        Self::ImageLoad {
            asset,
            source: source.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
