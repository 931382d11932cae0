use thiserror::Error;

/// Image fetch failure. `Clone` because one result is handed to every
/// caller sharing an in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),
}

impl From<imagesize::ImageError> for ImageError {
    fn from(err: imagesize::ImageError) -> Self {
        match err {
            imagesize::ImageError::NotSupported => {
                ImageError::Decode("unsupported image format".to_string())
            }
            imagesize::ImageError::CorruptedImage => {
                ImageError::Decode("corrupted image".to_string())
            }
            imagesize::ImageError::IoError(err) => ImageError::Decode(err.to_string()),
        }
    }
}
