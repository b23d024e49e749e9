use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Model loading
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model metadata missing: {0}")]
    ModelMetadata(String),

    // Tokenization
    #[error("Tokenizer not found: {0}")]
    TokenizerNotFound(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Input is {tokens} tokens long, the model accepts at most {max}")]
    InputTooLong { tokens: usize, max: usize },

    // Network/Download
    #[error("Download failed: {0}")]
    Download(String),

    // Device
    #[error("Device error: {0}")]
    Device(String),

    // Output line parsing
    #[error("Invalid prediction: {0}")]
    InvalidPrediction(String),

    // Pass-through from dependencies
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hf_hub::api::sync::ApiError> for Error {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        Error::Download(value.to_string())
    }
}
