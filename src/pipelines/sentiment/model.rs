use super::pipeline::Prediction;
use crate::error::Result;
use candle_core::Device;
use tokenizers::Tokenizer;

/// A sequence-classification model that can back a [`super::SentimentAnalysisPipeline`].
pub trait SentimentAnalysisModel {
    type Options: std::fmt::Debug + Clone;

    /// Downloads (or reads from the Hub cache) and loads the checkpoint at `revision`.
    fn new(options: Self::Options, revision: &str, device: Device) -> Result<Self>
    where
        Self: Sized;

    /// Classifies `text`, returning the most probable label and its probability.
    fn predict_with_score(&self, tokenizer: &Tokenizer, text: &str) -> Result<Prediction>;

    fn get_tokenizer(options: Self::Options, revision: &str) -> Result<Tokenizer>;

    fn device(&self) -> &Device;
}
