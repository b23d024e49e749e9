use super::model::SentimentAnalysisModel;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tokenizers::Tokenizer;

/// The most probable label for a text and its softmax probability.
///
/// Displays as `"{label} {score}"`, the line the `sentiment` binary prints,
/// and parses back from that line.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// Coarse polarity of a prediction label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    /// `+1`, `-1` or `0`, for weighting scores when averaging several texts.
    pub fn signum(&self) -> i8 {
        match self {
            Polarity::Positive => 1,
            Polarity::Negative => -1,
            Polarity::Neutral => 0,
        }
    }
}

impl Prediction {
    /// Maps the label onto a [`Polarity`]; `None` for labels outside
    /// positive/negative/neutral (case-insensitive).
    pub fn polarity(&self) -> Option<Polarity> {
        match self.label.to_ascii_lowercase().as_str() {
            "positive" => Some(Polarity::Positive),
            "negative" => Some(Polarity::Negative),
            "neutral" => Some(Polarity::Neutral),
            _ => None,
        }
    }

    /// The score signed by polarity; `None` when the label has no polarity.
    pub fn signed_score(&self) -> Option<f32> {
        self.polarity()
            .map(|polarity| f32::from(polarity.signum()) * self.score)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label, self.score)
    }
}

impl FromStr for Prediction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim_end_matches(['\r', '\n']);
        let (label, score) = line
            .rsplit_once(' ')
            .ok_or_else(|| Error::InvalidPrediction(format!("expected `<label> <score>`, got `{line}`")))?;

        if label.is_empty() {
            return Err(Error::InvalidPrediction(format!("missing label in `{line}`")));
        }

        let score: f32 = score
            .parse()
            .map_err(|e| Error::InvalidPrediction(format!("score `{score}` is not a number: {e}")))?;
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::InvalidPrediction(format!(
                "score {score} is outside [0, 1]"
            )));
        }

        Ok(Prediction {
            label: label.to_string(),
            score,
        })
    }
}

pub struct SentimentAnalysisPipeline<M: SentimentAnalysisModel> {
    pub(crate) model: M,
    pub(crate) tokenizer: Tokenizer,
}

impl<M: SentimentAnalysisModel> SentimentAnalysisPipeline<M> {
    /// Classifies a single text.
    pub fn predict(&self, text: &str) -> Result<Prediction> {
        self.model.predict_with_score(&self.tokenizer, text)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn device(&self) -> &candle_core::Device {
        self.model.device()
    }
}
