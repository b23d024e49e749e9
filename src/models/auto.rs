use super::{DistilBertSize, ModernBertSize, SentimentDistilBertModel, SentimentModel, SentimentModernBertModel};
use crate::error::Result;
use crate::pipelines::sentiment::{Prediction, SentimentAnalysisModel};
use candle_core::Device;
use tokenizers::Tokenizer;

/// A sentiment model whose architecture is picked at runtime from a [`SentimentModel`].
#[derive(Clone)]
pub enum AutoSentimentModel {
    DistilBert(SentimentDistilBertModel),
    ModernBert(SentimentModernBertModel),
}

impl AutoSentimentModel {
    pub fn labels(&self) -> &super::Labels {
        match self {
            AutoSentimentModel::DistilBert(model) => model.labels(),
            AutoSentimentModel::ModernBert(model) => model.labels(),
        }
    }
}

impl SentimentAnalysisModel for AutoSentimentModel {
    type Options = SentimentModel;

    fn new(options: Self::Options, revision: &str, device: Device) -> Result<Self> {
        let model = match options {
            SentimentModel::DistilBertSst2 => AutoSentimentModel::DistilBert(
                SentimentDistilBertModel::new(DistilBertSize::Base, revision, device)?,
            ),
            SentimentModel::ModernBertBase => AutoSentimentModel::ModernBert(
                SentimentModernBertModel::new(ModernBertSize::Base, revision, device)?,
            ),
            SentimentModel::ModernBertLarge => AutoSentimentModel::ModernBert(
                SentimentModernBertModel::new(ModernBertSize::Large, revision, device)?,
            ),
        };
        Ok(model)
    }

    fn predict_with_score(&self, tokenizer: &Tokenizer, text: &str) -> Result<Prediction> {
        match self {
            AutoSentimentModel::DistilBert(model) => model.predict_with_score(tokenizer, text),
            AutoSentimentModel::ModernBert(model) => model.predict_with_score(tokenizer, text),
        }
    }

    fn get_tokenizer(options: Self::Options, revision: &str) -> Result<Tokenizer> {
        match options {
            SentimentModel::DistilBertSst2 => {
                SentimentDistilBertModel::get_tokenizer(DistilBertSize::Base, revision)
            }
            SentimentModel::ModernBertBase => {
                SentimentModernBertModel::get_tokenizer(ModernBertSize::Base, revision)
            }
            SentimentModel::ModernBertLarge => {
                SentimentModernBertModel::get_tokenizer(ModernBertSize::Large, revision)
            }
        }
    }

    fn device(&self) -> &Device {
        match self {
            AutoSentimentModel::DistilBert(model) => model.device(),
            AutoSentimentModel::ModernBert(model) => model.device(),
        }
    }
}
