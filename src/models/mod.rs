//! Pretrained sequence-classification models usable for sentiment analysis.

pub mod auto;
pub mod distilbert;
pub mod labels;
pub mod modernbert;

pub use auto::AutoSentimentModel;
pub use distilbert::{DistilBertSize, SentimentDistilBertModel};
pub use labels::Labels;
pub use modernbert::{ModernBertSize, SentimentModernBertModel};

use crate::error::{Error, Result};
use candle_core::{Device, Tensor};
use std::fmt;
use std::str::FromStr;
use tokenizers::Tokenizer;

/// The pretrained checkpoints the sentiment pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SentimentModel {
    /// DistilBERT fine-tuned on SST-2, labels `NEGATIVE` / `POSITIVE`.
    #[default]
    DistilBertSst2,
    ModernBertBase,
    ModernBertLarge,
}

impl SentimentModel {
    pub const ALL: [SentimentModel; 3] = [
        SentimentModel::DistilBertSst2,
        SentimentModel::ModernBertBase,
        SentimentModel::ModernBertLarge,
    ];

    /// Name used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            SentimentModel::DistilBertSst2 => "distilbert-sst2",
            SentimentModel::ModernBertBase => "modernbert-base",
            SentimentModel::ModernBertLarge => "modernbert-large",
        }
    }

    /// Hugging Face Hub repository holding the checkpoint.
    pub fn repo_id(&self) -> &'static str {
        match self {
            SentimentModel::DistilBertSst2 => DistilBertSize::Base.repo_id(),
            SentimentModel::ModernBertBase => ModernBertSize::Base.repo_id(),
            SentimentModel::ModernBertLarge => ModernBertSize::Large.repo_id(),
        }
    }
}

impl fmt::Display for SentimentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SentimentModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SentimentModel::ALL
            .into_iter()
            .find(|model| model.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = SentimentModel::ALL.iter().map(|m| m.name()).collect();
                Error::ModelNotFound(format!("unknown model `{s}`, expected one of: {}", known.join(", ")))
            })
    }
}

/// Tokenizes a single text into `(1, seq_len)` id and attention-mask tensors.
pub(crate) fn encode_input(
    tokenizer: &Tokenizer,
    text: &str,
    max_len: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let tokens = tokenizer.encode(text, true).map_err(|e| {
        Error::Tokenization(format!(
            "Tokenization failed on '{}': {}",
            &text.chars().take(50).collect::<String>(),
            e
        ))
    })?;

    if tokens.len() > max_len {
        return Err(Error::InputTooLong {
            tokens: tokens.len(),
            max: max_len,
        });
    }

    let input_ids = Tensor::new(tokens.get_ids(), device)?.unsqueeze(0)?;
    let attention_mask = Tensor::new(tokens.get_attention_mask(), device)?.unsqueeze(0)?;

    Ok((input_ids, attention_mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::wordpiece_tokenizer;
    use std::io::Write;

    fn tiny_tokenizer(dir: &std::path::Path) -> Tokenizer {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("vocab.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        for token in ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "i", "love", "rust", "##y", "!"] {
            writeln!(file, "{token}").unwrap();
        }
        wordpiece_tokenizer(&path, true).unwrap()
    }

    #[test]
    fn encode_input_enforces_the_position_limit() {
        let dir = std::env::temp_dir().join(format!("sentiment-encode-{}", std::process::id()));
        let tokenizer = tiny_tokenizer(&dir);

        // [CLS] i love rust ##y ! [SEP]
        let (input_ids, attention_mask) =
            encode_input(&tokenizer, "I love Rusty!", 7, &Device::Cpu).unwrap();
        assert_eq!(input_ids.dims(), &[1, 7]);
        assert_eq!(attention_mask.dims(), &[1, 7]);

        match encode_input(&tokenizer, "I love Rusty!", 6, &Device::Cpu) {
            Err(Error::InputTooLong { tokens, max }) => {
                assert_eq!(tokens, 7);
                assert_eq!(max, 6);
            }
            other => panic!("expected InputTooLong, got {:?}", other.map(|_| ())),
        }

        let (input_ids, attention_mask) = encode_input(&tokenizer, "", 7, &Device::Cpu).unwrap();
        assert_eq!(input_ids.dims(), &[1, 2]);
        assert_eq!(input_ids.to_vec2::<u32>().unwrap(), [[2, 3]]);
        assert_eq!(attention_mask.dims(), &[1, 2]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn model_names_round_trip() {
        for model in SentimentModel::ALL {
            assert_eq!(model.to_string().parse::<SentimentModel>().unwrap(), model);
        }
    }

    #[test]
    fn default_model_is_the_sst2_checkpoint() {
        assert_eq!(SentimentModel::default(), SentimentModel::DistilBertSst2);
        assert_eq!(
            SentimentModel::default().repo_id(),
            "distilbert/distilbert-base-uncased-finetuned-sst-2-english"
        );
        assert_eq!(
            SentimentModel::ModernBertLarge.repo_id(),
            "clapAI/modernBERT-large-multilingual-sentiment"
        );
    }

    #[test]
    fn unknown_model_name_lists_the_choices() {
        let err = "gpt-9".parse::<SentimentModel>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("gpt-9"));
        assert!(message.contains("distilbert-sst2"));
        assert!(message.contains("modernbert-large"));
    }
}
