//! Model, config and tokenizer loading from the Hugging Face Hub.
//!
//! - [`HfLoader`] - fetches a single file from a Hub repository
//! - [`ConfigLoader`] - downloads and deserializes a JSON config file
//! - [`WeightsLoader`] - downloads model weights and opens them as a [`VarBuilder`]
//! - [`TokenizerLoader`] - downloads a tokenizer, building one from `vocab.txt`
//!   when the repository ships no `tokenizer.json`
//!
//! Downloads go through the blocking `hf-hub` client and land in its on-disk
//! cache (`HF_HOME`), so a second run does not touch the network.

use crate::error::{Error, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::decoders::wordpiece::WordPiece as WordPieceDecoder;
use tokenizers::decoders::DecoderWrapper;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::models::ModelWrapper;
use tokenizers::normalizers::{BertNormalizer, NormalizerWrapper};
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::processors::PostProcessorWrapper;
use tokenizers::{Model, Tokenizer, TokenizerBuilder};

pub const DEFAULT_REVISION: &str = "main";

#[derive(Debug, Clone)]
pub struct HfLoader {
    pub repo: String,
    pub revision: String,
    pub filename: String,
}

impl HfLoader {
    pub fn new(repo: &str, filename: &str) -> Self {
        Self {
            repo: repo.into(),
            revision: DEFAULT_REVISION.into(),
            filename: filename.into(),
        }
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = revision.into();
        self
    }

    /// Returns the local path of the file, downloading it on a cache miss.
    pub fn load(&self) -> Result<PathBuf> {
        let hf_api = ApiBuilder::new().with_progress(false).build()?;
        let hf_repo = hf_api.repo(Repo::with_revision(
            self.repo.clone(),
            RepoType::Model,
            self.revision.clone(),
        ));

        tracing::debug!(repo = %self.repo, revision = %self.revision, file = %self.filename, "fetching");
        let path = hf_repo.get(self.filename.as_str())?;

        Ok(path)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub config_file_loader: HfLoader,
}

impl ConfigLoader {
    pub fn new(repo: &str, filename: &str) -> Self {
        Self {
            config_file_loader: HfLoader::new(repo, filename),
        }
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.config_file_loader = self.config_file_loader.with_revision(revision);
        self
    }

    /// Downloads the file and returns its raw contents.
    pub fn load_string(&self) -> Result<String> {
        let path = self.config_file_loader.load()?;
        let content = std::fs::read_to_string(&path)?;
        Ok(content)
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        let content = self.load_string()?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct WeightsLoader {
    pub safetensors_loader: HfLoader,
    pub pytorch_loader: HfLoader,
}

impl WeightsLoader {
    pub fn new(repo: &str) -> Self {
        Self {
            safetensors_loader: HfLoader::new(repo, "model.safetensors"),
            pytorch_loader: HfLoader::new(repo, "pytorch_model.bin"),
        }
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.safetensors_loader = self.safetensors_loader.with_revision(revision);
        self.pytorch_loader = self.pytorch_loader.with_revision(revision);
        self
    }

    /// Resolves the weights file, preferring `model.safetensors`.
    pub fn weights_path(&self) -> Result<PathBuf> {
        match self.safetensors_loader.load() {
            Ok(path) => Ok(path),
            Err(safetensors_err) => match self.pytorch_loader.load() {
                Ok(path) => Ok(path),
                Err(pytorch_err) => Err(Error::ModelNotFound(format!(
                    "{}: expected `model.safetensors` ({safetensors_err}) or `pytorch_model.bin` ({pytorch_err})",
                    self.safetensors_loader.repo
                ))),
            },
        }
    }

    pub fn load(&self, device: &Device) -> Result<VarBuilder<'static>> {
        let weights_filename = self.weights_path()?;
        var_builder_for(&weights_filename, DType::F32, device)
    }
}

/// Opens a weights file as a [`VarBuilder`], picking the reader from the extension.
pub fn var_builder_for(
    weights_filename: &Path,
    dtype: DType,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    if weights_filename
        .extension()
        .is_some_and(|ext| ext == "safetensors")
    {
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], dtype, device)? };
        Ok(vb)
    } else if weights_filename
        .extension()
        .is_some_and(|ext| ext == "bin")
    {
        Ok(VarBuilder::from_pth(weights_filename, dtype, device)?)
    } else {
        Err(Error::ModelNotFound(format!(
            "unsupported weight file format: {weights_filename:?}"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct TokenizerLoader {
    pub tokenizer_file_loader: HfLoader,
    pub vocab_file_loader: HfLoader,
    pub tokenizer_config_loader: ConfigLoader,
}

#[derive(Deserialize)]
struct RawTokenizerConfig {
    do_lower_case: Option<bool>,
}

impl TokenizerLoader {
    pub fn new(repo: &str) -> Self {
        Self {
            tokenizer_file_loader: HfLoader::new(repo, "tokenizer.json"),
            vocab_file_loader: HfLoader::new(repo, "vocab.txt"),
            tokenizer_config_loader: ConfigLoader::new(repo, "tokenizer_config.json"),
        }
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.tokenizer_file_loader = self.tokenizer_file_loader.with_revision(revision);
        self.vocab_file_loader = self.vocab_file_loader.with_revision(revision);
        self.tokenizer_config_loader = self.tokenizer_config_loader.with_revision(revision);
        self
    }

    pub fn load(&self) -> Result<Tokenizer> {
        match self.tokenizer_file_loader.load() {
            Ok(path) => Tokenizer::from_file(path).map_err(|e| {
                Error::TokenizerNotFound(format!(
                    "failed to read tokenizer.json from {}: {e}",
                    self.tokenizer_file_loader.repo
                ))
            }),
            Err(tokenizer_err) => {
                tracing::debug!(error = %tokenizer_err, "no tokenizer.json, falling back to vocab.txt");
                let vocab_path = self.vocab_file_loader.load().map_err(|vocab_err| {
                    Error::TokenizerNotFound(format!(
                        "{}: expected `tokenizer.json` ({tokenizer_err}) or `vocab.txt` ({vocab_err})",
                        self.vocab_file_loader.repo
                    ))
                })?;

                // A missing tokenizer_config.json keeps the BERT default of lower-casing.
                let lowercase = self
                    .tokenizer_config_loader
                    .load::<RawTokenizerConfig>()
                    .ok()
                    .and_then(|c| c.do_lower_case)
                    .unwrap_or(true);

                wordpiece_tokenizer(&vocab_path, lowercase)
            }
        }
    }
}

/// Builds a BERT-style WordPiece tokenizer (`[CLS] ... [SEP]`) from a `vocab.txt` file.
pub fn wordpiece_tokenizer(vocab_path: &Path, lowercase: bool) -> Result<Tokenizer> {
    let vocab = vocab_path.to_string_lossy();
    let wordpiece = WordPiece::from_file(&vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| Error::TokenizerNotFound(format!("invalid vocab file {vocab}: {e}")))?;

    let token_id = |token: &str| {
        wordpiece
            .token_to_id(token)
            .ok_or_else(|| Error::TokenizerNotFound(format!("{token} missing from {vocab}")))
    };
    let cls = ("[CLS]".to_string(), token_id("[CLS]")?);
    let sep = ("[SEP]".to_string(), token_id("[SEP]")?);

    let tokenizer = TokenizerBuilder::<
        ModelWrapper,
        NormalizerWrapper,
        PreTokenizerWrapper,
        PostProcessorWrapper,
        DecoderWrapper,
    >::new()
    .with_model(wordpiece.into())
    .with_normalizer(Some(
        BertNormalizer::new(true, true, None, lowercase).into(),
    ))
    .with_pre_tokenizer(Some(BertPreTokenizer.into()))
    .with_post_processor(Some(BertProcessing::new(sep, cls).into()))
    .with_decoder(Some(WordPieceDecoder::default().into()))
    .build()
    .map_err(|e| Error::TokenizerNotFound(format!("failed to assemble tokenizer: {e}")))?;

    Ok(Tokenizer::from(tokenizer))
}
