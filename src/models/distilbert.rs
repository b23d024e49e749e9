//! DistilBERT encoder with a sequence-classification head.
//!
//! DistilBERT is a six-layer distillation of BERT: learned position
//! embeddings, post-norm self-attention blocks and a GELU feed-forward
//! network. The classification head reads the hidden state of the first
//! (`[CLS]`) token.
//!
//! Weight names follow the Hub checkpoints (`distilbert.*`,
//! `pre_classifier.*`, `classifier.*`).

use candle_core::{DType, Device, IndexOp, Result, Tensor, D};
use candle_nn::{embedding, layer_norm, linear, ops::softmax, Embedding, LayerNorm, Linear, Module, VarBuilder};
use serde::Deserialize;
use std::collections::HashMap;

const LAYER_NORM_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HiddenAct {
    #[default]
    Gelu,
    Relu,
}

impl HiddenAct {
    fn apply(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            HiddenAct::Gelu => xs.gelu_erf(),
            HiddenAct::Relu => xs.relu(),
        }
    }
}

fn default_model_type() -> String {
    "distilbert".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub hidden_dim: usize,
    #[serde(default)]
    pub activation: HiddenAct,
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub pad_token_id: u32,
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
}

impl Config {
    /// Rejects shapes the encoder cannot be built from.
    pub fn validate(&self) -> std::result::Result<(), crate::error::Error> {
        if self.n_heads == 0 || self.dim % self.n_heads != 0 {
            return Err(crate::error::Error::ModelMetadata(format!(
                "dim {} is not divisible into {} attention heads",
                self.dim, self.n_heads
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Embeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    layer_norm: LayerNorm,
}

impl Embeddings {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let word_embeddings = embedding(config.vocab_size, config.dim, vb.pp("word_embeddings"))?;
        let position_embeddings = embedding(
            config.max_position_embeddings,
            config.dim,
            vb.pp("position_embeddings"),
        )?;
        let layer_norm = layer_norm(config.dim, LAYER_NORM_EPS, vb.pp("LayerNorm"))?;

        Ok(Self {
            word_embeddings,
            position_embeddings,
            layer_norm,
        })
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let seq_len = input_ids.dim(1)?;
        let positions = Tensor::arange(0u32, seq_len as u32, input_ids.device())?.unsqueeze(0)?;

        let words = input_ids.apply(&self.word_embeddings)?;
        let positions = positions.apply(&self.position_embeddings)?;

        words.broadcast_add(&positions)?.apply(&self.layer_norm)
    }
}

#[derive(Debug, Clone)]
struct MultiHeadSelfAttention {
    q_lin: Linear,
    k_lin: Linear,
    v_lin: Linear,
    out_lin: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl MultiHeadSelfAttention {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let dim = config.dim;
        Ok(Self {
            q_lin: linear(dim, dim, vb.pp("q_lin"))?,
            k_lin: linear(dim, dim, vb.pp("k_lin"))?,
            v_lin: linear(dim, dim, vb.pp("v_lin"))?,
            out_lin: linear(dim, dim, vb.pp("out_lin"))?,
            n_heads: config.n_heads,
            head_dim: dim / config.n_heads,
        })
    }

    /// `(batch, seq, dim)` -> `(batch, heads, seq, head_dim)`
    fn split_heads(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = xs.dims3()?;
        xs.reshape((batch, seq_len, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, dim) = hidden_states.dims3()?;

        let q = self.split_heads(&hidden_states.apply(&self.q_lin)?)?;
        let k = self.split_heads(&hidden_states.apply(&self.k_lin)?)?;
        let v = self.split_heads(&hidden_states.apply(&self.v_lin)?)?;

        let q = (q * (self.head_dim as f64).powf(-0.5))?;
        let scores = q.matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)?;
        let scores = scores.broadcast_add(attention_mask)?;
        let probs = softmax(&scores, D::Minus1)?;

        probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, dim))?
            .apply(&self.out_lin)
    }
}

#[derive(Debug, Clone)]
struct FeedForward {
    lin1: Linear,
    lin2: Linear,
    activation: HiddenAct,
}

impl FeedForward {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            lin1: linear(config.dim, config.hidden_dim, vb.pp("lin1"))?,
            lin2: linear(config.hidden_dim, config.dim, vb.pp("lin2"))?,
            activation: config.activation,
        })
    }
}

impl Module for FeedForward {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.apply(&self.lin1)?;
        self.activation.apply(&xs)?.apply(&self.lin2)
    }
}

#[derive(Debug, Clone)]
struct TransformerBlock {
    attention: MultiHeadSelfAttention,
    sa_layer_norm: LayerNorm,
    ffn: FeedForward,
    output_layer_norm: LayerNorm,
}

impl TransformerBlock {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            attention: MultiHeadSelfAttention::load(vb.pp("attention"), config)?,
            sa_layer_norm: layer_norm(config.dim, LAYER_NORM_EPS, vb.pp("sa_layer_norm"))?,
            ffn: FeedForward::load(vb.pp("ffn"), config)?,
            output_layer_norm: layer_norm(config.dim, LAYER_NORM_EPS, vb.pp("output_layer_norm"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let attention_output = self.attention.forward(hidden_states, attention_mask)?;
        let hidden_states = (attention_output + hidden_states)?.apply(&self.sa_layer_norm)?;

        let ffn_output = hidden_states.apply(&self.ffn)?;
        (ffn_output + hidden_states)?.apply(&self.output_layer_norm)
    }
}

/// The DistilBERT encoder: embeddings followed by the transformer blocks.
#[derive(Debug, Clone)]
pub struct DistilBertModel {
    embeddings: Embeddings,
    layers: Vec<TransformerBlock>,
    dtype: DType,
}

impl DistilBertModel {
    pub fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;

        let embeddings = Embeddings::load(vb.pp("embeddings"), config)?;

        let mut layers = Vec::with_capacity(config.n_layers);
        for layer_idx in 0..config.n_layers {
            layers.push(TransformerBlock::load(
                vb.pp(format!("transformer.layer.{layer_idx}")),
                config,
            )?);
        }

        Ok(Self {
            embeddings,
            layers,
            dtype: vb.dtype(),
        })
    }

    /// Additive mask of shape `(batch, 1, 1, seq)`: 0 where attended, `f32::MIN` on padding.
    fn extended_attention_mask(&self, attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len) = attention_mask.dims2()?;
        attention_mask
            .to_dtype(self.dtype)?
            .affine(-1.0, 1.0)?
            .affine(f32::MIN as f64, 0.0)?
            .reshape((batch, 1, 1, seq_len))
    }

    /// Returns hidden states of shape `(batch, seq, dim)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask = self.extended_attention_mask(attention_mask)?;

        let mut hidden_states = self.embeddings.forward(input_ids)?;
        for layer in &self.layers {
            hidden_states = layer.forward(&hidden_states, &mask)?;
        }

        Ok(hidden_states)
    }
}

/// DistilBERT with the `pre_classifier -> ReLU -> classifier` head.
#[derive(Debug, Clone)]
pub struct DistilBertForSequenceClassification {
    distilbert: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
}

impl DistilBertForSequenceClassification {
    pub fn load(vb: VarBuilder, config: &Config, num_labels: usize) -> Result<Self> {
        let distilbert = DistilBertModel::load(vb.pp(&config.model_type), config)?;
        let pre_classifier = linear(config.dim, config.dim, vb.pp("pre_classifier"))?;
        let classifier = linear(config.dim, num_labels, vb.pp("classifier"))?;

        Ok(Self {
            distilbert,
            pre_classifier,
            classifier,
        })
    }

    /// Returns classification logits of shape `(batch, num_labels)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let hidden_states = self.distilbert.forward(input_ids, attention_mask)?;

        hidden_states
            .i((.., 0))?
            .apply(&self.pre_classifier)?
            .relu()?
            .apply(&self.classifier)
    }
}

/*
Pipeline Implementation
*/

use super::{encode_input, labels::Labels};
use crate::error::Result as PipelineResult;
use crate::loaders::{ConfigLoader, TokenizerLoader, WeightsLoader};
use crate::pipelines::sentiment::{Prediction, SentimentAnalysisModel};
use tokenizers::Tokenizer;

/// Available DistilBERT sentiment checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistilBertSize {
    #[default]
    Base,
}

impl DistilBertSize {
    pub fn repo_id(&self) -> &'static str {
        match self {
            DistilBertSize::Base => "distilbert/distilbert-base-uncased-finetuned-sst-2-english",
        }
    }
}

/// Sentiment analysis model using DistilBERT.
#[derive(Clone)]
pub struct SentimentDistilBertModel {
    model: DistilBertForSequenceClassification,
    device: Device,
    labels: Labels,
    max_position_embeddings: usize,
}

impl SentimentDistilBertModel {
    pub fn new(size: DistilBertSize, revision: &str, device: Device) -> PipelineResult<Self> {
        let repo_id = size.repo_id();

        let config: Config = ConfigLoader::new(repo_id, "config.json")
            .with_revision(revision)
            .load()?;
        config.validate()?;
        let labels = Labels::from_id2label(&config.id2label)?;

        let vb = WeightsLoader::new(repo_id)
            .with_revision(revision)
            .load(&device)?;
        let model = DistilBertForSequenceClassification::load(vb, &config, labels.len())?;

        Ok(Self {
            model,
            device,
            labels,
            max_position_embeddings: config.max_position_embeddings,
        })
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

impl SentimentAnalysisModel for SentimentDistilBertModel {
    type Options = DistilBertSize;

    fn new(options: Self::Options, revision: &str, device: Device) -> PipelineResult<Self> {
        SentimentDistilBertModel::new(options, revision, device)
    }

    fn predict_with_score(&self, tokenizer: &Tokenizer, text: &str) -> PipelineResult<Prediction> {
        let (input_ids, attention_mask) =
            encode_input(tokenizer, text, self.max_position_embeddings, &self.device)?;
        let logits = self.model.forward(&input_ids, &attention_mask)?;
        self.labels.top_prediction(&logits)
    }

    fn get_tokenizer(options: Self::Options, revision: &str) -> PipelineResult<Tokenizer> {
        TokenizerLoader::new(options.repo_id())
            .with_revision(revision)
            .load()
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn tiny_config() -> Config {
        serde_json::from_str(
            r#"{
                "vocab_size": 32,
                "dim": 8,
                "n_layers": 2,
                "n_heads": 2,
                "hidden_dim": 16,
                "activation": "gelu",
                "max_position_embeddings": 16,
                "pad_token_id": 0,
                "model_type": "distilbert",
                "id2label": {"0": "NEGATIVE", "1": "POSITIVE"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn config_defaults_missing_fields() {
        let config: Config = serde_json::from_str(
            r#"{"vocab_size": 10, "dim": 4, "n_layers": 1, "n_heads": 1,
                "hidden_dim": 8, "max_position_embeddings": 4}"#,
        )
        .unwrap();
        assert_eq!(config.activation, HiddenAct::Gelu);
        assert_eq!(config.model_type, "distilbert");
        assert!(config.id2label.is_empty());
    }

    #[test]
    fn validate_rejects_bad_head_counts() {
        let mut config = tiny_config();
        assert!(config.validate().is_ok());

        config.n_heads = 0;
        assert!(matches!(config.validate(), Err(crate::error::Error::ModelMetadata(_))));

        config.n_heads = 3;
        assert!(matches!(config.validate(), Err(crate::error::Error::ModelMetadata(_))));

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(DistilBertModel::load(vb, &config).is_err());
    }

    #[test]
    fn classification_forward_yields_one_logit_per_label() -> Result<()> {
        let config = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = DistilBertForSequenceClassification::load(vb, &config, 2)?;

        let input_ids = Tensor::new(&[[2u32, 7, 9, 3]], &Device::Cpu)?;
        let attention_mask = Tensor::new(&[[1u32, 1, 1, 1]], &Device::Cpu)?;
        let logits = model.forward(&input_ids, &attention_mask)?;

        assert_eq!(logits.dims(), &[1, 2]);
        Ok(())
    }

    #[test]
    fn padding_does_not_change_the_prediction() -> Result<()> {
        let config = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = DistilBertForSequenceClassification::load(vb, &config, 2)?;

        let plain = model.forward(
            &Tensor::new(&[[2u32, 7, 9, 3]], &Device::Cpu)?,
            &Tensor::new(&[[1u32, 1, 1, 1]], &Device::Cpu)?,
        )?;
        let padded = model.forward(
            &Tensor::new(&[[2u32, 7, 9, 3, 0, 0]], &Device::Cpu)?,
            &Tensor::new(&[[1u32, 1, 1, 1, 0, 0]], &Device::Cpu)?,
        )?;

        let diff = (plain - padded)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert!(diff < 1e-4, "padding shifted logits by {diff}");
        Ok(())
    }
}
