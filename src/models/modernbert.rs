//! ModernBERT encoder with a sequence-classification head.
//!
//! ModernBERT is a modernized bidirectional encoder:
//! - rotary position embeddings instead of learned positions
//! - every `global_attn_every_n_layers`-th layer attends globally, the rest
//!   use a sliding window of `local_attention` tokens
//! - GeGLU feed-forward blocks and bias-free LayerNorm
//!
//! The classification head pools the final hidden states (`[CLS]` token or
//! masked mean) and runs them through `dense -> GELU -> norm -> classifier`.

use candle_core::{DType, Device, IndexOp, Result, Tensor, D};
use candle_nn::{
    embedding, layer_norm_no_bias, linear, linear_no_bias, ops::softmax, Embedding, LayerNorm,
    Linear, Module, VarBuilder,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const NEG_INF: f32 = f32::NEG_INFINITY;
const DEFAULT_NORM_EPS: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub max_position_embeddings: usize,
    // Checkpoints name the epsilon either way.
    #[serde(default)]
    pub layer_norm_eps: Option<f64>,
    #[serde(default)]
    pub norm_eps: Option<f64>,
    pub pad_token_id: u32,
    pub global_attn_every_n_layers: usize,
    pub global_rope_theta: f64,
    pub local_attention: usize,
    pub local_rope_theta: f64,
    #[serde(default)]
    pub classifier_pooling: ClassifierPooling,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
}

impl Config {
    pub fn eps(&self) -> f64 {
        self.layer_norm_eps
            .or(self.norm_eps)
            .unwrap_or(DEFAULT_NORM_EPS)
    }

    /// Rejects shapes the encoder cannot be built from.
    pub fn validate(&self) -> std::result::Result<(), crate::error::Error> {
        let invalid = |msg: String| Err(crate::error::Error::ModelMetadata(msg));

        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return invalid(format!(
                "hidden_size {} is not divisible into {} attention heads",
                self.hidden_size, self.num_attention_heads
            ));
        }
        if (self.hidden_size / self.num_attention_heads) % 2 != 0 {
            return invalid(format!(
                "rotary embeddings need an even head size, got {}",
                self.hidden_size / self.num_attention_heads
            ));
        }
        if self.global_attn_every_n_layers == 0 {
            return invalid("global_attn_every_n_layers must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierPooling {
    Cls,
    #[default]
    Mean,
}

/// Rotary position embedding tables for one `rope_theta`.
#[derive(Debug, Clone)]
struct RotaryEmbedding {
    sin: Tensor,
    cos: Tensor,
}

impl RotaryEmbedding {
    fn new(dtype: DType, config: &Config, rope_theta: f64, device: &Device) -> Result<Self> {
        let dim = config.hidden_size / config.num_attention_heads;
        let inv_freq: Vec<f32> = (0..dim)
            .step_by(2)
            .map(|i| (1.0 / rope_theta.powf(i as f64 / dim as f64)) as f32)
            .collect();

        let inv_freq_len = inv_freq.len();
        let inv_freq = Tensor::from_vec(inv_freq, (1, inv_freq_len), device)?.to_dtype(dtype)?;
        let max_seq_len = config.max_position_embeddings;
        let positions = Tensor::arange(0u32, max_seq_len as u32, device)?
            .to_dtype(dtype)?
            .reshape((max_seq_len, 1))?;
        let angles = positions.matmul(&inv_freq)?;

        Ok(Self {
            sin: angles.sin()?,
            cos: angles.cos()?,
        })
    }

    fn apply(&self, q: &Tensor, k: &Tensor) -> Result<(Tensor, Tensor)> {
        let seq_len = q.dim(2)?;
        let cos = self.cos.narrow(0, 0, seq_len)?;
        let sin = self.sin.narrow(0, 0, seq_len)?;

        let q_embed = candle_nn::rotary_emb::rope(&q.contiguous()?, &cos, &sin)?;
        let k_embed = candle_nn::rotary_emb::rope(&k.contiguous()?, &cos, &sin)?;
        Ok((q_embed, k_embed))
    }
}

#[derive(Debug, Clone)]
struct Attention {
    wqkv: Linear,
    wo: Linear,
    num_heads: usize,
    head_dim: usize,
    rotary: Arc<RotaryEmbedding>,
}

impl Attention {
    fn load(vb: VarBuilder, config: &Config, rotary: Arc<RotaryEmbedding>) -> Result<Self> {
        let hidden_size = config.hidden_size;

        Ok(Self {
            wqkv: linear_no_bias(hidden_size, hidden_size * 3, vb.pp("Wqkv"))?,
            wo: linear_no_bias(hidden_size, hidden_size, vb.pp("Wo"))?,
            num_heads: config.num_attention_heads,
            head_dim: hidden_size / config.num_attention_heads,
            rotary,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, hidden_size) = hidden_states.dims3()?;

        // (3, batch, heads, seq, head_dim)
        let qkv = hidden_states
            .apply(&self.wqkv)?
            .reshape((batch, seq_len, 3, self.num_heads, self.head_dim))?
            .permute((2, 0, 3, 1, 4))?;

        let (q, k) = self.rotary.apply(&qkv.get(0)?, &qkv.get(1)?)?;
        let v = qkv.get(2)?.contiguous()?;

        let q = (q * (self.head_dim as f64).powf(-0.5))?;
        let scores = q.matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)?;
        let probs = softmax(&scores.broadcast_add(attention_mask)?, D::Minus1)?;

        probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, hidden_size))?
            .apply(&self.wo)
    }
}

/// GeGLU feed-forward block.
#[derive(Debug, Clone)]
struct Mlp {
    wi: Linear,
    wo: Linear,
}

impl Mlp {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            wi: linear_no_bias(config.hidden_size, config.intermediate_size * 2, vb.pp("Wi"))?,
            wo: linear_no_bias(config.intermediate_size, config.hidden_size, vb.pp("Wo"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.apply(&self.wi)?;
        let chunks = xs.chunk(2, D::Minus1)?;
        (&chunks[0].gelu_erf()? * &chunks[1])?.apply(&self.wo)
    }
}

#[derive(Debug, Clone)]
struct EncoderLayer {
    attn: Attention,
    mlp: Mlp,
    // The first layer has no attention norm.
    attn_norm: Option<LayerNorm>,
    mlp_norm: LayerNorm,
    sliding_window: bool,
}

impl EncoderLayer {
    fn load(
        vb: VarBuilder,
        config: &Config,
        rotary: Arc<RotaryEmbedding>,
        layer_idx: usize,
        sliding_window: bool,
    ) -> Result<Self> {
        let attn_norm = if layer_idx == 0 {
            None
        } else {
            Some(layer_norm_no_bias(config.hidden_size, config.eps(), vb.pp("attn_norm"))?)
        };

        Ok(Self {
            attn: Attention::load(vb.pp("attn"), config, rotary)?,
            mlp: Mlp::load(vb.pp("mlp"), config)?,
            attn_norm,
            mlp_norm: layer_norm_no_bias(config.hidden_size, config.eps(), vb.pp("mlp_norm"))?,
            sliding_window,
        })
    }

    fn forward(&self, hidden_states: &Tensor, global_mask: &Tensor, window_mask: &Tensor) -> Result<Tensor> {
        let normed = match &self.attn_norm {
            Some(norm) => hidden_states.apply(norm)?,
            None => hidden_states.clone(),
        };

        let attn_output = if self.sliding_window {
            self.attn.forward(&normed, &global_mask.broadcast_add(window_mask)?)?
        } else {
            self.attn.forward(&normed, global_mask)?
        };
        let hidden_states = (hidden_states + attn_output)?;

        let mlp_output = hidden_states.apply(&self.mlp_norm)?.apply(&self.mlp)?;
        hidden_states + mlp_output
    }
}

/// The ModernBERT encoder stack, from token embeddings to the final norm.
#[derive(Debug, Clone)]
pub struct ModernBertModel {
    tok_embeddings: Embedding,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    final_norm: LayerNorm,
    local_attention: usize,
    device: Device,
    dtype: DType,
}

impl ModernBertModel {
    pub fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;

        let tok_embeddings = embedding(
            config.vocab_size,
            config.hidden_size,
            vb.pp("embeddings.tok_embeddings"),
        )?;
        let embedding_norm =
            layer_norm_no_bias(config.hidden_size, config.eps(), vb.pp("embeddings.norm"))?;

        let global_rotary = Arc::new(RotaryEmbedding::new(
            vb.dtype(),
            config,
            config.global_rope_theta,
            vb.device(),
        )?);
        let local_rotary = Arc::new(RotaryEmbedding::new(
            vb.dtype(),
            config,
            config.local_rope_theta,
            vb.device(),
        )?);

        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for layer_idx in 0..config.num_hidden_layers {
            let sliding_window = layer_idx % config.global_attn_every_n_layers != 0;
            let rotary = if sliding_window {
                local_rotary.clone()
            } else {
                global_rotary.clone()
            };

            layers.push(EncoderLayer::load(
                vb.pp(format!("layers.{layer_idx}")),
                config,
                rotary,
                layer_idx,
                sliding_window,
            )?);
        }

        let final_norm = layer_norm_no_bias(config.hidden_size, config.eps(), vb.pp("final_norm"))?;

        Ok(Self {
            tok_embeddings,
            embedding_norm,
            layers,
            final_norm,
            local_attention: config.local_attention,
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    /// Additive `(batch, 1, seq, seq)` mask: 0 where attended, `f32::MIN` on padding.
    fn global_attention_mask(&self, attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len) = attention_mask.dims2()?;

        attention_mask
            .unsqueeze(1)?
            .unsqueeze(2)?
            .expand((batch, 1, seq_len, seq_len))?
            .to_dtype(self.dtype)?
            .affine(-1.0, 1.0)?
            .affine(f32::MIN as f64, 0.0)
    }

    /// `(seq, seq)` mask hiding tokens further than half the window away.
    fn sliding_window_mask(&self, seq_len: usize) -> Result<Tensor> {
        let max_distance = self.local_attention / 2;
        let mask: Vec<f32> = (0..seq_len)
            .flat_map(|i| {
                (0..seq_len).map(move |j| if i.abs_diff(j) > max_distance { NEG_INF } else { 0.0 })
            })
            .collect();

        Tensor::from_slice(&mask, (seq_len, seq_len), &self.device)?.to_dtype(self.dtype)
    }

    /// Returns hidden states of shape `(batch, seq, hidden_size)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let seq_len = input_ids.dim(1)?;
        let global_mask = self.global_attention_mask(attention_mask)?;
        let window_mask = self.sliding_window_mask(seq_len)?;

        let mut hidden_states = input_ids
            .apply(&self.tok_embeddings)?
            .apply(&self.embedding_norm)?;
        for layer in &self.layers {
            hidden_states = layer.forward(&hidden_states, &global_mask, &window_mask)?;
        }

        hidden_states.apply(&self.final_norm)
    }
}

#[derive(Debug, Clone)]
struct ClassificationHead {
    dense: Linear,
    norm: LayerNorm,
    classifier: Linear,
    pooling: ClassifierPooling,
}

impl ClassificationHead {
    fn load(vb: VarBuilder, config: &Config, num_labels: usize) -> Result<Self> {
        Ok(Self {
            dense: linear_no_bias(config.hidden_size, config.hidden_size, vb.pp("head.dense"))?,
            norm: layer_norm_no_bias(config.hidden_size, config.eps(), vb.pp("head.norm"))?,
            classifier: linear(config.hidden_size, num_labels, vb.pp("classifier"))?,
            pooling: config.classifier_pooling,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let pooled = match self.pooling {
            ClassifierPooling::Cls => hidden_states.i((.., 0))?,
            ClassifierPooling::Mean => {
                let mask = attention_mask.to_dtype(hidden_states.dtype())?;
                let summed = hidden_states
                    .broadcast_mul(&mask.unsqueeze(D::Minus1)?)?
                    .sum(1)?;
                summed.broadcast_div(&mask.sum_keepdim(1)?)?
            }
        };

        pooled
            .apply(&self.dense)?
            .gelu_erf()?
            .apply(&self.norm)?
            .apply(&self.classifier)
    }
}

/// ModernBERT with its pooled classification head.
#[derive(Debug, Clone)]
pub struct ModernBertForSequenceClassification {
    model: ModernBertModel,
    head: ClassificationHead,
}

impl ModernBertForSequenceClassification {
    pub fn load(vb: VarBuilder, config: &Config, num_labels: usize) -> Result<Self> {
        let model = ModernBertModel::load(vb.pp("model"), config)?;
        let head = ClassificationHead::load(vb, config, num_labels)?;
        Ok(Self { model, head })
    }

    /// Returns classification logits of shape `(batch, num_labels)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let hidden_states = self.model.forward(input_ids, attention_mask)?;
        self.head.forward(&hidden_states, attention_mask)
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

/// Available ModernBERT sentiment model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModernBertSize {
    Base,
    Large,
}

impl ModernBertSize {
    pub fn repo_id(&self) -> &'static str {
        match self {
            ModernBertSize::Base => "clapAI/modernBERT-base-multilingual-sentiment",
            ModernBertSize::Large => "clapAI/modernBERT-large-multilingual-sentiment",
        }
    }
}

impl std::fmt::Display for ModernBertSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModernBertSize::Base => "modernbert-base",
            ModernBertSize::Large => "modernbert-large",
        };
        write!(f, "{name}")
    }
}

/// Sentiment analysis model using ModernBERT.
#[derive(Clone)]
pub struct SentimentModernBertModel {
    model: ModernBertForSequenceClassification,
    device: Device,
    labels: Labels,
    max_position_embeddings: usize,
}

impl SentimentModernBertModel {
    pub fn new(size: ModernBertSize, revision: &str, device: Device) -> PipelineResult<Self> {
        let repo_id = size.repo_id();

        let config: Config = ConfigLoader::new(repo_id, "config.json")
            .with_revision(revision)
            .load()?;
        config.validate()?;
        let labels = Labels::from_id2label(&config.id2label)?;

        let vb = WeightsLoader::new(repo_id)
            .with_revision(revision)
            .load(&device)?;
        let model = ModernBertForSequenceClassification::load(vb, &config, labels.len())?;

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

impl SentimentAnalysisModel for SentimentModernBertModel {
    type Options = ModernBertSize;

    fn new(options: Self::Options, revision: &str, device: Device) -> PipelineResult<Self> {
        SentimentModernBertModel::new(options, revision, device)
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
