//! Sentence-level sentiment classification with pretrained transformer
//! checkpoints from the Hugging Face Hub, running on `candle`.
//!
//! The [`pipelines::sentiment`] module is the entry point; the `sentiment`
//! binary wraps it in a one-shot command line tool.

pub mod cli;
pub mod error;
pub mod loaders;
pub mod models;
pub mod pipelines;

pub use error::{Error, Result};
pub use models::{ModernBertSize, SentimentModel};
pub use pipelines::sentiment::{
    Polarity, Prediction, SentimentAnalysisPipeline, SentimentAnalysisPipelineBuilder,
};
