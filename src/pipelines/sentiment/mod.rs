//! Sentiment analysis pipeline for classifying the emotional tone of text.
//!
//! ## Main Types
//!
//! - [`SentimentAnalysisPipeline`] - tokenizes, runs the model and picks the top label
//! - [`SentimentAnalysisPipelineBuilder`] - chooses checkpoint, device and Hub revision
//! - [`SentimentAnalysisModel`] - trait implemented by the classification models
//! - [`Prediction`] - label and softmax score, printed as `<label> <score>`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use sentiment::pipelines::sentiment::*;
//!
//! let pipeline = SentimentAnalysisPipelineBuilder::distilbert().cpu().build()?;
//!
//! let prediction = pipeline.predict("I love this product!")?;
//! println!("{prediction}");
//! # Ok::<(), sentiment::Error>(())
//! ```

pub mod builder;
pub mod model;
pub mod pipeline;

pub use builder::SentimentAnalysisPipelineBuilder;
pub use model::SentimentAnalysisModel;
pub use pipeline::{Polarity, Prediction, SentimentAnalysisPipeline};

pub use crate::models::{ModernBertSize, SentimentModel};
