use crate::error::{Error, Result};
use crate::pipelines::sentiment::Prediction;
use candle_core::{DType, Tensor, D};
use candle_nn::ops::softmax;
use std::collections::HashMap;

/// Class labels of a classification checkpoint, indexed by class id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    labels: Vec<String>,
}

impl Labels {
    /// Builds the table from a config's `id2label` map.
    ///
    /// The keys must be exactly the ids `0..n`.
    pub fn from_id2label(id2label: &HashMap<String, String>) -> Result<Self> {
        if id2label.is_empty() {
            return Err(Error::ModelMetadata(
                "id2label is empty, the checkpoint defines no classes".into(),
            ));
        }

        let mut labels = vec![None; id2label.len()];
        for (id, label) in id2label {
            let index: usize = id
                .parse()
                .map_err(|_| Error::ModelMetadata(format!("id2label key `{id}` is not a class id")))?;
            let slot = labels.get_mut(index).ok_or_else(|| {
                Error::ModelMetadata(format!(
                    "id2label key {index} is out of range for {} classes",
                    id2label.len()
                ))
            })?;
            *slot = Some(label.clone());
        }

        // Keys like "0" and "00" land in the same slot and leave another empty.
        let labels = labels
            .into_iter()
            .enumerate()
            .map(|(id, label)| {
                label.ok_or_else(|| Error::ModelMetadata(format!("id2label has no label for class {id}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Picks the most probable class from `(1, num_labels)` or `(num_labels,)` logits.
    pub fn top_prediction(&self, logits: &Tensor) -> Result<Prediction> {
        let logits = match logits.rank() {
            2 => logits.squeeze(0)?,
            _ => logits.clone(),
        };
        let probs = softmax(&logits.to_dtype(DType::F32)?, D::Minus1)?.to_vec1::<f32>()?;

        if probs.len() != self.labels.len() {
            return Err(Error::ModelMetadata(format!(
                "model produced {} logits but id2label names {} classes",
                probs.len(),
                self.labels.len()
            )));
        }

        if probs.iter().any(|p| !p.is_finite()) {
            return Err(Error::InvalidPrediction(format!(
                "model produced non-finite class probabilities {probs:?}"
            )));
        }

        let (pred_id, score) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (id, p)| {
                if p > best.1 {
                    (id, p)
                } else {
                    best
                }
            });

        let label = self.labels[pred_id].clone();
        tracing::debug!(%label, score, "classified");

        Ok(Prediction { label, score })
    }
}
