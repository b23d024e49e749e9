use super::model::SentimentAnalysisModel;
use super::pipeline::SentimentAnalysisPipeline;
use crate::error::Result;
use crate::loaders::DEFAULT_REVISION;
use crate::models::{
    AutoSentimentModel, DistilBertSize, ModernBertSize, SentimentDistilBertModel, SentimentModel,
    SentimentModernBertModel,
};
use crate::pipelines::utils::{device_name, DeviceRequest};
use std::time::Instant;

pub struct SentimentAnalysisPipelineBuilder<M: SentimentAnalysisModel> {
    options: M::Options,
    device_request: DeviceRequest,
    revision: String,
}

impl<M: SentimentAnalysisModel> SentimentAnalysisPipelineBuilder<M> {
    pub fn new(options: M::Options) -> Self {
        Self {
            options,
            device_request: DeviceRequest::Default,
            revision: DEFAULT_REVISION.to_string(),
        }
    }

    pub fn cpu(mut self) -> Self {
        self.device_request = DeviceRequest::Cpu;
        self
    }

    pub fn cuda(mut self, index: usize) -> Self {
        self.device_request = DeviceRequest::Cuda(index);
        self
    }

    pub fn device(mut self, device: candle_core::Device) -> Self {
        self.device_request = DeviceRequest::Explicit(device);
        self
    }

    /// Pins the Hub revision (branch, tag or commit) to download from.
    pub fn revision(mut self, revision: &str) -> Self {
        self.revision = revision.to_string();
        self
    }

    pub fn build(self) -> Result<SentimentAnalysisPipeline<M>> {
        let device = self.device_request.resolve()?;
        tracing::info!(
            model = ?self.options,
            revision = %self.revision,
            device = %device_name(&device),
            "loading sentiment model"
        );

        let start = Instant::now();
        let model = M::new(self.options.clone(), &self.revision, device)?;
        let tokenizer = M::get_tokenizer(self.options, &self.revision)?;
        tracing::debug!(elapsed = ?start.elapsed(), "sentiment model ready");

        Ok(SentimentAnalysisPipeline { model, tokenizer })
    }
}

impl SentimentAnalysisPipelineBuilder<SentimentDistilBertModel> {
    pub fn distilbert() -> Self {
        Self::new(DistilBertSize::Base)
    }
}

impl SentimentAnalysisPipelineBuilder<SentimentModernBertModel> {
    pub fn modernbert(size: ModernBertSize) -> Self {
        Self::new(size)
    }
}

impl SentimentAnalysisPipelineBuilder<AutoSentimentModel> {
    /// Picks the architecture from a runtime model choice.
    pub fn for_model(model: SentimentModel) -> Self {
        Self::new(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_main_and_auto_device() {
        let builder = SentimentAnalysisPipelineBuilder::distilbert();
        assert_eq!(builder.revision, DEFAULT_REVISION);
        assert!(matches!(builder.device_request, DeviceRequest::Default));
    }

    #[test]
    fn builder_records_overrides() {
        let builder = SentimentAnalysisPipelineBuilder::for_model(SentimentModel::ModernBertLarge)
            .cuda(1)
            .revision("v1.0");
        assert_eq!(builder.options, SentimentModel::ModernBertLarge);
        assert_eq!(builder.revision, "v1.0");
        assert!(matches!(builder.device_request, DeviceRequest::Cuda(1)));

        let builder = SentimentAnalysisPipelineBuilder::modernbert(ModernBertSize::Base).cpu();
        assert!(matches!(builder.device_request, DeviceRequest::Cpu));
    }
}
