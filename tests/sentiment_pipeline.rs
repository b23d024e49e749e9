// Integration tests for the sentiment analysis pipeline.
// These download checkpoints from the Hugging Face Hub: run with `cargo test -- --ignored`.

use sentiment::pipelines::sentiment::*;

#[test]
#[ignore = "downloads the DistilBERT SST-2 checkpoint"]
fn distilbert_scores_obvious_sentiment() -> anyhow::Result<()> {
    let pipeline = SentimentAnalysisPipelineBuilder::distilbert().cpu().build()?;

    let positive = pipeline.predict("I absolutely love this, it is wonderful!")?;
    assert_eq!(positive.label, "POSITIVE");
    assert!((0.5..=1.0).contains(&positive.score));
    assert_eq!(positive.polarity(), Some(Polarity::Positive));

    let negative = pipeline.predict("This is terrible, I hate it.")?;
    assert_eq!(negative.label, "NEGATIVE");
    assert!((0.5..=1.0).contains(&negative.score));
    Ok(())
}

#[test]
#[ignore = "downloads the DistilBERT SST-2 checkpoint"]
fn output_line_parses_back() -> anyhow::Result<()> {
    let pipeline = SentimentAnalysisPipelineBuilder::for_model(SentimentModel::default())
        .cpu()
        .build()?;

    let prediction = pipeline.predict("")?;
    let labels: Vec<&str> = pipeline.model().labels().iter().collect();
    assert!(labels.contains(&prediction.label.as_str()));

    let parsed: Prediction = prediction.to_string().parse()?;
    assert_eq!(parsed, prediction);
    Ok(())
}

#[test]
#[ignore = "downloads the DistilBERT SST-2 checkpoint"]
fn over_long_input_is_rejected() -> anyhow::Result<()> {
    let pipeline = SentimentAnalysisPipelineBuilder::distilbert().cpu().build()?;

    let text = "good ".repeat(1000);
    match pipeline.predict(&text) {
        Err(sentiment::Error::InputTooLong { tokens, max }) => assert!(tokens > max),
        other => panic!("expected InputTooLong, got {other:?}"),
    }
    Ok(())
}

#[test]
#[ignore = "downloads the ModernBERT base sentiment checkpoint"]
fn modernbert_label_comes_from_its_label_set() -> anyhow::Result<()> {
    let pipeline = SentimentAnalysisPipelineBuilder::modernbert(ModernBertSize::Base)
        .cpu()
        .build()?;

    let prediction = pipeline.predict("I love Rust!")?;
    let labels: Vec<&str> = pipeline.model().labels().iter().collect();
    assert!(labels.contains(&prediction.label.as_str()));
    assert!((0.0..=1.0).contains(&prediction.score));
    Ok(())
}
