use anyhow::Context;
use sentiment::cli::{init_tracing, Args, HELP};
use sentiment::pipelines::sentiment::SentimentAnalysisPipelineBuilder;

fn main() -> anyhow::Result<()> {
    let Some(args) = Args::parse()? else {
        print!("{HELP}");
        return Ok(());
    };

    init_tracing()?;

    let mut builder = SentimentAnalysisPipelineBuilder::for_model(args.model);
    if args.cpu {
        builder = builder.cpu();
    }
    if let Some(index) = args.cuda {
        builder = builder.cuda(index);
    }
    if let Some(revision) = &args.revision {
        builder = builder.revision(revision);
    }

    let pipeline = builder
        .build()
        .context("failed to build the sentiment pipeline")?;
    let prediction = pipeline
        .predict(&args.text)
        .context("failed to classify input")?;

    println!("{prediction}");

    Ok(())
}
