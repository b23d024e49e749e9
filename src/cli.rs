//! Command-line surface of the `sentiment` binary.

use crate::models::SentimentModel;
use pico_args::Arguments;
use std::ffi::OsString;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

pub const HELP: &str = "\
Classify the sentiment of a piece of text and print `<label> <score>`.

Usage: sentiment [OPTIONS] TEXT

Arguments:
  TEXT                 The text to classify (quote it to pass several words)

Options:
  -h, --help           Print help
  -m, --model NAME     The model to use: distilbert-sst2 (default), modernbert-base, modernbert-large
  --cpu                Run on the CPU even if a GPU (CUDA or Metal) is available
  --cuda N             Run on CUDA device N
  --revision REV       Hub revision (branch, tag or commit) to download (defaults to 'main')

Environment:
  RUST_LOG             Log filter for stderr output (defaults to 'warn')
  HF_HOME              Hugging Face cache directory
";

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("Missing required argument: TEXT")]
    MissingText,

    #[error("Unexpected arguments: {0:?} (quote the text to pass it as one argument)")]
    UnexpectedArguments(Vec<String>),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("--cpu and --cuda cannot be used together")]
    ConflictingDevices,

    #[error("Argument is not valid UTF-8: {0:?}")]
    NonUtf8(OsString),

    #[error(transparent)]
    Parse(#[from] pico_args::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub text: String,
    pub model: SentimentModel,
    pub cpu: bool,
    pub cuda: Option<usize>,
    pub revision: Option<String>,
}

impl Args {
    /// Parses the process arguments; `Ok(None)` means help was requested.
    pub fn parse() -> Result<Option<Self>, ArgsError> {
        Self::from_vec(std::env::args_os().skip(1).collect())
    }

    pub fn from_vec(mut args: Vec<OsString>) -> Result<Option<Self>, ArgsError> {
        // Everything after the first `--` is text, even if it looks like an option.
        let trailing = match args.iter().position(|arg| arg.as_os_str() == "--") {
            Some(idx) => {
                let trailing = args.split_off(idx + 1);
                args.truncate(idx);
                trailing
            }
            None => Vec::new(),
        };

        let mut pargs = Arguments::from_vec(args);

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let model = pargs
            .opt_value_from_str(["-m", "--model"])?
            .unwrap_or_default();
        let cpu = pargs.contains("--cpu");
        let cuda = pargs.opt_value_from_str("--cuda")?;
        let revision = pargs.opt_value_from_str("--revision")?;

        if cpu && cuda.is_some() {
            return Err(ArgsError::ConflictingDevices);
        }

        let mut rest = into_strings(pargs.finish())?;
        if let Some(unknown) = rest.iter().find(|arg| arg.starts_with("--")) {
            return Err(ArgsError::UnknownOption(unknown.clone()));
        }
        rest.extend(into_strings(trailing)?);

        let text = match rest.len() {
            0 => return Err(ArgsError::MissingText),
            1 => rest.remove(0),
            _ => return Err(ArgsError::UnexpectedArguments(rest)),
        };

        Ok(Some(Args {
            text,
            model,
            cpu,
            cuda,
            revision,
        }))
    }
}

fn into_strings(args: Vec<OsString>) -> Result<Vec<String>, ArgsError> {
    args.into_iter()
        .map(|arg| arg.into_string().map_err(ArgsError::NonUtf8))
        .collect()
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Stdout stays reserved for the result line.
pub fn init_tracing() -> anyhow::Result<()> {
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>, ArgsError> {
        Args::from_vec(args.iter().map(OsString::from).collect())
    }

    #[test]
    fn missing_text_is_an_error() {
        let err = parse(&[]).unwrap_err();
        assert!(matches!(err, ArgsError::MissingText));
        assert_eq!(err.to_string(), "Missing required argument: TEXT");

        assert!(matches!(parse(&["--cpu"]), Err(ArgsError::MissingText)));
    }

    #[test]
    fn single_text_uses_defaults() {
        let args = parse(&["I love this"]).unwrap().unwrap();
        assert_eq!(
            args,
            Args {
                text: "I love this".to_string(),
                model: SentimentModel::DistilBertSst2,
                cpu: false,
                cuda: None,
                revision: None,
            }
        );
    }

    #[test]
    fn empty_text_is_accepted() {
        let args = parse(&[""]).unwrap().unwrap();
        assert_eq!(args.text, "");
    }

    #[test]
    fn parses_every_option() {
        let args = parse(&["-m", "modernbert-large", "--cuda", "1", "--revision", "v2", "meh"])
            .unwrap()
            .unwrap();
        assert_eq!(args.model, SentimentModel::ModernBertLarge);
        assert_eq!(args.cuda, Some(1));
        assert_eq!(args.revision.as_deref(), Some("v2"));
        assert_eq!(args.text, "meh");

        let args = parse(&["great", "--model", "modernbert-base", "--cpu"])
            .unwrap()
            .unwrap();
        assert_eq!(args.model, SentimentModel::ModernBertBase);
        assert!(args.cpu);
    }

    #[test]
    fn help_wins_over_everything() {
        assert!(parse(&["-h"]).unwrap().is_none());
        assert!(parse(&["text", "--help", "--model", "nope"]).unwrap().is_none());
    }

    #[test]
    fn rejects_extra_positionals() {
        match parse(&["I", "love", "this"]) {
            Err(ArgsError::UnexpectedArguments(rest)) => assert_eq!(rest, ["I", "love", "this"]),
            other => panic!("expected UnexpectedArguments, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_option_values() {
        assert!(matches!(
            parse(&["--model", "gpt-9", "text"]),
            Err(ArgsError::Parse(_))
        ));
        assert!(matches!(
            parse(&["--cuda", "zero", "text"]),
            Err(ArgsError::Parse(_))
        ));
        assert!(matches!(
            parse(&["--cpu", "--cuda", "0", "text"]),
            Err(ArgsError::ConflictingDevices)
        ));
        assert!(matches!(
            parse(&["--verbose"]),
            Err(ArgsError::UnknownOption(_))
        ));
    }

    #[test]
    fn double_dash_passes_option_like_text() {
        let args = parse(&["--", "--not an option"]).unwrap().unwrap();
        assert_eq!(args.text, "--not an option");
    }

    #[test]
    fn options_after_double_dash_are_text() {
        let args = parse(&["--", "--cpu"]).unwrap().unwrap();
        assert_eq!(args.text, "--cpu");
        assert!(!args.cpu);

        assert_eq!(parse(&["--", "-h"]).unwrap().unwrap().text, "-h");
        assert_eq!(parse(&["--", "--model"]).unwrap().unwrap().text, "--model");

        let args = parse(&["--model", "modernbert-base", "--", "--", "x"]);
        assert!(matches!(args, Err(ArgsError::UnexpectedArguments(_))));

        let args = parse(&["--cpu", "--", "--help"]).unwrap().unwrap();
        assert!(args.cpu);
        assert_eq!(args.text, "--help");
    }

    #[test]
    fn double_dash_does_not_add_a_second_text() {
        match parse(&["hello", "--", "world"]) {
            Err(ArgsError::UnexpectedArguments(rest)) => assert_eq!(rest, ["hello", "world"]),
            other => panic!("expected UnexpectedArguments, got {other:?}"),
        }
        assert!(matches!(parse(&["--"]), Err(ArgsError::MissingText)));
    }
}
