//! kmcqa - main CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};

use kmcqa::cli::{Args, Commands, Verbosity};
use kmcqa::data::export::{write_jsonl, SplitInfo, TrainerManifest};
use kmcqa::data::{
    format_records, load_csv, DatasetBuilder, DatasetMode, ExampleFormatter, MultipleChoiceDataset,
};
use kmcqa::hub::ModelFiles;
use kmcqa::inference::output::{write_decoded, write_predictions, DECODED_FILE, SUBMISSION_FILE};
use kmcqa::inference::{accuracy, preview, InferenceEngine, Qwen2Lm, Strategy};
use kmcqa::rag::Augmenter;
use kmcqa::tokenizer::ChatTokenizer;
use kmcqa::PipelineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();
    kmcqa::logging::init(verbosity);

    let mut config =
        PipelineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.no_rag {
        config = config.without_rag();
    }

    match args.command {
        Commands::Prepare { output } => {
            let output = output.unwrap_or_else(|| config.output_dir());
            prepare(&config, &output, verbosity).await?;
        }
        Commands::Format {
            input,
            mode,
            output,
        } => {
            let input = input.unwrap_or_else(|| config.data.test_file());
            format(&config, &input, mode.into(), output.as_deref(), verbosity).await?;
        }
        Commands::Infer {
            strategy,
            input,
            model,
            output,
        } => {
            let input = input.unwrap_or_else(|| config.data.test_file());
            let model = model.unwrap_or_else(|| config.model.model_path.clone());
            let output = output.unwrap_or_else(|| config.output_dir());
            infer(&config, strategy, &input, &model, &output, verbosity).await?;
        }
        Commands::Evaluate {
            predictions,
            labels,
        } => {
            let labels = labels.unwrap_or_else(|| config.data.eval_file());
            evaluate(&predictions, &labels)?;
        }
    }

    Ok(())
}

fn load_tokenizer(model: &str) -> Result<ChatTokenizer> {
    let files = ModelFiles::resolve(model).context("Failed to resolve model files")?;
    ChatTokenizer::from_model_files(&files)
        .with_context(|| format!("Failed to load tokenizer for {}", model))
}

/// Retrieval models for one dataset pass, when augmentation is enabled
async fn load_augmenter(config: &PipelineConfig) -> Result<Option<Augmenter>> {
    if !config.rag.enabled {
        return Ok(None);
    }
    Augmenter::load_optional(&config.rag, config.model.seed)
        .await
        .context("Failed to load retrieval models")
}

/// Load a CSV and build one dataset split with its own augmenter
async fn build_split(
    config: &PipelineConfig,
    tokenizer: &ChatTokenizer,
    path: &Path,
    mode: DatasetMode,
    verbosity: Verbosity,
) -> Result<(MultipleChoiceDataset, usize)> {
    let report = load_csv(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let load_skipped = report.skipped.len();

    let builder = DatasetBuilder::new(config, tokenizer, mode).with_progress(verbosity.show_progress());
    let augmenter = load_augmenter(config).await?;
    let dataset = builder
        .build(&report.records, augmenter)
        .await
        .with_context(|| format!("Failed to build dataset from {}", path.display()))?;

    Ok((dataset, load_skipped))
}

async fn prepare(config: &PipelineConfig, output: &Path, verbosity: Verbosity) -> Result<()> {
    let tokenizer = load_tokenizer(&config.model.model_path)?;

    let mut splits = Vec::new();
    for (name, path) in [("train", config.data.train_file()), ("eval", config.data.eval_file())] {
        let (dataset, load_skipped) =
            build_split(config, &tokenizer, &path, DatasetMode::Train, verbosity).await?;

        let jsonl = output.join(format!("{}.jsonl", name));
        let written = write_jsonl(&jsonl, dataset.tokenized()).context("Failed to write dataset")?;
        splits.push(SplitInfo {
            path: jsonl,
            examples: written,
            skipped: load_skipped + dataset.skipped().len(),
        });
    }

    let eval = splits.pop().context("eval split missing")?;
    let train = splits.pop().context("train split missing")?;
    let manifest = TrainerManifest::new(config, tokenizer.pad_id(), train, eval);
    let manifest_path = manifest.write(output).context("Failed to write trainer manifest")?;

    if verbosity.show_progress() {
        println!("\n{}", "Datasets prepared".green().bold());
        for split in [&manifest.train, &manifest.eval] {
            println!(
                "  {} {} examples ({} skipped)",
                split.path.display().to_string().cyan(),
                split.examples,
                split.skipped.to_string().yellow()
            );
        }
        println!("  {} {}", "Manifest:".dimmed(), manifest_path.display());
        println!("  {} {}", "Run id:".dimmed(), manifest.run_id);
    }
    Ok(())
}

async fn format(
    config: &PipelineConfig,
    input: &Path,
    mode: DatasetMode,
    output: Option<&Path>,
    verbosity: Verbosity,
) -> Result<()> {
    let report = load_csv(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let formatter = ExampleFormatter::new(config, mode);
    let augmenter = load_augmenter(config).await?;
    let formatted = format_records(&formatter, &report.records, augmenter, verbosity.show_progress()).await;

    match output {
        Some(path) => {
            write_jsonl(path, &formatted.examples).context("Failed to write examples")?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for example in &formatted.examples {
                serde_json::to_writer(&mut out, example)?;
                writeln!(out)?;
            }
        }
    }

    if verbosity.show_progress() {
        eprintln!(
            "{} {} examples, {} skipped",
            "Formatted".green().bold(),
            formatted.examples.len(),
            (report.skipped.len() + formatted.skipped.len()).to_string().yellow()
        );
        if let Some(stats) = &formatted.augment_stats {
            eprintln!(
                "  {} {} of {} triggered",
                "Augmented:".dimmed(),
                stats.augmented,
                stats.triggered
            );
        }
    }
    Ok(())
}

async fn infer(
    config: &PipelineConfig,
    strategy: Strategy,
    input: &Path,
    model: &str,
    output: &Path,
    verbosity: Verbosity,
) -> Result<()> {
    let tokenizer = load_tokenizer(model)?;
    let (dataset, _) = build_split(config, &tokenizer, input, DatasetMode::Eval, verbosity).await?;

    if strategy == Strategy::Preview {
        let stdout = std::io::stdout();
        preview(&tokenizer, dataset.examples(), &mut stdout.lock())?;
        return Ok(());
    }

    let lm = Qwen2Lm::load(model).with_context(|| format!("Failed to load model {}", model))?;
    let mut engine = InferenceEngine::new(
        Box::new(lm),
        &tokenizer,
        config.model.generation_top_k,
        config.model.seed,
    )
    .with_progress(verbosity.show_progress());

    let submission = output.join(SUBMISSION_FILE);
    let mut written: Vec<PathBuf> = vec![submission.clone()];
    match strategy {
        Strategy::Generate => {
            let predictions = engine.generate(dataset.examples()).context("Generation failed")?;
            write_predictions(&submission, &predictions)?;
        }
        Strategy::Score => {
            let scored = engine.score(dataset.examples()).context("Scoring failed")?;
            write_predictions(&submission, &scored.predictions)?;
            let decoded = output.join(DECODED_FILE);
            write_decoded(&decoded, &scored.decoded)?;
            written.push(decoded);
        }
        Strategy::Preview => {}
    }

    if verbosity.show_progress() {
        println!("\n{} {} records", "Inference complete:".green().bold(), dataset.len());
        for path in written {
            println!("  {}", path.display().to_string().cyan());
        }
    }
    Ok(())
}

fn evaluate(predictions: &Path, labels: &Path) -> Result<()> {
    let rows = kmcqa::inference::output::read_predictions(predictions)
        .with_context(|| format!("Failed to read {}", predictions.display()))?;
    let report = load_csv(labels).with_context(|| format!("Failed to read {}", labels.display()))?;
    let result = accuracy(&rows, &report.records);

    println!(
        "{} {:.4} ({}/{})",
        "Accuracy:".green().bold(),
        result.accuracy,
        result.correct,
        result.scored
    );
    if result.unmatched > 0 {
        println!(
            "  {} {} predictions had no labelled record",
            "Warning:".yellow(),
            result.unmatched
        );
    }
    Ok(())
}
