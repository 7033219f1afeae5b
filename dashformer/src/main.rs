use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dashformer::config::{ActivationTables, RuntimeConfig};
use dashformer::model::read_model_parameters;
use dashformer::output::write_logits;
use dashformer::pipeline::Pipeline;
use dashformer::tokenizer::{read_one_hot_sequences, Tokenizer};

/// Privacy-preserving Dashformer inference over CKKS ciphertexts.
#[derive(Parser)]
#[clap(name = "dashformer", version)]
struct Args {
	/// Input sequences, one per line.
	#[clap(long, default_value = "data/example_AA_sequences.list")]
	sequences: PathBuf,

	/// Tokeniser JSON file.
	#[clap(long, default_value = "data/dashformer_tokenizer.json")]
	tokenizer: PathBuf,

	/// Directory with the model parameter files.
	#[clap(long, default_value = "data/dashformer_model_parameters")]
	model_dir: PathBuf,

	/// Directory the result file is written into.
	#[clap(long, default_value = "data/output")]
	output_dir: PathBuf,

	/// Width of the worker pool.
	#[clap(long, default_value_t = 4)]
	workers: usize,
}

impl From<Args> for RuntimeConfig {
	fn from(args: Args) -> Self {
		Self {
			sequences_path: args.sequences,
			tokenizer_path: args.tokenizer,
			model_dir: args.model_dir,
			output_dir: args.output_dir,
			workers: args.workers,
		}
	}
}

fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let config: RuntimeConfig = Args::parse().into();
	let started = Instant::now();

	let tokenizer = Tokenizer::from_file(&config.tokenizer_path)?;
	let sequences = read_one_hot_sequences(&config.sequences_path, &tokenizer)?;
	tracing::info!(
		sequences = sequences.len(),
		vocabulary = tokenizer.vocabulary_size(),
		"input read"
	);

	let model = read_model_parameters(&config.model_dir, &ActivationTables::default())?;
	let pipeline = Pipeline::new(model, config.workers)?;

	let logits = pipeline.run(&sequences)?;
	write_logits(&config.output_dir, &logits)?;

	tracing::info!(elapsed = ?started.elapsed(), "results written");
	Ok(())
}
