//! Runtime configuration: file locations, worker width and the fitted
//! activation constants.

use std::path::PathBuf;

/// Paths and worker width for one inference run.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
	/// Input sequences, one per line.
	pub sequences_path: PathBuf,
	/// Tokeniser JSON with the `config.word_index` mapping.
	pub tokenizer_path: PathBuf,
	/// Directory holding the model parameter files.
	pub model_dir: PathBuf,
	/// Directory the result file is written into.
	pub output_dir: PathBuf,
	/// Width of the worker pool.
	pub workers: usize,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			sequences_path: PathBuf::from("data/example_AA_sequences.list"),
			tokenizer_path: PathBuf::from("data/dashformer_tokenizer.json"),
			model_dir: PathBuf::from("data/dashformer_model_parameters"),
			output_dir: PathBuf::from("data/output"),
			workers: 4,
		}
	}
}

/// Polynomial coefficient tables and softmax constants of the fitted
/// activations. The defaults are the fitted values shipped with the model.
#[derive(Debug, Clone)]
pub struct ActivationTables {
	/// ReLU approximation, monomial coefficients, low degree first.
	pub relu: Vec<f64>,
	/// Reciprocal-sqrt approximation used by the first layer norm.
	pub rsqrt_layer_1: Vec<f64>,
	/// Reciprocal-sqrt approximation used by the second layer norm.
	pub rsqrt_layer_2: Vec<f64>,
	/// Per-head additive softmax constant `b`.
	pub softmax_b: [f64; 4],
	/// Per-head softmax normaliser `c`.
	pub softmax_c: [f64; 4],
}

impl Default for ActivationTables {
	fn default() -> Self {
		Self {
			relu: vec![
				9.43651501e-01,
				3.59049720e-01,
				3.66350473e-02,
				1.12737776e-03,
				-7.22653539e-06,
				-7.31025115e-07,
				-6.99022399e-09,
			],
			rsqrt_layer_1: vec![
				4.01447285e-01,
				-1.41122823e-02,
				3.37694161e-04,
				-4.54776425e-06,
				3.15551268e-08,
				-8.73491970e-11,
			],
			rsqrt_layer_2: vec![
				4.62876515e-01,
				-1.77386329e-02,
				3.71793457e-04,
				-3.71871638e-06,
				1.69876334e-08,
				-2.83686695e-11,
			],
			softmax_b: [1.32, 0.75, 0.66, 1.14],
			softmax_c: [450.0, 181.0, 158.0, 376.0],
		}
	}
}
