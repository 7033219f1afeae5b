//! The trained model parameters and the readers for their text formats:
//! space/newline-delimited real matrices in row-major order, with the
//! per-head Q/K/V files carrying the four heads side by side.

use std::fs;
use std::path::Path;

use crate::config::ActivationTables;
use crate::constants::{FFN_DIM, MODEL_DIM, NUM_CLASSES, NUM_HEADS};
use crate::linalg::{PlainMatrix, PlainVector};
use crate::{Error, Result};

/// The trained Dashformer weights, as read from the parameter directory,
/// together with the fitted activation tables.
#[derive(Debug, Clone)]
pub struct DashformerParameters {
	/// Token embedding, `V×d`.
	pub embedding_matrix: PlainMatrix,
	/// Positional encoding lookup, `S×d`.
	pub encoding_matrix: PlainMatrix,

	/// Per-head query weights, `d×dₕ` each.
	pub query_weights: Vec<PlainMatrix>,
	/// Per-head query biases, `dₕ` each.
	pub query_biases: Vec<PlainVector>,
	/// Per-head key weights.
	pub key_weights: Vec<PlainMatrix>,
	/// Per-head key biases.
	pub key_biases: Vec<PlainVector>,
	/// Per-head value weights.
	pub value_weights: Vec<PlainMatrix>,
	/// Per-head value biases.
	pub value_biases: Vec<PlainVector>,

	/// Head-combination weight, `d×d`.
	pub combine_weight: PlainMatrix,
	/// Head-combination bias, `d`.
	pub combine_bias: PlainVector,

	/// First layer-norm gain, `d`.
	pub layer_norm_r1: PlainVector,
	/// First layer-norm shift, `d`.
	pub layer_norm_b1: PlainVector,
	/// Second layer-norm gain, `d`.
	pub layer_norm_r2: PlainVector,
	/// Second layer-norm shift, `d`.
	pub layer_norm_b2: PlainVector,

	/// Feed-forward input weight, `d×d_ff`.
	pub ffn_weight_1: PlainMatrix,
	/// Feed-forward input bias, `d_ff`.
	pub ffn_bias_1: PlainVector,
	/// Feed-forward output weight, `d_ff×d`.
	pub ffn_weight_2: PlainMatrix,
	/// Feed-forward output bias, `d`.
	pub ffn_bias_2: PlainVector,

	/// Classifier weight, `d×K`.
	pub classifier_weight: PlainMatrix,
	/// Classifier bias, `K`.
	pub classifier_bias: PlainVector,

	/// ReLU polynomial approximation.
	pub relu_coefficients: PlainVector,
	/// Reciprocal-sqrt polynomial of the first layer norm.
	pub rsqrt_coefficients_1: PlainVector,
	/// Reciprocal-sqrt polynomial of the second layer norm.
	pub rsqrt_coefficients_2: PlainVector,

	/// Precomputed per-position reciprocal std of the first layer norm,
	/// length `S`.
	pub layer_norm_inv_std_1: PlainVector,
	/// Precomputed per-position reciprocal std of the second layer norm.
	pub layer_norm_inv_std_2: PlainVector,

	/// Per-head softmax additive constant.
	pub softmax_b: [f64; 4],
	/// Per-head softmax normaliser.
	pub softmax_c: [f64; 4],
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
	let content = fs::read_to_string(path)?;
	Ok(content.lines().map(str::to_owned).collect())
}

fn parse_matrix(lines: &[String], path: &Path) -> Result<PlainMatrix> {
	let mut matrix = Vec::with_capacity(lines.len());
	for (i, line) in lines.iter().enumerate() {
		let mut row = Vec::new();
		for (j, field) in line.split_whitespace().enumerate() {
			let value: f64 = field.parse().map_err(|e| {
				Error::Parse(format!(
					"{}: line {}, column {}: {}",
					path.display(),
					i + 1,
					j + 1,
					e
				))
			})?;
			row.push(value);
		}
		matrix.push(row);
	}
	Ok(matrix)
}

fn parse_vector(lines: &[String], path: &Path) -> Result<PlainVector> {
	let mut vector = Vec::with_capacity(lines.len());
	for (i, line) in lines.iter().enumerate() {
		let fields: Vec<&str> = line.split_whitespace().collect();
		if fields.len() != 1 {
			return Err(Error::Parse(format!(
				"{}: line {} does not contain exactly 1 column",
				path.display(),
				i + 1
			)));
		}
		let value: f64 = fields[0].parse().map_err(|e| {
			Error::Parse(format!("{}: line {}: {}", path.display(), i + 1, e))
		})?;
		vector.push(value);
	}
	Ok(vector)
}

fn expect_shape(
	matrix: &PlainMatrix,
	rows: usize,
	cols: usize,
	path: &Path,
) -> Result<()> {
	if matrix.len() != rows || matrix.iter().any(|row| row.len() != cols) {
		return Err(Error::Parse(format!(
			"{}: expected a {}x{} matrix, got {}x{}",
			path.display(),
			rows,
			cols,
			matrix.len(),
			matrix.first().map_or(0, Vec::len)
		)));
	}
	Ok(())
}

/// Reads a plain matrix file (embedding, positional lookup).
pub fn read_matrix_file(path: &Path) -> Result<PlainMatrix> {
	let lines = read_lines(path)?;
	parse_matrix(&lines, path)
}

/// Reads one of the Q/K/V files: `d` weight rows of `d` columns, split
/// column-wise into `H` heads of `d×dₕ`, followed by `d` bias rows split
/// into `H` per-head vectors.
pub fn read_attention_file(path: &Path) -> Result<(Vec<PlainMatrix>, Vec<PlainVector>)> {
	let lines = read_lines(path)?;
	if lines.len() != 2 * MODEL_DIM {
		return Err(Error::Parse(format!(
			"{}: expected {} lines, got {}",
			path.display(),
			2 * MODEL_DIM,
			lines.len()
		)));
	}

	let weights_raw = parse_matrix(&lines[..MODEL_DIM], path)?;
	expect_shape(&weights_raw, MODEL_DIM, MODEL_DIM, path)?;
	let head_dim = MODEL_DIM / NUM_HEADS;

	let mut weights = vec![vec![vec![0.0; head_dim]; MODEL_DIM]; NUM_HEADS];
	for (i, row) in weights_raw.iter().enumerate() {
		for (j, &v) in row.iter().enumerate() {
			weights[j / head_dim][i][j % head_dim] = v;
		}
	}

	let biases_raw = parse_vector(&lines[MODEL_DIM..], path)?;
	let mut biases = vec![vec![0.0; head_dim]; NUM_HEADS];
	for (i, &v) in biases_raw.iter().enumerate() {
		biases[i / head_dim][i % head_dim] = v;
	}

	Ok((weights, biases))
}

/// Reads a weight-then-bias file (head combination, classifier): `d`
/// matrix rows followed by one bias value per line.
pub fn read_combine_file(path: &Path) -> Result<(PlainMatrix, PlainVector)> {
	let lines = read_lines(path)?;
	if lines.len() <= MODEL_DIM {
		return Err(Error::Parse(format!(
			"{}: expected more than {} lines, got {}",
			path.display(),
			MODEL_DIM,
			lines.len()
		)));
	}
	let weight = parse_matrix(&lines[..MODEL_DIM], path)?;
	let bias = parse_vector(&lines[MODEL_DIM..], path)?;
	Ok((weight, bias))
}

/// Reads the feed-forward file: `W₁` (`d` rows), `b₁` (`d_ff` rows),
/// `W₂` (`d_ff` rows), `b₂` (`d` rows).
pub fn read_feed_forward_file(
	path: &Path,
) -> Result<(PlainMatrix, PlainVector, PlainMatrix, PlainVector)> {
	let lines = read_lines(path)?;
	let expected = 2 * MODEL_DIM + 2 * FFN_DIM;
	if lines.len() != expected {
		return Err(Error::Parse(format!(
			"{}: expected {} lines, got {}",
			path.display(),
			expected,
			lines.len()
		)));
	}

	let w1 = parse_matrix(&lines[..MODEL_DIM], path)?;
	expect_shape(&w1, MODEL_DIM, FFN_DIM, path)?;
	let b1 = parse_vector(&lines[MODEL_DIM..MODEL_DIM + FFN_DIM], path)?;
	let w2 = parse_matrix(&lines[MODEL_DIM + FFN_DIM..MODEL_DIM + 2 * FFN_DIM], path)?;
	expect_shape(&w2, FFN_DIM, MODEL_DIM, path)?;
	let b2 = parse_vector(&lines[MODEL_DIM + 2 * FFN_DIM..], path)?;

	Ok((w1, b1, w2, b2))
}

/// Reads a layer-norm file: `d` gain rows followed by `d` shift rows.
pub fn read_layer_norm_file(path: &Path) -> Result<(PlainVector, PlainVector)> {
	let lines = read_lines(path)?;
	if lines.len() != 2 * MODEL_DIM {
		return Err(Error::Parse(format!(
			"{}: expected {} lines, got {}",
			path.display(),
			2 * MODEL_DIM,
			lines.len()
		)));
	}
	let r = parse_vector(&lines[..MODEL_DIM], path)?;
	let b = parse_vector(&lines[MODEL_DIM..], path)?;
	Ok((r, b))
}

/// Reads a reciprocal-sqrt-variance file: one value per sequence position.
pub fn read_inv_std_file(path: &Path) -> Result<PlainVector> {
	let lines = read_lines(path)?;
	parse_vector(&lines, path)
}

/// Reads the whole model parameter directory.
pub fn read_model_parameters(
	dir: &Path,
	tables: &ActivationTables,
) -> Result<DashformerParameters> {
	let embedding_matrix = read_matrix_file(&dir.join("embedding_Embedding_weights.txt"))?;
	let encoding_matrix = read_matrix_file(&dir.join("positional_encoding_Lookup.txt"))?;

	let (query_weights, query_biases) =
		read_attention_file(&dir.join("transformer_block_Query_weights.txt"))?;
	let (key_weights, key_biases) =
		read_attention_file(&dir.join("transformer_block_Key_weights.txt"))?;
	let (value_weights, value_biases) =
		read_attention_file(&dir.join("transformer_block_Value_weights.txt"))?;

	let combine_path = dir.join("transformer_block_CombineHead_weights.txt");
	let (combine_weight, combine_bias) = read_combine_file(&combine_path)?;
	expect_shape(&combine_weight, MODEL_DIM, MODEL_DIM, &combine_path)?;

	let classifier_path = dir.join("Dense_Classifier_DenseClassifier_weights.txt");
	let (classifier_weight, classifier_bias) = read_combine_file(&classifier_path)?;
	expect_shape(&classifier_weight, MODEL_DIM, NUM_CLASSES, &classifier_path)?;

	let (layer_norm_r1, layer_norm_b1) =
		read_layer_norm_file(&dir.join("transformer_block_LayerNorm1_weights.txt"))?;
	let (layer_norm_r2, layer_norm_b2) =
		read_layer_norm_file(&dir.join("transformer_block_LayerNorm2_weights.txt"))?;

	let (ffn_weight_1, ffn_bias_1, ffn_weight_2, ffn_bias_2) =
		read_feed_forward_file(&dir.join("transformer_block_FFN_weights.txt"))?;

	let layer_norm_inv_std_1 =
		read_inv_std_file(&dir.join("layerNorm1_Reciprocal_SqrtVariance.txt"))?;
	let layer_norm_inv_std_2 =
		read_inv_std_file(&dir.join("layerNorm2_Reciprocal_SqrtVariance.txt"))?;

	Ok(DashformerParameters {
		embedding_matrix,
		encoding_matrix,
		query_weights,
		query_biases,
		key_weights,
		key_biases,
		value_weights,
		value_biases,
		combine_weight,
		combine_bias,
		layer_norm_r1,
		layer_norm_b1,
		layer_norm_r2,
		layer_norm_b2,
		ffn_weight_1,
		ffn_bias_1,
		ffn_weight_2,
		ffn_bias_2,
		classifier_weight,
		classifier_bias,
		relu_coefficients: tables.relu.clone(),
		rsqrt_coefficients_1: tables.rsqrt_layer_1.clone(),
		rsqrt_coefficients_2: tables.rsqrt_layer_2.clone(),
		layer_norm_inv_std_1,
		layer_norm_inv_std_2,
		softmax_b: tables.softmax_b,
		softmax_c: tables.softmax_c,
	})
}
