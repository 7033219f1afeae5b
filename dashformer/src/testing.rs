//! Shared fixtures for the unit tests: a small ring, a tiny model and
//! plaintext helpers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::keys::{setup_with_log_n, PublicKeySet, SecretKeySet};
use crate::linalg::{PlainMatrix, PlainVector};
use crate::model::DashformerParameters;
use crate::tensor::{decrypt_tensor, encrypt_tensor, CiphertextTensor};
use crate::Result;

/// Shape of a synthetic model small enough for exhaustive checks.
#[derive(Debug, Clone)]
pub struct TinyDims {
	pub vocab: usize,
	pub dim: usize,
	pub head_dim: usize,
	pub seq: usize,
	pub heads: usize,
	pub ffn: usize,
	pub classes: usize,
}

impl Default for TinyDims {
	fn default() -> Self {
		Self {
			vocab: 3,
			dim: 4,
			head_dim: 2,
			seq: 4,
			heads: 2,
			ffn: 5,
			classes: 3,
		}
	}
}

/// A random model with the given shape and moderate weight magnitudes.
pub fn tiny_model(seed: u64, dims: &TinyDims) -> DashformerParameters {
	let mut rng = StdRng::seed_from_u64(seed);
	let d = dims.dim;
	DashformerParameters {
		embedding_matrix: random_matrix(&mut rng, dims.vocab, d),
		encoding_matrix: random_matrix(&mut rng, dims.seq, d),
		query_weights: (0..dims.heads)
			.map(|_| random_matrix(&mut rng, d, dims.head_dim))
			.collect(),
		query_biases: (0..dims.heads)
			.map(|_| random_vector(&mut rng, dims.head_dim))
			.collect(),
		key_weights: (0..dims.heads)
			.map(|_| random_matrix(&mut rng, d, dims.head_dim))
			.collect(),
		key_biases: (0..dims.heads)
			.map(|_| random_vector(&mut rng, dims.head_dim))
			.collect(),
		value_weights: (0..dims.heads)
			.map(|_| random_matrix(&mut rng, d, dims.head_dim))
			.collect(),
		value_biases: (0..dims.heads)
			.map(|_| random_vector(&mut rng, dims.head_dim))
			.collect(),
		combine_weight: random_matrix(&mut rng, d, d),
		combine_bias: random_vector(&mut rng, d),
		layer_norm_r1: random_vector(&mut rng, d),
		layer_norm_b1: random_vector(&mut rng, d),
		layer_norm_r2: random_vector(&mut rng, d),
		layer_norm_b2: random_vector(&mut rng, d),
		ffn_weight_1: random_matrix(&mut rng, d, dims.ffn),
		ffn_bias_1: random_vector(&mut rng, dims.ffn),
		ffn_weight_2: random_matrix(&mut rng, dims.ffn, d),
		ffn_bias_2: random_vector(&mut rng, d),
		classifier_weight: random_matrix(&mut rng, d, dims.classes),
		classifier_bias: random_vector(&mut rng, dims.classes),
		relu_coefficients: vec![0.31, 0.5, 0.17, -0.02],
		rsqrt_coefficients_1: vec![0.4, -0.014],
		rsqrt_coefficients_2: vec![0.46, -0.017],
		layer_norm_inv_std_1: (0..dims.seq).map(|i| 0.8 + 0.05 * i as f64).collect(),
		layer_norm_inv_std_2: (0..dims.seq).map(|i| 0.9 + 0.04 * i as f64).collect(),
		softmax_b: [1.32, 0.75, 0.66, 1.14],
		softmax_c: [450.0, 181.0, 158.0, 376.0],
	}
}

pub fn small_key_sets() -> (PublicKeySet, SecretKeySet) {
	setup_with_log_n(12).expect("test key setup")
}

pub fn test_pool() -> rayon::ThreadPool {
	rayon::ThreadPoolBuilder::new()
		.num_threads(2)
		.build()
		.expect("test pool")
}

pub fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> PlainMatrix {
	(0..rows)
		.map(|_| (0..cols).map(|_| rng.gen_range(-1.0..1.0)).collect())
		.collect()
}

pub fn random_vector(rng: &mut StdRng, len: usize) -> PlainVector {
	(0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Encrypts a single-row tensor whose columns are the matrix rows and
/// whose channels are the matrix columns.
pub fn encrypt_matrix(
	keys: &PublicKeySet,
	pool: &rayon::ThreadPool,
	matrix: &PlainMatrix,
) -> Result<CiphertextTensor> {
	encrypt_tensor(keys, pool, &[matrix.clone()])
}

/// Decrypts a single-row tensor back into its `cols × depth` matrix.
pub fn decrypt_matrix(keys: &SecretKeySet, tensor: &CiphertextTensor) -> Result<PlainMatrix> {
	let mut values = decrypt_tensor(keys, tensor)?;
	Ok(values.remove(0))
}

pub fn assert_matrix_close(a: &PlainMatrix, b: &PlainMatrix, tolerance: f64) {
	assert_eq!(a.len(), b.len(), "row counts differ");
	for (i, (ra, rb)) in a.iter().zip(b.iter()).enumerate() {
		assert_eq!(ra.len(), rb.len(), "column counts differ in row {i}");
		for (j, (x, y)) in ra.iter().zip(rb.iter()).enumerate() {
			assert!(
				(x - y).abs() < tolerance,
				"entry ({i}, {j}): {x} != {y}"
			);
		}
	}
}
