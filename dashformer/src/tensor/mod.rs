//! The ciphertext tensor: a 3-D logical tensor `(R, C, D)` realised as
//! `D` ciphertexts, each packing an `R×C` real matrix row major into the
//! slot vector. Rows are the batch axis, columns the sequence positions
//! and depth the feature channels.

mod activation;
mod evaluator;

pub use evaluator::TensorEvaluator;

use rayon::prelude::*;

use crate::keys::{PublicKeySet, SecretKeySet};
use crate::{Error, Result};
use dashformer_ckks::Ciphertext;

/// A tensor of ciphertexts. The tensor owns its ciphertext vector;
/// cloning deep-copies every ciphertext.
#[derive(Debug, Clone)]
pub struct CiphertextTensor {
	ciphertexts: Vec<Ciphertext>,
	rows: usize,
	cols: usize,
	depth: usize,
}

impl CiphertextTensor {
	/// Assembles a tensor from its channel ciphertexts.
	pub fn new(
		ciphertexts: Vec<Ciphertext>,
		rows: usize,
		cols: usize,
		depth: usize,
	) -> Result<Self> {
		if ciphertexts.len() != depth || depth == 0 || rows == 0 || cols == 0 {
			return Err(Error::shape(
				"CiphertextTensor::new",
				format!("{} ciphertexts", depth),
				ciphertexts.len(),
			));
		}
		Ok(Self {
			ciphertexts,
			rows,
			cols,
			depth,
		})
	}

	/// Number of rows (batch entries) per channel.
	pub fn rows(&self) -> usize {
		self.rows
	}

	/// Number of columns (sequence positions) per channel.
	pub fn cols(&self) -> usize {
		self.cols
	}

	/// Number of feature channels.
	pub fn depth(&self) -> usize {
		self.depth
	}

	/// The `(rows, cols, depth)` shape.
	pub fn shape(&self) -> (usize, usize, usize) {
		(self.rows, self.cols, self.depth)
	}

	/// The shared CKKS level of the channel ciphertexts.
	pub fn level(&self) -> usize {
		self.ciphertexts[0].level()
	}

	/// The shared scale of the channel ciphertexts.
	pub fn scale(&self) -> f64 {
		self.ciphertexts[0].scale()
	}

	/// The ciphertext of channel `d`.
	pub fn ciphertext(&self, d: usize) -> &Ciphertext {
		&self.ciphertexts[d]
	}

	pub(crate) fn ciphertext_mut(&mut self, d: usize) -> &mut Ciphertext {
		&mut self.ciphertexts[d]
	}

	/// Concatenates another tensor along the depth axis.
	pub fn concat_depth(mut self, other: CiphertextTensor) -> Result<CiphertextTensor> {
		if self.rows != other.rows || self.cols != other.cols {
			return Err(Error::shape(
				"concat_depth",
				format!("({}, {})", self.rows, self.cols),
				format!("({}, {})", other.rows, other.cols),
			));
		}
		self.ciphertexts.extend(other.ciphertexts);
		self.depth += other.depth;
		Ok(self)
	}
}

/// Encrypts an `R×C×D` value tensor channel by channel.
pub fn encrypt_tensor(
	keys: &PublicKeySet,
	pool: &rayon::ThreadPool,
	values: &[Vec<Vec<f64>>],
) -> Result<CiphertextTensor> {
	let rows = values.len();
	if rows == 0 || values[0].is_empty() || values[0][0].is_empty() {
		return Err(Error::shape("encrypt_tensor", "non-empty tensor", "empty"));
	}
	let cols = values[0].len();
	let depth = values[0][0].len();
	for row in values {
		if row.len() != cols || row.iter().any(|col| col.len() != depth) {
			return Err(Error::shape(
				"encrypt_tensor",
				format!("({}, {}, {})", rows, cols, depth),
				"ragged input",
			));
		}
	}

	let results: Vec<Result<Ciphertext>> = pool.install(|| {
		(0..depth)
			.into_par_iter()
			.map(|d| {
				let mut plain = vec![0.0; rows * cols];
				for (i, row) in values.iter().enumerate() {
					for (j, col) in row.iter().enumerate() {
						plain[i * cols + j] = col[d];
					}
				}
				let encoded = keys.encoder.encode_f64(&plain)?;
				Ok(keys.encryptor.encrypt(&encoded)?)
			})
			.collect()
	});
	let ciphertexts = results.into_iter().collect::<Result<Vec<_>>>()?;

	CiphertextTensor::new(ciphertexts, rows, cols, depth)
}

/// Decrypts a ciphertext tensor back into an `R×C×D` value tensor.
pub fn decrypt_tensor(
	keys: &SecretKeySet,
	tensor: &CiphertextTensor,
) -> Result<Vec<Vec<Vec<f64>>>> {
	let (rows, cols, depth) = tensor.shape();
	let mut values = vec![vec![vec![0.0; depth]; cols]; rows];

	for d in 0..depth {
		let decoded = keys
			.encoder
			.decode_f64(&keys.decryptor.decrypt(tensor.ciphertext(d))?);
		for (i, row) in values.iter_mut().enumerate() {
			for (j, col) in row.iter_mut().enumerate() {
				col[d] = decoded[i * cols + j];
			}
		}
	}
	Ok(values)
}
