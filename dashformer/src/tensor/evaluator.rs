use rayon::prelude::*;

use dashformer_ckks::{Ciphertext, CkksEvaluator};

use crate::keys::PublicKeySet;
use crate::linalg::{repeat_vector, scale_vector, PlainMatrix};
use crate::tensor::CiphertextTensor;
use crate::{Error, Result};

/// Evaluates tensor-level operations over packed ciphertexts.
///
/// The evaluator borrows the public key set and the pipeline's worker
/// pool; parallel stages hand each worker a thread-local shallow copy of
/// the underlying CKKS evaluator and write disjoint, pre-allocated output
/// slots. The first failure of a stage wins, in channel order.
pub struct TensorEvaluator<'a> {
	keys: &'a PublicKeySet,
	pool: &'a rayon::ThreadPool,
}

impl<'a> TensorEvaluator<'a> {
	/// Creates a tensor evaluator on top of a key set and worker pool.
	pub fn new(keys: &'a PublicKeySet, pool: &'a rayon::ThreadPool) -> Self {
		Self {
			keys,
			pool,
		}
	}

	pub(crate) fn he(&self) -> &CkksEvaluator {
		&self.keys.evaluator
	}

	pub(crate) fn pool(&self) -> &rayon::ThreadPool {
		self.pool
	}

	pub(crate) fn default_scale(&self) -> f64 {
		self.keys.params.default_scale()
	}

	fn check_matrix(
		op: &'static str,
		matrix: &PlainMatrix,
		rows: usize,
	) -> Result<usize> {
		if matrix.len() != rows || matrix.is_empty() {
			return Err(Error::shape(op, format!("{} matrix rows", rows), matrix.len()));
		}
		let cols = matrix[0].len();
		if matrix.iter().any(|row| row.len() != cols) {
			return Err(Error::shape(op, "rectangular matrix", "ragged rows"));
		}
		Ok(cols)
	}

	fn collect_tensor(
		results: Vec<Result<Ciphertext>>,
		rows: usize,
		cols: usize,
		depth: usize,
	) -> Result<CiphertextTensor> {
		let ciphertexts = results.into_iter().collect::<Result<Vec<_>>>()?;
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}

	/// `T(R,C,D) × M(D,D') → (R,C,D')`: per output channel, accumulate
	/// the input channels under splat plaintext weights, then rescale
	/// once. One ciphertext multiplication of depth per output channel.
	pub fn mul_plain(
		&self,
		tensor: &CiphertextTensor,
		matrix: &PlainMatrix,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		let out_depth = Self::check_matrix("mul_plain", matrix, depth)?;

		let acc_scale = tensor.scale() * self.default_scale();
		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..out_depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let mut acc = he.allocate_zero(tensor.level(), acc_scale);
					for j in 0..depth {
						let splat = vec![matrix[j][i]; rows * cols];
						he.multiply_plain_then_add(tensor.ciphertext(j), &splat, &mut acc)?;
					}
					he.rescale(&mut acc)?;
					Ok(acc)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, out_depth)
	}

	/// `T(R,C,D) + M(C,D) → (R,C,D)`: the addend holds one scalar per
	/// (column, depth) pair, broadcast across the rows.
	pub fn add_plain(
		&self,
		tensor: &CiphertextTensor,
		matrix: &PlainMatrix,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		let plain_cols = Self::check_matrix("add_plain", matrix, cols)?;
		if plain_cols != depth {
			return Err(Error::shape(
				"add_plain",
				format!("({}, {})", cols, depth),
				format!("({}, {})", matrix.len(), plain_cols),
			));
		}

		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let mut plain = vec![0.0; rows * cols];
					for j in 0..cols {
						for k in 0..rows {
							plain[j + k * cols] = matrix[j][i];
						}
					}
					Ok(he.add_plain(tensor.ciphertext(i), &plain)?)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, depth)
	}

	/// `T × W + b`: plaintext matmul followed by a per-channel scalar bias.
	pub fn mul_weight_add_bias(
		&self,
		tensor: &CiphertextTensor,
		weight: &PlainMatrix,
		bias: &[f64],
	) -> Result<CiphertextTensor> {
		let out_depth = Self::check_matrix("mul_weight_add_bias", weight, tensor.depth())?;
		if out_depth != bias.len() {
			return Err(Error::shape(
				"mul_weight_add_bias",
				format!("bias of {}", out_depth),
				bias.len(),
			));
		}

		let product = self.mul_plain(tensor, weight)?;
		let (rows, cols, depth) = product.shape();
		let mut ciphertexts = Vec::with_capacity(depth);
		for (i, &b) in bias.iter().enumerate() {
			ciphertexts.push(self.he().add_scalar(product.ciphertext(i), b)?);
		}
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}

	/// `T × M + A`: plaintext matmul fused with a per-(column, depth)
	/// addend, as used to materialise `V` from `X₀`.
	pub fn mul_plain_add_plain(
		&self,
		tensor: &CiphertextTensor,
		matrix: &PlainMatrix,
		addend: &PlainMatrix,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		let out_depth = Self::check_matrix("mul_plain_add_plain", matrix, depth)?;
		let addend_cols = Self::check_matrix("mul_plain_add_plain", addend, cols)?;
		if addend_cols != out_depth {
			return Err(Error::shape(
				"mul_plain_add_plain",
				format!("({}, {})", cols, out_depth),
				format!("({}, {})", addend.len(), addend_cols),
			));
		}

		let acc_scale = tensor.scale() * self.default_scale();
		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..out_depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let mut acc = he.allocate_zero(tensor.level(), acc_scale);
					for j in 0..depth {
						let splat = vec![matrix[j][i]; rows * cols];
						he.multiply_plain_then_add(tensor.ciphertext(j), &splat, &mut acc)?;
					}
					he.rescale(&mut acc)?;

					let column: Vec<f64> = addend.iter().map(|row| row[i]).collect();
					let plain = repeat_vector(&column, rows);
					Ok(he.add_plain(&acc, &plain)?)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, out_depth)
	}

	/// `diag(v) · T · M`: a per-column plaintext gain fused into the
	/// matmul, one multiply-accumulate and a single rescale per output
	/// channel. `v` holds one gain per column, broadcast across rows.
	pub fn vec_mul_mat(
		&self,
		tensor: &CiphertextTensor,
		before: &[f64],
		rear: &PlainMatrix,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		if before.len() != cols {
			return Err(Error::shape(
				"vec_mul_mat",
				format!("gain of {}", cols),
				before.len(),
			));
		}
		let out_depth = Self::check_matrix("vec_mul_mat", rear, depth)?;

		let repeated = repeat_vector(before, rows);
		let acc_scale = tensor.scale() * self.default_scale();
		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..out_depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let mut acc = he.allocate_zero(tensor.level(), acc_scale);
					for j in 0..depth {
						let weighted = scale_vector(&repeated, rear[j][i]);
						he.multiply_plain_then_add(tensor.ciphertext(j), &weighted, &mut acc)?;
					}
					he.rescale(&mut acc)?;
					Ok(acc)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, out_depth)
	}

	/// Rotates each row's columns left-cyclically by `step` and scales
	/// every slot by `base`. `step == 0` with unit base is the identity
	/// fast path: no level is consumed and no evaluator call is made.
	pub fn rot_cols(
		&self,
		tensor: &CiphertextTensor,
		step: i64,
		base: f64,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		let rot = Self::normalize_step(step, cols);
		if rot == 0 && (base - 1.0).abs() < 0.01 {
			return Ok(tensor.clone());
		}

		let (left_mask, right_mask) = Self::rotation_masks(rows, cols, rot, base);
		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let ct = tensor.ciphertext(i);
					let left = he.rotate(&he.multiply_plain(ct, &left_mask)?, rot as i64)?;
					let right =
						he.rotate(&he.multiply_plain(ct, &right_mask)?, rot as i64 - cols as i64)?;
					let mut sum = he.add(&left, &right)?;
					he.rescale(&mut sum)?;
					Ok(sum)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, depth)
	}

	/// Rotates each channel by `step` and by `step - C` without masking,
	/// returning the non-wrapping and wrapping halves for later fused
	/// plaintext-weighted merges. No level is consumed.
	pub fn rot_cols_split(
		&self,
		tensor: &CiphertextTensor,
		step: i64,
	) -> Result<(CiphertextTensor, CiphertextTensor)> {
		let (rows, cols, depth) = tensor.shape();
		let rot = Self::normalize_step(step, cols);

		let results: Vec<Result<(Ciphertext, Ciphertext)>> = self.pool.install(|| {
			(0..depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let ct = tensor.ciphertext(i);
					let left = he.rotate(ct, rot as i64)?;
					let right = he.rotate(ct, rot as i64 - cols as i64)?;
					Ok((left, right))
				})
				.collect()
		});

		let mut lefts = Vec::with_capacity(depth);
		let mut rights = Vec::with_capacity(depth);
		for pair in results {
			let (left, right) = pair?;
			lefts.push(left);
			rights.push(right);
		}
		Ok((
			CiphertextTensor::new(lefts, rows, cols, depth)?,
			CiphertextTensor::new(rights, rows, cols, depth)?,
		))
	}

	/// Recombines rotation halves into the rotated tensor by masking the
	/// valid region of each half.
	pub fn merge_rotated(
		&self,
		left: &CiphertextTensor,
		right: &CiphertextTensor,
		step: i64,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = left.shape();
		if right.shape() != left.shape() {
			return Err(Error::shape(
				"merge_rotated",
				format!("{:?}", left.shape()),
				format!("{:?}", right.shape()),
			));
		}
		let rot = Self::normalize_step(step, cols);
		let (left_mask, right_mask) = Self::merge_masks(rows, cols, rot, 1.0);

		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let l = he.multiply_plain(left.ciphertext(i), &left_mask)?;
					let r = he.multiply_plain(right.ciphertext(i), &right_mask)?;
					let mut sum = he.add(&l, &r)?;
					he.rescale(&mut sum)?;
					Ok(sum)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, depth)
	}

	/// The fused rotate-and-matmul of the BSGS inner loop: multiplies the
	/// rotation halves of a tensor by a square channel-mixing matrix,
	/// with the per-entry weight folded into the merge masks. One rescale
	/// per output channel.
	pub fn merge_rotated_mul_plain(
		&self,
		left: &CiphertextTensor,
		right: &CiphertextTensor,
		matrix: &PlainMatrix,
		step: i64,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = left.shape();
		if right.shape() != left.shape() {
			return Err(Error::shape(
				"merge_rotated_mul_plain",
				format!("{:?}", left.shape()),
				format!("{:?}", right.shape()),
			));
		}
		let out_depth = Self::check_matrix("merge_rotated_mul_plain", matrix, depth)?;
		let rot = Self::normalize_step(step, cols);

		let acc_scale = left.scale() * self.default_scale();
		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..out_depth)
				.into_par_iter()
				.map(|i| {
					let he = self.he().clone();
					let mut acc = he.allocate_zero(left.level(), acc_scale);
					for j in 0..depth {
						let (left_mask, right_mask) =
							Self::merge_masks(rows, cols, rot, matrix[j][i]);
						he.multiply_plain_then_add(left.ciphertext(j), &left_mask, &mut acc)?;
						he.multiply_plain_then_add(right.ciphertext(j), &right_mask, &mut acc)?;
					}
					he.rescale(&mut acc)?;
					Ok(acc)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, out_depth)
	}

	/// Contracts two tensors along the depth axis into a single
	/// ciphertext: `Σ_d a[d] ⊙ b[d]`, rescaled once.
	pub fn depthwise_dot(
		&self,
		a: &CiphertextTensor,
		b: &CiphertextTensor,
	) -> Result<Ciphertext> {
		if a.depth() != b.depth() {
			return Err(Error::shape("depthwise_dot", a.depth(), b.depth()));
		}

		let he = self.he();
		let level = a.level().min(b.level());
		let mut acc = he.allocate_zero(level, a.scale() * b.scale());
		for d in 0..a.depth() {
			he.multiply_relin_then_add(a.ciphertext(d), b.ciphertext(d), &mut acc)?;
		}
		he.rescale(&mut acc)?;
		Ok(acc)
	}

	/// Contracts a tensor with a plaintext matrix along the depth axis:
	/// `Σ_d t[d] ⊙ broadcast(M[d])`, where row `d` of the matrix holds
	/// one scalar per column.
	pub fn depthwise_dot_plain(
		&self,
		tensor: &CiphertextTensor,
		matrix: &PlainMatrix,
	) -> Result<Ciphertext> {
		let (rows, cols, depth) = tensor.shape();
		let plain_cols = Self::check_matrix("depthwise_dot_plain", matrix, depth)?;
		if plain_cols != cols {
			return Err(Error::shape("depthwise_dot_plain", cols, plain_cols));
		}

		let he = self.he();
		let mut acc = he.allocate_zero(tensor.level(), tensor.scale() * self.default_scale());
		for d in 0..depth {
			let plain = repeat_vector(&matrix[d], rows);
			he.multiply_plain_then_add(tensor.ciphertext(d), &plain, &mut acc)?;
		}
		he.rescale(&mut acc)?;
		Ok(acc)
	}

	/// Multiply-accumulates a broadcast ciphertext against every channel
	/// of `v`: `acc[d] += rescale(diag ⊙ v[d])`. The rescaled product is
	/// reinterpreted to the default scale before the accumulator add, the
	/// documented fix-up point for fused-multiply scale drift.
	pub fn mac_broadcast(
		&self,
		diag: &Ciphertext,
		v: &CiphertextTensor,
		acc: &mut CiphertextTensor,
	) -> Result<()> {
		if acc.depth() != v.depth() {
			return Err(Error::shape("mac_broadcast", v.depth(), acc.depth()));
		}

		let he = self.he();
		let default_scale = self.default_scale();
		for d in 0..v.depth() {
			let mut product = he.multiply_relin(v.ciphertext(d), diag)?;
			he.rescale(&mut product)?;
			he.reinterpret_scale(&mut product, default_scale)?;
			let sum = he.add(&product, acc.ciphertext(d))?;
			*acc.ciphertext_mut(d) = sum;
		}
		Ok(())
	}

	/// Reduces each row over the column axis into its first slot and adds
	/// a per-channel scalar bias.
	pub fn pool_and_add(
		&self,
		tensor: &CiphertextTensor,
		bias: &[f64],
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		if depth != bias.len() {
			return Err(Error::shape("pool_and_add", depth, bias.len()));
		}

		let results: Vec<Result<Ciphertext>> = self.pool.install(|| {
			(0..depth)
				.into_par_iter()
				.map(|d| {
					let he = self.he().clone();
					let pooled = he.inner_sum(tensor.ciphertext(d), 1, cols)?;
					Ok(he.add_scalar(&pooled, bias[d])?)
				})
				.collect()
		});
		Self::collect_tensor(results, rows, cols, depth)
	}

	/// Adds two tensors channel-wise.
	pub fn add(
		&self,
		a: &CiphertextTensor,
		b: &CiphertextTensor,
	) -> Result<CiphertextTensor> {
		if a.shape() != b.shape() {
			return Err(Error::shape(
				"add",
				format!("{:?}", a.shape()),
				format!("{:?}", b.shape()),
			));
		}
		let (rows, cols, depth) = a.shape();
		let mut ciphertexts = Vec::with_capacity(depth);
		for d in 0..depth {
			ciphertexts.push(self.he().add(a.ciphertext(d), b.ciphertext(d))?);
		}
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}

	/// Adds three tensors channel-wise.
	pub fn add3(
		&self,
		a: &CiphertextTensor,
		b: &CiphertextTensor,
		c: &CiphertextTensor,
	) -> Result<CiphertextTensor> {
		let sum = self.add(a, b)?;
		self.add(&sum, c)
	}

	/// Allocates an all-zero accumulator tensor at the given level and
	/// the default scale.
	pub fn allocate_zero_tensor(
		&self,
		rows: usize,
		cols: usize,
		depth: usize,
		level: usize,
	) -> Result<CiphertextTensor> {
		let he = self.he();
		let ciphertexts = (0..depth)
			.map(|_| he.allocate_zero(level, self.default_scale()))
			.collect();
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}

	fn normalize_step(step: i64, cols: usize) -> usize {
		let cols = cols as i64;
		(((step % cols) + cols) % cols) as usize
	}

	/// Masks applied before rotating: the non-wrapping half keeps columns
	/// `j ≥ rot`, the wrapping half keeps columns `j < rot`.
	fn rotation_masks(
		rows: usize,
		cols: usize,
		rot: usize,
		base: f64,
	) -> (Vec<f64>, Vec<f64>) {
		let mut left = vec![0.0; rows * cols];
		let mut right = vec![0.0; rows * cols];
		for i in 0..rows {
			for j in 0..cols {
				if j < rot {
					right[i * cols + j] = base;
				} else {
					left[i * cols + j] = base;
				}
			}
		}
		(left, right)
	}

	/// Masks applied after rotating: the non-wrapping half is valid in
	/// columns `j < C - rot`, the wrapping half in the rest.
	fn merge_masks(
		rows: usize,
		cols: usize,
		rot: usize,
		base: f64,
	) -> (Vec<f64>, Vec<f64>) {
		let mut left = vec![0.0; rows * cols];
		let mut right = vec![0.0; rows * cols];
		for i in 0..rows {
			for j in 0..cols {
				if j < cols - rot {
					left[i * cols + j] = base;
				} else {
					right[i * cols + j] = base;
				}
			}
		}
		(left, right)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::{PublicKeySet, SecretKeySet};
	use crate::tensor::{decrypt_tensor, encrypt_tensor};
	use crate::testing::{small_key_sets, test_pool};

	struct Fixture {
		public: PublicKeySet,
		secret: SecretKeySet,
		pool: rayon::ThreadPool,
	}

	fn fixture() -> Fixture {
		let (public, secret) = small_key_sets();
		Fixture {
			public,
			secret,
			pool: test_pool(),
		}
	}

	fn literal_tensor() -> Vec<Vec<Vec<f64>>> {
		vec![
			vec![vec![1.1, 2.2, 3.3], vec![4.4, 5.5, 6.6]],
			vec![vec![7.7, 8.8, 9.9], vec![10.1, 11.1, 12.1]],
		]
	}

	fn assert_close(a: f64, b: f64) {
		assert!((a - b).abs() < 1e-4, "{a} != {b}");
	}

	#[test]
	fn encrypt_decrypt_roundtrip() {
		let f = fixture();
		let values = literal_tensor();
		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();

		assert_eq!(tensor.shape(), (2, 2, 3));
		assert_eq!(tensor.level(), f.public.params.max_level());

		let decrypted = decrypt_tensor(&f.secret, &tensor).unwrap();
		for (r, row) in values.iter().enumerate() {
			for (c, col) in row.iter().enumerate() {
				for (d, &v) in col.iter().enumerate() {
					assert_close(decrypted[r][c][d], v);
				}
			}
		}
	}

	#[test]
	fn mul_plain_matches_plaintext_product() {
		let f = fixture();
		let values = literal_tensor();
		let matrix = vec![
			vec![0.1, 0.2, 0.3],
			vec![0.4, 0.5, 0.6],
			vec![0.7, 0.8, 0.9],
		];

		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);
		let product = eng.mul_plain(&tensor, &matrix).unwrap();

		assert_eq!(product.shape(), (2, 2, 3));
		assert_eq!(product.level(), tensor.level() - 1);

		let decrypted = decrypt_tensor(&f.secret, &product).unwrap();
		for (r, row) in values.iter().enumerate() {
			for (c, col) in row.iter().enumerate() {
				for out in 0..3 {
					let expected: f64 =
						(0..3).map(|d| col[d] * matrix[d][out]).sum();
					assert_close(decrypted[r][c][out], expected);
				}
			}
		}
	}

	#[test]
	fn mul_plain_composes_like_a_matrix_product() {
		let f = fixture();
		let values = literal_tensor();
		let a = vec![
			vec![0.5, -0.25],
			vec![1.5, 0.75],
			vec![-0.5, 0.25],
		];
		let b = vec![vec![2.0, 0.0, 1.0], vec![-1.0, 1.0, 0.5]];

		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);

		let two_step = eng.mul_plain(&eng.mul_plain(&tensor, &a).unwrap(), &b).unwrap();
		let one_step = eng
			.mul_plain(&tensor, &crate::linalg::matmul(&a, &b))
			.unwrap();

		let lhs = decrypt_tensor(&f.secret, &two_step).unwrap();
		let rhs = decrypt_tensor(&f.secret, &one_step).unwrap();
		for (r, row) in lhs.iter().enumerate() {
			for (c, col) in row.iter().enumerate() {
				for (d, &v) in col.iter().enumerate() {
					assert_close(v, rhs[r][c][d]);
				}
			}
		}
	}

	#[test]
	fn mul_weight_add_bias_matches_plaintext() {
		let f = fixture();
		let values = literal_tensor();
		let weight = vec![
			vec![0.2, -0.1],
			vec![0.0, 0.3],
			vec![0.5, 0.1],
		];
		let bias = vec![1.0, -2.0];

		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);
		let projected = eng.mul_weight_add_bias(&tensor, &weight, &bias).unwrap();

		let decrypted = decrypt_tensor(&f.secret, &projected).unwrap();
		for (r, row) in values.iter().enumerate() {
			for (c, col) in row.iter().enumerate() {
				for out in 0..2 {
					let expected: f64 = (0..3)
						.map(|d| col[d] * weight[d][out])
						.sum::<f64>() + bias[out];
					assert_close(decrypted[r][c][out], expected);
				}
			}
		}
	}

	#[test]
	fn add_plain_broadcasts_per_column_and_depth() {
		let f = fixture();
		let values = literal_tensor();
		let addend = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];

		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);
		let sum = eng.add_plain(&tensor, &addend).unwrap();

		assert_eq!(sum.level(), tensor.level());

		let decrypted = decrypt_tensor(&f.secret, &sum).unwrap();
		for (r, row) in values.iter().enumerate() {
			for (c, col) in row.iter().enumerate() {
				for (d, &v) in col.iter().enumerate() {
					assert_close(decrypted[r][c][d] - v, addend[c][d]);
				}
			}
		}
	}

	#[test]
	fn rot_cols_shifts_and_scales() {
		let f = fixture();
		let values = literal_tensor();
		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);

		let rotated = eng.rot_cols(&tensor, 1, 10.0).unwrap();
		let decrypted = decrypt_tensor(&f.secret, &rotated).unwrap();

		for (r, row) in values.iter().enumerate() {
			for c in 0..2 {
				for d in 0..3 {
					let expected = row[(c + 1) % 2][d] * 10.0;
					assert_close(decrypted[r][c][d], expected);
				}
			}
		}
	}

	#[test]
	fn rot_cols_zero_with_unit_base_is_the_identity() {
		let f = fixture();
		let tensor = encrypt_tensor(&f.public, &f.pool, &literal_tensor()).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);

		let same = eng.rot_cols(&tensor, 0, 1.0).unwrap();
		// No level is consumed on the fast path.
		assert_eq!(same.level(), tensor.level());

		let lhs = decrypt_tensor(&f.secret, &same).unwrap();
		let rhs = decrypt_tensor(&f.secret, &tensor).unwrap();
		assert_eq!(lhs, rhs);
	}

	#[test]
	fn rot_cols_roundtrips_for_every_step() {
		let f = fixture();
		let values = vec![vec![
			vec![1.0, -1.0],
			vec![2.0, -2.0],
			vec![3.0, -3.0],
			vec![4.0, -4.0],
			vec![5.0, -5.0],
		]];
		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);
		let cols = tensor.cols() as i64;

		for step in -cols..=cols {
			let there = eng.rot_cols(&tensor, step, 1.0).unwrap();
			let back = eng.rot_cols(&there, -step, 1.0).unwrap();
			let decrypted = decrypt_tensor(&f.secret, &back).unwrap();
			for (c, col) in values[0].iter().enumerate() {
				for (d, &v) in col.iter().enumerate() {
					assert_close(decrypted[0][c][d], v);
				}
			}
		}
	}

	#[test]
	fn split_and_merge_reproduce_the_rotation() {
		let f = fixture();
		let values = vec![vec![
			vec![1.0],
			vec![2.0],
			vec![3.0],
			vec![4.0],
			vec![5.0],
		]];
		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);

		for step in [-3i64, -1, 2] {
			let (left, right) = eng.rot_cols_split(&tensor, step).unwrap();
			let merged = eng.merge_rotated(&left, &right, step).unwrap();
			let reference = eng.rot_cols(&tensor, step, 1.0).unwrap();

			let lhs = decrypt_tensor(&f.secret, &merged).unwrap();
			let rhs = decrypt_tensor(&f.secret, &reference).unwrap();
			for (c, col) in lhs[0].iter().enumerate() {
				for (d, &v) in col.iter().enumerate() {
					assert_close(v, rhs[0][c][d]);
				}
			}
		}
	}

	#[test]
	fn vec_mul_mat_applies_gain_then_mix() {
		let f = fixture();
		let values = literal_tensor();
		let before = vec![0.5, 2.0];
		let rear = vec![
			vec![1.0, 0.0],
			vec![0.0, 1.0],
			vec![1.0, -1.0],
		];

		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);
		let result = eng.vec_mul_mat(&tensor, &before, &rear).unwrap();

		let decrypted = decrypt_tensor(&f.secret, &result).unwrap();
		for (r, row) in values.iter().enumerate() {
			for (c, col) in row.iter().enumerate() {
				for out in 0..2 {
					let expected: f64 = (0..3)
						.map(|d| before[c] * col[d] * rear[d][out])
						.sum();
					assert_close(decrypted[r][c][out], expected);
				}
			}
		}
	}

	#[test]
	fn pool_and_add_reduces_each_row() {
		let f = fixture();
		let values = literal_tensor();
		let bias = vec![10.0, 20.0, 30.0];

		let tensor = encrypt_tensor(&f.public, &f.pool, &values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);
		let pooled = eng.pool_and_add(&tensor, &bias).unwrap();

		let decrypted = decrypt_tensor(&f.secret, &pooled).unwrap();
		for (r, row) in values.iter().enumerate() {
			for (d, &b) in bias.iter().enumerate() {
				let expected: f64 = row.iter().map(|col| col[d]).sum::<f64>() + b;
				assert_close(decrypted[r][0][d], expected);
			}
		}
	}

	#[test]
	fn depthwise_dot_contracts_channels() {
		let f = fixture();
		let a_values = literal_tensor();
		let b_values = vec![
			vec![vec![0.5, 1.0, -1.0], vec![2.0, 0.0, 1.0]],
			vec![vec![1.0, 1.0, 1.0], vec![-1.0, 0.5, 0.25]],
		];

		let a = encrypt_tensor(&f.public, &f.pool, &a_values).unwrap();
		let b = encrypt_tensor(&f.public, &f.pool, &b_values).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);

		let dot = eng.depthwise_dot(&a, &b).unwrap();
		let decoded = f
			.secret
			.encoder
			.decode_f64(&f.secret.decryptor.decrypt(&dot).unwrap());

		for r in 0..2 {
			for c in 0..2 {
				let expected: f64 = (0..3)
					.map(|d| a_values[r][c][d] * b_values[r][c][d])
					.sum();
				assert_close(decoded[r * 2 + c], expected);
			}
		}
	}

	#[test]
	fn shape_mismatches_are_rejected() {
		let f = fixture();
		let tensor = encrypt_tensor(&f.public, &f.pool, &literal_tensor()).unwrap();
		let eng = TensorEvaluator::new(&f.public, &f.pool);

		let wrong_depth = vec![vec![1.0, 2.0]; 4];
		let err = eng.mul_plain(&tensor, &wrong_depth).unwrap_err();
		assert!(matches!(err, Error::ShapeMismatch { .. }));

		let wrong_cols = vec![vec![1.0, 2.0, 3.0]; 5];
		let err = eng.add_plain(&tensor, &wrong_cols).unwrap_err();
		assert!(matches!(err, Error::ShapeMismatch { .. }));
	}
}
