//! Dense plaintext linear algebra used by the coefficient pre-computation.
//!
//! Everything here runs once per model on small matrices; clarity wins
//! over blocking or vectorisation. Dimensional conformance of internal
//! chains is asserted, file-shaped inputs are validated by the readers
//! before they get here.

use crate::{Error, Result};

/// A real matrix, row major.
pub type PlainMatrix = Vec<Vec<f64>>;

/// A real vector.
pub type PlainVector = Vec<f64>;

/// Returns the transpose of `m`.
pub fn transpose(m: &PlainMatrix) -> PlainMatrix {
	if m.is_empty() || m[0].is_empty() {
		return Vec::new();
	}
	let rows = m.len();
	let cols = m[0].len();
	let mut out = vec![vec![0.0; rows]; cols];
	for (i, row) in m.iter().enumerate() {
		for (j, &v) in row.iter().enumerate() {
			out[j][i] = v;
		}
	}
	out
}

/// Multiplies `a · b`.
pub fn matmul(a: &PlainMatrix, b: &PlainMatrix) -> PlainMatrix {
	assert!(!a.is_empty() && !b.is_empty());
	assert_eq!(a[0].len(), b.len(), "inner dimensions disagree");
	let rows = a.len();
	let inner = b.len();
	let cols = b[0].len();
	let mut out = vec![vec![0.0; cols]; rows];
	for i in 0..rows {
		for k in 0..inner {
			let aik = a[i][k];
			if aik == 0.0 {
				continue;
			}
			for j in 0..cols {
				out[i][j] += aik * b[k][j];
			}
		}
	}
	out
}

/// Multiplies a chain of matrices left to right.
pub fn mat_chain_mul(chain: &[&PlainMatrix]) -> PlainMatrix {
	assert!(!chain.is_empty());
	let mut result = chain[0].clone();
	for m in &chain[1..] {
		result = matmul(&result, m);
	}
	result
}

/// Adds matrices of identical shape.
pub fn mat_add(chain: &[&PlainMatrix]) -> PlainMatrix {
	assert!(!chain.is_empty());
	let mut result = chain[0].clone();
	for m in &chain[1..] {
		assert_eq!(result.len(), m.len());
		for (row, other) in result.iter_mut().zip(m.iter()) {
			assert_eq!(row.len(), other.len());
			for (v, &o) in row.iter_mut().zip(other.iter()) {
				*v += o;
			}
		}
	}
	result
}

/// Wraps a vector as a `1×n` row matrix.
pub fn row(v: &[f64]) -> PlainMatrix {
	vec![v.to_vec()]
}

/// An `n×1` column of ones.
pub fn ones_column(n: usize) -> PlainMatrix {
	vec![vec![1.0]; n]
}

/// A vector of `n` ones.
pub fn ones_row(n: usize) -> PlainVector {
	vec![1.0; n]
}

/// The `n×n` identity.
pub fn identity(n: usize) -> PlainMatrix {
	let mut out = vec![vec![0.0; n]; n];
	for (i, row) in out.iter_mut().enumerate() {
		row[i] = 1.0;
	}
	out
}

/// Places a vector on the diagonal of a square matrix.
pub fn to_diagonal(diag: &[f64]) -> PlainMatrix {
	let n = diag.len();
	let mut out = vec![vec![0.0; n]; n];
	for (i, row) in out.iter_mut().enumerate() {
		row[i] = diag[i];
	}
	out
}

/// The centring-and-gain factor of an unfolded layer norm over `d`
/// features: `(d·I − 𝟙𝟙ᵀ) · diag(r)`.
pub fn gamma(d: f64, r: &[f64]) -> PlainMatrix {
	let n = r.len();
	let mut out = vec![vec![0.0; n]; n];
	for (i, row) in out.iter_mut().enumerate() {
		for (j, v) in row.iter_mut().enumerate() {
			let centred = if i == j { d - 1.0 } else { -1.0 };
			*v = centred * r[j];
		}
	}
	out
}

/// Scales every entry of a matrix.
pub fn scale_matrix(m: &PlainMatrix, factor: f64) -> PlainMatrix {
	m.iter()
		.map(|row| row.iter().map(|v| v * factor).collect())
		.collect()
}

/// Scales every entry of a vector.
pub fn scale_vector(v: &[f64], factor: f64) -> PlainVector {
	v.iter().map(|x| x * factor).collect()
}

/// Concatenates `count` copies of a vector.
pub fn repeat_vector(v: &[f64], count: usize) -> PlainVector {
	let mut out = Vec::with_capacity(v.len() * count);
	for _ in 0..count {
		out.extend_from_slice(v);
	}
	out
}

/// Inverts a square matrix by Gauss-Jordan elimination with partial
/// pivoting. Returns `None` for non-square or singular inputs.
pub fn invert(m: &PlainMatrix) -> Option<PlainMatrix> {
	let n = m.len();
	if n == 0 || m.iter().any(|row| row.len() != n) {
		return None;
	}

	let mut a = m.clone();
	let mut inv = identity(n);

	for col in 0..n {
		let pivot = (col..n).max_by(|&i, &j| {
			a[i][col]
				.abs()
				.partial_cmp(&a[j][col].abs())
				.unwrap_or(std::cmp::Ordering::Equal)
		})?;
		if a[pivot][col].abs() < 1e-12 {
			return None;
		}
		a.swap(col, pivot);
		inv.swap(col, pivot);

		let lead = a[col][col];
		for j in 0..n {
			a[col][j] /= lead;
			inv[col][j] /= lead;
		}
		for i in 0..n {
			if i == col {
				continue;
			}
			let factor = a[i][col];
			if factor == 0.0 {
				continue;
			}
			for j in 0..n {
				a[i][j] -= factor * a[col][j];
				inv[i][j] -= factor * inv[col][j];
			}
		}
	}
	Some(inv)
}

/// Rotates each column of `m` upward by `steps` positions (cyclically).
pub fn rotate_matrix_cols(m: &PlainMatrix, steps: i64) -> PlainMatrix {
	if m.is_empty() || m[0].is_empty() {
		return m.clone();
	}
	let rows = m.len() as i64;
	let k = (((steps % rows) + rows) % rows) as usize;
	let mut out = Vec::with_capacity(m.len());
	for i in 0..m.len() {
		out.push(m[(i + k) % m.len()].clone());
	}
	out
}

/// Rotates each row of `m` leftward by `steps` positions (cyclically).
pub fn rotate_matrix_rows(m: &PlainMatrix, steps: i64) -> PlainMatrix {
	if m.is_empty() || m[0].is_empty() {
		return m.clone();
	}
	let cols = m[0].len() as i64;
	let k = (((steps % cols) + cols) % cols) as usize;
	m.iter()
		.map(|r| {
			let mut row = Vec::with_capacity(r.len());
			for i in 0..r.len() {
				row.push(r[(i + k) % r.len()]);
			}
			row
		})
		.collect()
}

/// Extracts the `index`-th diagonal of a square matrix, read starting
/// from row offset `rot` (the alignment the BSGS loop sees the matrix
/// under after its giant rotation).
pub fn diag_rot_vector(m: &PlainMatrix, index: usize, rot: i64) -> Result<PlainVector> {
	let n = m.len();
	if n == 0 || m.iter().any(|row| row.len() != n) {
		return Err(Error::shape(
			"diag_rot_vector",
			"square matrix",
			format!("{}x{}", n, m.first().map_or(0, Vec::len)),
		));
	}
	let k = ((rot % n as i64 + n as i64) % n as i64) as usize;
	let mut out = Vec::with_capacity(n);
	for i in 0..n {
		out.push(m[(i + k) % n][(index + i + k) % n]);
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chain_multiply_matches_manual_product() {
		let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
		let b = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
		let c = identity(2);

		let prod = mat_chain_mul(&[&a, &b, &c]);
		assert_eq!(prod, vec![vec![2.0, 1.0], vec![4.0, 3.0]]);
	}

	#[test]
	fn gamma_centres_and_scales() {
		let g = gamma(3.0, &[2.0, 1.0, 1.0]);
		// (3I - ones) has 2 on the diagonal and -1 elsewhere.
		assert_eq!(g[0], vec![4.0, -1.0, -1.0]);
		assert_eq!(g[1], vec![-2.0, 2.0, -1.0]);
	}

	#[test]
	fn invert_recovers_identity() {
		let m = vec![
			vec![4.0, 7.0, 2.0],
			vec![3.0, 6.0, 1.0],
			vec![2.0, 5.0, 3.0],
		];
		let inv = invert(&m).unwrap();
		let prod = matmul(&m, &inv);
		for (i, row) in prod.iter().enumerate() {
			for (j, v) in row.iter().enumerate() {
				let expected = if i == j { 1.0 } else { 0.0 };
				assert!((v - expected).abs() < 1e-9);
			}
		}
	}

	#[test]
	fn invert_rejects_singular() {
		let m = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
		assert!(invert(&m).is_none());
	}

	#[test]
	fn row_and_column_rotations() {
		let m = vec![
			vec![1.0, 2.0, 3.0],
			vec![4.0, 5.0, 6.0],
			vec![7.0, 8.0, 9.0],
		];
		assert_eq!(rotate_matrix_rows(&m, 1)[0], vec![2.0, 3.0, 1.0]);
		assert_eq!(rotate_matrix_cols(&m, 1)[0], vec![4.0, 5.0, 6.0]);
		assert_eq!(rotate_matrix_cols(&m, -1)[0], vec![7.0, 8.0, 9.0]);
	}

	#[test]
	fn diagonals_wrap() {
		let m = vec![
			vec![1.0, 2.0, 3.0],
			vec![4.0, 5.0, 6.0],
			vec![7.0, 8.0, 9.0],
		];
		assert_eq!(diag_rot_vector(&m, 0, 0).unwrap(), vec![1.0, 5.0, 9.0]);
		assert_eq!(diag_rot_vector(&m, 1, 0).unwrap(), vec![2.0, 6.0, 7.0]);
		assert_eq!(diag_rot_vector(&m, 1, -1).unwrap(), vec![7.0, 2.0, 6.0]);
	}
}
