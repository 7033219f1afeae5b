//! Baby-step/giant-step self-attention over ciphertext tensors.
//!
//! The logit matrix is consumed diagonal by diagonal: a column shift
//! `s = giant·b + baby` selects one diagonal, so only `g` giant rotations
//! of `X₀` and `b` baby rotations of `X₀ᵀ` and `V` are ever materialised,
//! instead of one rotation per diagonal. Each diagonal is assembled from
//! the four coefficient terms of the logit expansion, pushed through the
//! squared softmax surrogate and multiply-accumulated against the rotated
//! `V`; the per-giant accumulators are rotated back and summed in giant
//! order so the reduction is deterministic.

use rayon::prelude::*;

use crate::coefficient::ModelCoefficients;
use crate::linalg::{
	diag_rot_vector, repeat_vector, rotate_matrix_cols, rotate_matrix_rows, PlainMatrix,
};
use crate::tensor::{CiphertextTensor, TensorEvaluator};
use crate::{Error, Result};

/// The giant- and baby-axis rotation pre-computes of `X₀`, shared by all
/// heads of one request.
pub struct AttentionRotations {
	/// `rot_cols(X₀, -i·b)` per giant step, materialised.
	pub x0_rot: Vec<CiphertextTensor>,
	/// `rot_cols(X₀, +j)` per baby step.
	pub x0t_rot: Vec<CiphertextTensor>,
	/// Unmasked non-wrapping rotation halves per giant step.
	pub left: Vec<CiphertextTensor>,
	/// Unmasked wrapping rotation halves per giant step.
	pub right: Vec<CiphertextTensor>,
}

/// One head's slice of the coefficient bundles, plus its softmax shift.
pub struct HeadCoefficients<'a> {
	item_1: &'a PlainMatrix,
	item_2: &'a PlainMatrix,
	item_3: &'a PlainMatrix,
	item_4: &'a PlainMatrix,
	a_v: &'a PlainMatrix,
	c_v: &'a PlainMatrix,
	beta: f64,
}

impl<'a> HeadCoefficients<'a> {
	/// Borrows head `h` from the model coefficients. `beta` is the
	/// additive softmax constant `b/√c` of this head.
	pub fn new(coefficients: &'a ModelCoefficients, h: usize, beta: f64) -> Self {
		Self {
			item_1: &coefficients.softmax.item_1[h],
			item_2: &coefficients.softmax.item_2[h],
			item_3: &coefficients.softmax.item_3[h],
			item_4: &coefficients.softmax.item_4[h],
			a_v: &coefficients.qkv.a_v[h],
			c_v: &coefficients.qkv.c_v[h],
			beta,
		}
	}
}

/// Softmax surrogate constants of one head.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxParams {
	/// Additive constant `b`.
	pub b: f64,
	/// Normaliser `c`; its square root scales both the logits and `b`.
	pub c: f64,
}

/// Generates the rotation pre-computes of `X₀` for the BSGS loops.
pub fn precompute_rotations(
	eng: &TensorEvaluator,
	x0: &CiphertextTensor,
	baby: usize,
	giant: usize,
) -> Result<AttentionRotations> {
	if baby * giant < x0.cols() {
		return Err(Error::shape(
			"precompute_rotations",
			format!("baby*giant >= {}", x0.cols()),
			baby * giant,
		));
	}

	let giant_parts: Vec<Result<(CiphertextTensor, CiphertextTensor, CiphertextTensor)>> =
		eng.pool().install(|| {
			(0..giant)
				.into_par_iter()
				.map(|i| {
					let shift = -((i * baby) as i64);
					let (left, right) = eng.rot_cols_split(x0, shift)?;
					let merged = eng.merge_rotated(&left, &right, shift)?;
					Ok((left, right, merged))
				})
				.collect()
		});

	let baby_parts: Vec<Result<CiphertextTensor>> = eng.pool().install(|| {
		(0..baby)
			.into_par_iter()
			.map(|j| eng.rot_cols(x0, j as i64, 1.0))
			.collect()
	});

	let mut x0_rot = Vec::with_capacity(giant);
	let mut left = Vec::with_capacity(giant);
	let mut right = Vec::with_capacity(giant);
	for part in giant_parts {
		let (l, r, merged) = part?;
		left.push(l);
		right.push(r);
		x0_rot.push(merged);
	}
	let x0t_rot = baby_parts.into_iter().collect::<Result<Vec<_>>>()?;

	Ok(AttentionRotations {
		x0_rot,
		x0t_rot,
		left,
		right,
	})
}

/// Computes one head's attention output directly from `X₀` and the
/// coefficient bundles, without materialising `Q` or `K`.
pub fn fused_attention(
	eng: &TensorEvaluator,
	x0: &CiphertextTensor,
	rotations: &AttentionRotations,
	head: &HeadCoefficients,
	baby: usize,
	giant: usize,
) -> Result<CiphertextTensor> {
	let (rows, cols, _) = x0.shape();
	if rotations.left.len() < giant || rotations.x0t_rot.len() < baby {
		return Err(Error::shape(
			"fused_attention",
			format!("{} giant and {} baby rotations", giant, baby),
			format!("{}/{}", rotations.left.len(), rotations.x0t_rot.len()),
		));
	}

	let v = eng.mul_plain_add_plain(x0, head.a_v, head.c_v)?;
	let v_depth = v.depth();

	let v_rot: Vec<CiphertextTensor> = {
		let rotated: Vec<Result<CiphertextTensor>> = eng.pool().install(|| {
			(0..baby)
				.into_par_iter()
				.map(|j| eng.rot_cols(&v, j as i64, 1.0))
				.collect()
		});
		rotated.into_iter().collect::<Result<Vec<_>>>()?
	};

	let giants: Vec<Result<CiphertextTensor>> = eng.pool().install(|| {
		(0..giant)
			.into_par_iter()
			.map(|i| {
				let shift = (i * baby) as i64;
				let mut acc = eng.allocate_zero_tensor(rows, cols, v_depth, v.level())?;

				// rot_{-ib}(X₀·I₁ + I₃), assembled once per giant step.
				let base = eng.merge_rotated_mul_plain(
					&rotations.left[i],
					&rotations.right[i],
					head.item_1,
					-shift,
				)?;
				let base = eng.add_plain(&base, &rotate_matrix_cols(head.item_3, -shift))?;

				for j in 0..baby {
					let s = i * baby + j;
					if s >= cols {
						continue;
					}

					let direct = eng.depthwise_dot(&base, &rotations.x0t_rot[j])?;
					let mixed = eng.depthwise_dot_plain(
						&rotations.x0_rot[i],
						&rotate_matrix_rows(head.item_2, j as i64),
					)?;
					let mut logits = eng.he().add(&direct, &mixed)?;

					let constant =
						repeat_vector(&diag_rot_vector(head.item_4, s, -shift)?, rows);
					logits = eng.he().add_plain(&logits, &constant)?;

					let activated = eng.softmax_approx_ciphertext(&logits, head.beta)?;
					eng.mac_broadcast(&activated, &v_rot[j], &mut acc)?;
				}

				eng.rot_cols(&acc, shift, 1.0)
			})
			.collect()
	});

	reduce_in_order(eng, giants)
}

/// BSGS attention over already materialised `Q`, `K`, `V` tensors. With
/// `softmax` unset the raw bilinear form `Q·Kᵀ·V` is accumulated, which
/// is how the operator is calibrated against plaintext references.
pub fn attention_from_qkv(
	eng: &TensorEvaluator,
	q: &CiphertextTensor,
	k: &CiphertextTensor,
	v: &CiphertextTensor,
	baby: usize,
	giant: usize,
	softmax: Option<SoftmaxParams>,
) -> Result<CiphertextTensor> {
	if q.shape() != k.shape() || q.shape() != v.shape() {
		return Err(Error::shape(
			"attention_from_qkv",
			format!("{:?}", q.shape()),
			format!("{:?} / {:?}", k.shape(), v.shape()),
		));
	}
	let (rows, cols, depth) = q.shape();
	if baby * giant < cols {
		return Err(Error::shape(
			"attention_from_qkv",
			format!("baby*giant >= {}", cols),
			baby * giant,
		));
	}

	// The 1/√(dₕ·c) logit scaling rides along on the K rotations.
	let k_base = match softmax {
		Some(params) => 1.0 / ((depth as f64).sqrt() * params.c.sqrt()),
		None => 1.0,
	};

	let q_rot = rotate_all(eng, q, giant, |i| (-((i * baby) as i64), 1.0))?;
	let k_rot = rotate_all(eng, k, baby, |j| (j as i64, k_base))?;
	let v_rot = rotate_all(eng, v, baby, |j| (j as i64, 1.0))?;

	let giants: Vec<Result<CiphertextTensor>> = eng.pool().install(|| {
		(0..giant)
			.into_par_iter()
			.map(|i| {
				let shift = (i * baby) as i64;
				let mut acc = eng.allocate_zero_tensor(rows, cols, depth, v.level())?;

				for j in 0..baby {
					if i * baby + j >= cols {
						continue;
					}
					let mut diagonal = eng.depthwise_dot(&q_rot[i], &k_rot[j])?;
					if let Some(params) = softmax {
						diagonal = eng
							.softmax_approx_ciphertext(&diagonal, params.b / params.c.sqrt())?;
					}
					eng.mac_broadcast(&diagonal, &v_rot[j], &mut acc)?;
				}

				eng.rot_cols(&acc, shift, 1.0)
			})
			.collect()
	});

	reduce_in_order(eng, giants)
}

fn rotate_all(
	eng: &TensorEvaluator,
	tensor: &CiphertextTensor,
	count: usize,
	step: impl Fn(usize) -> (i64, f64) + Sync,
) -> Result<Vec<CiphertextTensor>> {
	let rotated: Vec<Result<CiphertextTensor>> = eng.pool().install(|| {
		(0..count)
			.into_par_iter()
			.map(|i| {
				let (shift, base) = step(i);
				eng.rot_cols(tensor, shift, base)
			})
			.collect()
	});
	rotated.into_iter().collect()
}

fn reduce_in_order(
	eng: &TensorEvaluator,
	parts: Vec<Result<CiphertextTensor>>,
) -> Result<CiphertextTensor> {
	let mut parts = parts.into_iter();
	let first = parts.next().ok_or_else(|| {
		Error::shape("attention", "at least one giant step", 0)
	})?;
	let mut total = first?;
	for part in parts {
		total = eng.add(&total, &part?)?;
	}
	Ok(total)
}
