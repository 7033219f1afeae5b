//! Plaintext pre-computation that algebraically unfolds the model.
//!
//! Substituting `X₀ = x·W_e + P` into the Q/K/V projections and
//! linearising the post-attention path around the ReLU collapses every
//! affine layer into coefficient bundles that are built once per model
//! and reused across requests. The classifier is pre-divided by a fixed
//! constant so the final ciphertexts stay bounded; decrypted logits are
//! multiplied back up.

use crate::constants::CLASSIFIER_RESCALER;
use crate::linalg::{
	gamma, mat_add, mat_chain_mul, matmul, ones_column, ones_row, row, scale_matrix,
	scale_vector, to_diagonal, transpose, PlainMatrix, PlainVector,
};
use crate::model::DashformerParameters;

/// The model weights rearranged for unfolding: layer-norm gains as `Γ`
/// factors, per-position reciprocal std as `Σ` diagonals, the classifier
/// pre-scaled.
#[derive(Debug, Clone)]
pub struct CoefficientInput {
	pub(crate) one_row: PlainVector,
	pub(crate) one_col: PlainMatrix,

	pub(crate) w_e: PlainMatrix,
	pub(crate) p: PlainMatrix,

	pub(crate) w_q: Vec<PlainMatrix>,
	pub(crate) b_q: Vec<PlainVector>,
	pub(crate) w_k: Vec<PlainMatrix>,
	pub(crate) b_k: Vec<PlainVector>,
	pub(crate) w_v: Vec<PlainMatrix>,
	pub(crate) b_v: Vec<PlainVector>,

	pub(crate) w_c: PlainMatrix,
	pub(crate) b_c: PlainVector,

	pub(crate) w_1: PlainMatrix,
	pub(crate) b_1: PlainVector,
	pub(crate) w_2: PlainMatrix,
	pub(crate) b_2: PlainVector,

	pub(crate) sigma_1_diag: PlainVector,
	pub(crate) sigma_2_diag: PlainVector,
	pub(crate) sigma_1: PlainMatrix,
	pub(crate) sigma_2: PlainMatrix,
	pub(crate) gamma_1: PlainMatrix,
	pub(crate) gamma_2: PlainMatrix,
	pub(crate) beta_1: PlainVector,
	pub(crate) beta_2: PlainVector,

	pub(crate) w_d: PlainMatrix,
	pub(crate) b_d: PlainVector,
}

/// Coefficients of the unfolded post-attention path (§ pre/post-ReLU
/// factors and the pooled constant).
#[derive(Debug, Clone)]
pub struct CoeffDash {
	/// Per-column gain ahead of the ReLU output factor.
	pub relu_before: PlainVector,
	/// Channel-mixing factor behind the ReLU output.
	pub relu_rear: PlainMatrix,

	/// Per-column gain of the head contribution to the pre-activation.
	pub head_before_relu: PlainVector,
	/// Channel mixing of the head contribution to the pre-activation.
	pub head_rear_relu: PlainMatrix,

	/// Per-column gain of the head residual behind the ReLU.
	pub head_before: PlainVector,
	/// Channel mixing of the head residual behind the ReLU.
	pub head_rear: PlainMatrix,

	/// Per-column gain of the `X₀` residual behind the ReLU.
	pub x0_before: PlainVector,
	/// Channel mixing of the `X₀` residual behind the ReLU.
	pub x0_rear: PlainMatrix,

	/// Per-column gain of the `X₀` contribution to the pre-activation.
	pub x0_before_relu: PlainVector,
	/// Channel mixing of the `X₀` contribution to the pre-activation.
	pub x0_rear_relu: PlainMatrix,

	/// Pooled constant addend of the classifier output, length `K`.
	pub constant_dash: PlainVector,
	/// Constant addend of the FFN pre-activation, `S×d_ff`.
	pub constant_relu: PlainMatrix,
}

/// The Q/K/V projections with the embedding absorbed: `A = W_e·W` maps
/// the one-hot input directly, `C = P·W + 𝟙·bᵀ` is the constant part.
#[derive(Debug, Clone)]
pub struct CoeffQkv {
	/// Per-head `A_Q`, `V×dₕ`.
	pub a_q: Vec<PlainMatrix>,
	/// Per-head `A_K`.
	pub a_k: Vec<PlainMatrix>,
	/// Per-head `A_V`.
	pub a_v: Vec<PlainMatrix>,

	/// Per-head `C_Q`, `S×dₕ`.
	pub c_q: Vec<PlainMatrix>,
	/// Per-head `C_K`.
	pub c_k: Vec<PlainMatrix>,
	/// Per-head `C_V`.
	pub c_v: Vec<PlainMatrix>,
}

/// The four-term expansion of the scaled attention logits
/// `(x·A_Q + C_Q)·(x·A_K + C_K)ᵀ · g`, with `g = 1/√(dₕ·c)` folded in.
#[derive(Debug, Clone)]
pub struct CoeffSoftmax {
	/// Per-head `A_Q·A_Kᵀ·g`, `V×V`.
	pub item_1: Vec<PlainMatrix>,
	/// Per-head `A_Q·C_Kᵀ·g`, `V×S`.
	pub item_2: Vec<PlainMatrix>,
	/// Per-head `C_Q·A_Kᵀ·g`, `S×V`.
	pub item_3: Vec<PlainMatrix>,
	/// Per-head `C_Q·C_Kᵀ·g`, `S×S`.
	pub item_4: Vec<PlainMatrix>,
}

/// All coefficient bundles of one model.
#[derive(Debug, Clone)]
pub struct ModelCoefficients {
	/// Unfolded post-attention coefficients.
	pub dash: CoeffDash,
	/// Q/K/V projection coefficients.
	pub qkv: CoeffQkv,
	/// Softmax expansion coefficients.
	pub softmax: CoeffSoftmax,
}

/// Rearranges the model weights into the unfolding inputs.
pub fn build_input(model: &DashformerParameters) -> CoefficientInput {
	let d = model.embedding_matrix[0].len() as f64;
	let s = model.encoding_matrix.len();

	CoefficientInput {
		one_row: ones_row(s),
		one_col: ones_column(s),

		w_e: model.embedding_matrix.clone(),
		p: model.encoding_matrix.clone(),

		w_q: model.query_weights.clone(),
		b_q: model.query_biases.clone(),
		w_k: model.key_weights.clone(),
		b_k: model.key_biases.clone(),
		w_v: model.value_weights.clone(),
		b_v: model.value_biases.clone(),

		w_c: model.combine_weight.clone(),
		b_c: model.combine_bias.clone(),

		w_1: model.ffn_weight_1.clone(),
		b_1: model.ffn_bias_1.clone(),
		w_2: model.ffn_weight_2.clone(),
		b_2: model.ffn_bias_2.clone(),

		sigma_1_diag: scale_vector(&model.layer_norm_inv_std_1, 1.0 / d),
		sigma_2_diag: scale_vector(&model.layer_norm_inv_std_2, 1.0 / d),
		sigma_1: to_diagonal(&scale_vector(&model.layer_norm_inv_std_1, 1.0 / d)),
		sigma_2: to_diagonal(&scale_vector(&model.layer_norm_inv_std_2, 1.0 / d)),
		gamma_1: gamma(d, &model.layer_norm_r1),
		gamma_2: gamma(d, &model.layer_norm_r2),
		beta_1: model.layer_norm_b1.clone(),
		beta_2: model.layer_norm_b2.clone(),

		w_d: scale_matrix(&model.classifier_weight, 1.0 / CLASSIFIER_RESCALER),
		b_d: scale_vector(&model.classifier_bias, 1.0 / CLASSIFIER_RESCALER),
	}
}

/// Collapses the post-attention path (residual, both layer norms, the
/// FFN and the pooled classifier) into the pre- and post-ReLU factors.
pub fn build_dash(input: &CoefficientInput) -> CoeffDash {
	let c_y2 = mat_add(&[
		&mat_chain_mul(&[&input.sigma_1, &input.one_col, &row(&input.b_c), &input.gamma_1]),
		&mat_chain_mul(&[&input.sigma_1, &input.p, &input.gamma_1]),
		&mat_chain_mul(&[&input.one_col, &row(&input.beta_1)]),
	]);

	let constant_relu = mat_add(&[
		&mat_chain_mul(&[&c_y2, &input.w_1]),
		&mat_chain_mul(&[&input.one_col, &row(&input.b_1)]),
	]);

	let one_row = row(&input.one_row);
	let mut constant_dash = mat_add(&[
		&mat_chain_mul(&[&one_row, &input.sigma_2, &c_y2, &input.gamma_2, &input.w_d]),
		&mat_chain_mul(&[
			&one_row,
			&input.sigma_2,
			&input.one_col,
			&row(&input.b_2),
			&input.gamma_2,
			&input.w_d,
		]),
		&mat_chain_mul(&[&one_row, &input.one_col, &row(&input.beta_2), &input.w_d]),
	])
	.remove(0);
	for (value, bias) in constant_dash.iter_mut().zip(input.b_d.iter()) {
		*value += bias;
	}

	CoeffDash {
		relu_before: mat_chain_mul(&[&one_row, &input.sigma_2]).remove(0),
		relu_rear: mat_chain_mul(&[&input.w_2, &input.gamma_2, &input.w_d]),

		head_before_relu: input.sigma_1_diag.clone(),
		head_rear_relu: mat_chain_mul(&[&input.w_c, &input.gamma_1, &input.w_1]),

		head_before: mat_chain_mul(&[&one_row, &input.sigma_2, &input.sigma_1]).remove(0),
		head_rear: mat_chain_mul(&[&input.w_c, &input.gamma_1, &input.gamma_2, &input.w_d]),

		x0_before: mat_chain_mul(&[&one_row, &input.sigma_2, &input.sigma_1]).remove(0),
		x0_rear: mat_chain_mul(&[&input.w_e, &input.gamma_1, &input.gamma_2, &input.w_d]),

		x0_before_relu: input.sigma_1_diag.clone(),
		x0_rear_relu: mat_chain_mul(&[&input.w_e, &input.gamma_1, &input.w_1]),

		constant_dash,
		constant_relu,
	}
}

/// Absorbs the embedding and positional encoding into the per-head
/// Q/K/V projections.
pub fn build_qkv(input: &CoefficientInput) -> CoeffQkv {
	let heads = input.w_q.len();
	let mut qkv = CoeffQkv {
		a_q: Vec::with_capacity(heads),
		a_k: Vec::with_capacity(heads),
		a_v: Vec::with_capacity(heads),
		c_q: Vec::with_capacity(heads),
		c_k: Vec::with_capacity(heads),
		c_v: Vec::with_capacity(heads),
	};

	for h in 0..heads {
		qkv.a_q.push(mat_chain_mul(&[&input.w_e, &input.w_q[h]]));
		qkv.a_k.push(mat_chain_mul(&[&input.w_e, &input.w_k[h]]));
		qkv.a_v.push(mat_chain_mul(&[&input.w_e, &input.w_v[h]]));

		qkv.c_q.push(mat_add(&[
			&mat_chain_mul(&[&input.p, &input.w_q[h]]),
			&mat_chain_mul(&[&input.one_col, &row(&input.b_q[h])]),
		]));
		qkv.c_k.push(mat_add(&[
			&mat_chain_mul(&[&input.p, &input.w_k[h]]),
			&mat_chain_mul(&[&input.one_col, &row(&input.b_k[h])]),
		]));
		qkv.c_v.push(mat_add(&[
			&mat_chain_mul(&[&input.p, &input.w_v[h]]),
			&mat_chain_mul(&[&input.one_col, &row(&input.b_v[h])]),
		]));
	}
	qkv
}

/// Expands the scaled logit bilinear form into its four coefficient
/// matrices, folding in `g = 1/√(dₕ·c)` per head.
pub fn build_softmax(qkv: &CoeffQkv, softmax_c: &[f64]) -> CoeffSoftmax {
	let heads = qkv.a_q.len();
	let mut softmax = CoeffSoftmax {
		item_1: Vec::with_capacity(heads),
		item_2: Vec::with_capacity(heads),
		item_3: Vec::with_capacity(heads),
		item_4: Vec::with_capacity(heads),
	};

	for h in 0..heads {
		let head_dim = qkv.a_q[h][0].len() as f64;
		let g = 1.0 / (head_dim * softmax_c[h]).sqrt();

		let a_k_t = transpose(&qkv.a_k[h]);
		let c_k_t = transpose(&qkv.c_k[h]);

		softmax
			.item_1
			.push(scale_matrix(&matmul(&qkv.a_q[h], &a_k_t), g));
		softmax
			.item_2
			.push(scale_matrix(&matmul(&qkv.a_q[h], &c_k_t), g));
		softmax
			.item_3
			.push(scale_matrix(&matmul(&qkv.c_q[h], &a_k_t), g));
		softmax
			.item_4
			.push(scale_matrix(&matmul(&qkv.c_q[h], &c_k_t), g));
	}
	softmax
}

/// Builds every coefficient bundle for a model.
pub fn build_coefficients(model: &DashformerParameters) -> ModelCoefficients {
	let input = build_input(model);
	let dash = build_dash(&input);
	let qkv = build_qkv(&input);
	let softmax = build_softmax(&qkv, &model.softmax_c);
	ModelCoefficients {
		dash,
		qkv,
		softmax,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::linalg::{matmul, transpose};
	use crate::testing::{assert_matrix_close, random_matrix, tiny_model, TinyDims};
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	/// `x·A_Q + C_Q` must equal `(x·W_e + P)·W_Q + 𝟙·b_Qᵀ` for every head.
	#[test]
	fn projection_coefficients_match_direct_path() {
		let dims = TinyDims::default();
		let model = tiny_model(7, &dims);
		let input = build_input(&model);
		let qkv = build_qkv(&input);
		let mut rng = StdRng::seed_from_u64(17);

		let x = random_matrix(&mut rng, dims.seq, dims.vocab);
		let x0 = mat_add(&[&matmul(&x, &model.embedding_matrix), &model.encoding_matrix]);

		for h in 0..dims.heads {
			let folded = mat_add(&[&matmul(&x, &qkv.a_q[h]), &qkv.c_q[h]]);
			let direct = mat_add(&[
				&matmul(&x0, &model.query_weights[h]),
				&mat_chain_mul(&[&ones_column(dims.seq), &row(&model.query_biases[h])]),
			]);
			assert_matrix_close(&folded, &direct, 1e-10);
		}
	}

	/// The four-term expansion must reproduce the scaled logit matrix for
	/// random inputs.
	#[test]
	fn softmax_expansion_matches_bilinear_form() {
		let dims = TinyDims::default();
		let model = tiny_model(11, &dims);
		let input = build_input(&model);
		let qkv = build_qkv(&input);
		let softmax = build_softmax(&qkv, &model.softmax_c);
		let mut rng = StdRng::seed_from_u64(23);

		for _trial in 0..3 {
			let x = random_matrix(&mut rng, dims.seq, dims.vocab);
			let x0 = mat_add(&[&matmul(&x, &model.embedding_matrix), &model.encoding_matrix]);

			for h in 0..dims.heads {
				let g = 1.0 / (dims.head_dim as f64 * model.softmax_c[h]).sqrt();
				let q = mat_add(&[
					&matmul(&x0, &model.query_weights[h]),
					&mat_chain_mul(&[&ones_column(dims.seq), &row(&model.query_biases[h])]),
				]);
				let k = mat_add(&[
					&matmul(&x0, &model.key_weights[h]),
					&mat_chain_mul(&[&ones_column(dims.seq), &row(&model.key_biases[h])]),
				]);
				let expected = scale_matrix(&matmul(&q, &transpose(&k)), g);

				let expanded = mat_add(&[
					&mat_chain_mul(&[&x, &softmax.item_1[h], &transpose(&x)]),
					&matmul(&x, &softmax.item_2[h]),
					&matmul(&softmax.item_3[h], &transpose(&x)),
					&softmax.item_4[h],
				]);
				assert_matrix_close(&expanded, &expected, 1e-10);
			}
		}
	}

	fn apply_poly(value: f64, coeffs: &[f64]) -> f64 {
		coeffs.iter().rev().fold(0.0, |acc, &c| acc * value + c)
	}

	fn poly_matrix(m: &PlainMatrix, coeffs: &[f64]) -> PlainMatrix {
		m.iter()
			.map(|row| row.iter().map(|&v| apply_poly(v, coeffs)).collect())
			.collect()
	}

	fn diag_rows(gains: &[f64], m: &PlainMatrix) -> PlainMatrix {
		m.iter()
			.enumerate()
			.map(|(i, row)| row.iter().map(|v| gains[i] * v).collect())
			.collect()
	}

	fn layer_norm_rows(
		m: &PlainMatrix,
		r: &[f64],
		b: &[f64],
		inv_std: &[f64],
		dim: f64,
	) -> PlainMatrix {
		m.iter()
			.enumerate()
			.map(|(i, row)| {
				let sum: f64 = row.iter().sum();
				row.iter()
					.enumerate()
					.map(|(j, &v)| (dim * v - sum) * r[j] * inv_std[i] / dim + b[j])
					.collect()
			})
			.collect()
	}

	fn broadcast_bias(bias: &[f64], rows: usize) -> PlainMatrix {
		mat_chain_mul(&[&ones_column(rows), &row(bias)])
	}

	/// Invariant 8: on plaintext inputs, the unfolded coefficients must
	/// reproduce the layered post-attention pipeline (with the ReLU
	/// replaced by its polynomial) up to floating-point error.
	#[test]
	fn unfolded_path_matches_layered_pipeline() {
		let dims = TinyDims::default();
		let model = tiny_model(29, &dims);
		let input = build_input(&model);
		let dash = build_dash(&input);
		let mut rng = StdRng::seed_from_u64(31);

		let x = random_matrix(&mut rng, dims.seq, dims.vocab);
		let head = random_matrix(&mut rng, dims.seq, dims.dim);
		let x0 = mat_add(&[&matmul(&x, &model.embedding_matrix), &model.encoding_matrix]);
		let dim = dims.dim as f64;

		// Layered reference: Add → LN1 → FFN(poly ReLU) → Add → LN2 →
		// classifier → pool, with the classifier pre-scaled as deployed.
		let combined = mat_add(&[
			&matmul(&head, &model.combine_weight),
			&broadcast_bias(&model.combine_bias, dims.seq),
			&x0,
		]);
		let z1 = layer_norm_rows(
			&combined,
			&model.layer_norm_r1,
			&model.layer_norm_b1,
			&model.layer_norm_inv_std_1,
			dim,
		);
		let pre_reference = mat_add(&[
			&matmul(&z1, &model.ffn_weight_1),
			&broadcast_bias(&model.ffn_bias_1, dims.seq),
		]);
		let relu = poly_matrix(&pre_reference, &model.relu_coefficients);
		let after_ffn = mat_add(&[
			&z1,
			&matmul(&relu, &model.ffn_weight_2),
			&broadcast_bias(&model.ffn_bias_2, dims.seq),
		]);
		let z2 = layer_norm_rows(
			&after_ffn,
			&model.layer_norm_r2,
			&model.layer_norm_b2,
			&model.layer_norm_inv_std_2,
			dim,
		);
		let scaled_classifier = scale_matrix(&model.classifier_weight, 1.0 / CLASSIFIER_RESCALER);
		let per_position = matmul(&z2, &scaled_classifier);
		let mut reference = vec![0.0; dims.classes];
		for row in &per_position {
			for (k, v) in row.iter().enumerate() {
				reference[k] += v;
			}
		}
		for (k, v) in reference.iter_mut().enumerate() {
			*v += model.classifier_bias[k] / CLASSIFIER_RESCALER;
		}

		// Unfolded path on the same plaintext inputs.
		let pre_unfolded = mat_add(&[
			&diag_rows(&dash.head_before_relu, &matmul(&head, &dash.head_rear_relu)),
			&diag_rows(&dash.x0_before_relu, &matmul(&x, &dash.x0_rear_relu)),
			&dash.constant_relu,
		]);
		assert_matrix_close(&pre_unfolded, &pre_reference, 1e-9);

		let relu_unfolded = poly_matrix(&pre_unfolded, &model.relu_coefficients);
		let pooled_terms = mat_add(&[
			&diag_rows(&dash.relu_before, &matmul(&relu_unfolded, &dash.relu_rear)),
			&diag_rows(&dash.head_before, &matmul(&head, &dash.head_rear)),
			&diag_rows(&dash.x0_before, &matmul(&x, &dash.x0_rear)),
		]);
		let mut unfolded = dash.constant_dash.clone();
		for row in &pooled_terms {
			for (k, v) in row.iter().enumerate() {
				unfolded[k] += v;
			}
		}

		for (a, b) in unfolded.iter().zip(reference.iter()) {
			assert!((a - b).abs() < 1e-9, "{a} != {b}");
		}
	}
}
