//! The unfolded post-attention evaluator: residual, both layer norms,
//! the feed-forward block and the pooled classifier collapsed into the
//! pre-computed coefficient factors, leaving the ReLU polynomial as the
//! only non-affine stage.

use crate::coefficient::CoeffDash;
use crate::tensor::{CiphertextTensor, TensorEvaluator};
use crate::Result;

/// Applies the unfolded post-attention path to the concatenated head
/// output and the input tensor. The result is an `S×K`-shaped tensor
/// whose first column per row carries the (pre-rescaler) logits.
pub fn evaluate_unfolded(
	eng: &TensorEvaluator,
	coeff: &CoeffDash,
	head: &CiphertextTensor,
	x0: &CiphertextTensor,
	relu_coeffs: &[f64],
	relu_domain: (f64, f64),
) -> Result<CiphertextTensor> {
	let head_pre = eng.vec_mul_mat(head, &coeff.head_before_relu, &coeff.head_rear_relu)?;
	let x0_pre = eng.vec_mul_mat(x0, &coeff.x0_before_relu, &coeff.x0_rear_relu)?;
	let pre = eng.add(&head_pre, &x0_pre)?;
	let pre = eng.add_plain(&pre, &coeff.constant_relu)?;

	let relu = eng.poly(&pre, relu_coeffs, relu_domain)?;
	let relu_post = eng.vec_mul_mat(&relu, &coeff.relu_before, &coeff.relu_rear)?;

	let head_post = eng.vec_mul_mat(head, &coeff.head_before, &coeff.head_rear)?;
	let x0_post = eng.vec_mul_mat(x0, &coeff.x0_before, &coeff.x0_rear)?;

	let combined = eng.add3(&relu_post, &head_post, &x0_post)?;
	eng.pool_and_add(&combined, &coeff.constant_dash)
}
