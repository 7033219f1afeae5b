//! Pointwise approximations over ciphertext tensors: polynomial
//! evaluation, the squared softmax surrogate and the layer norms.

use rayon::prelude::*;

use dashformer_ckks::Ciphertext;

use crate::linalg::{repeat_vector, scale_vector};
use crate::tensor::{CiphertextTensor, TensorEvaluator};
use crate::{Error, Result};

enum PolyTerm {
	Constant(f64),
	Cipher(Ciphertext),
}

impl TensorEvaluator<'_> {
	/// Evaluates a univariate polynomial (monomial coefficients, low
	/// degree first, fitted over `domain`) on a single ciphertext with a
	/// Paterson-Stockmeyer split: the power basis `x^(2^k)` is squared up
	/// front and the halves recombine with one multiplication per split,
	/// so the level cost is `⌈log₂(deg+1)⌉`.
	pub fn poly_ciphertext(
		&self,
		ct: &Ciphertext,
		coeffs: &[f64],
		domain: (f64, f64),
	) -> Result<Ciphertext> {
		if coeffs.is_empty() {
			return Err(Error::shape("poly", "at least one coefficient", 0));
		}
		if domain.0 >= domain.1 {
			return Err(Error::shape(
				"poly",
				"an increasing domain",
				format!("[{}, {}]", domain.0, domain.1),
			));
		}

		let he = self.he();
		let degree = coeffs.len() - 1;

		let mut powers = vec![ct.clone()];
		let mut width = 1;
		while width * 2 <= degree {
			let last = &powers[powers.len() - 1];
			let mut square = he.multiply_relin(last, last)?;
			he.rescale(&mut square)?;
			powers.push(square);
			width *= 2;
		}

		match self.eval_poly_split(coeffs, &powers)? {
			PolyTerm::Cipher(result) => Ok(result),
			PolyTerm::Constant(c) => {
				let zero = he.multiply_scalar_int(ct, 0)?;
				Ok(he.add_scalar(&zero, c)?)
			}
		}
	}

	fn eval_poly_split(&self, coeffs: &[f64], powers: &[Ciphertext]) -> Result<PolyTerm> {
		let he = self.he();
		match coeffs.len() {
			0 => Ok(PolyTerm::Constant(0.0)),
			1 => Ok(PolyTerm::Constant(coeffs[0])),
			_ => {
				let degree = coeffs.len() - 1;
				let mut split = 1usize;
				while split * 2 <= degree {
					split *= 2;
				}

				let low = self.eval_poly_split(&coeffs[..split], powers)?;
				let high = self.eval_poly_split(&coeffs[split..], powers)?;
				let power = &powers[split.trailing_zeros() as usize];

				let mut high_ct = match high {
					PolyTerm::Constant(c) => he.multiply_scalar(power, c)?,
					PolyTerm::Cipher(h) => he.multiply_relin(&h, power)?,
				};
				he.rescale(&mut high_ct)?;

				let combined = match low {
					PolyTerm::Constant(c) => he.add_scalar(&high_ct, c)?,
					PolyTerm::Cipher(l) => he.add(&l, &high_ct)?,
				};
				Ok(PolyTerm::Cipher(combined))
			}
		}
	}

	/// Applies the polynomial to every channel of a tensor.
	pub fn poly(
		&self,
		tensor: &CiphertextTensor,
		coeffs: &[f64],
		domain: (f64, f64),
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		let results: Vec<Result<Ciphertext>> = self.pool().install(|| {
			(0..depth)
				.into_par_iter()
				.map(|d| self.poly_ciphertext(tensor.ciphertext(d), coeffs, domain))
				.collect()
		});
		let ciphertexts = results.into_iter().collect::<Result<Vec<_>>>()?;
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}

	/// The softmax surrogate `(x + β)²`. The division by the normaliser
	/// is folded into the surrounding plaintext coefficients to save a
	/// level.
	pub fn softmax_approx_ciphertext(&self, ct: &Ciphertext, beta: f64) -> Result<Ciphertext> {
		let he = self.he();
		let shifted = he.add_scalar(ct, beta)?;
		let mut square = he.multiply_relin(&shifted, &shifted)?;
		he.rescale(&mut square)?;
		Ok(square)
	}

	/// Applies the softmax surrogate to every channel of a tensor.
	pub fn softmax_approx(
		&self,
		tensor: &CiphertextTensor,
		beta: f64,
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		let mut ciphertexts = Vec::with_capacity(depth);
		for d in 0..depth {
			ciphertexts.push(self.softmax_approx_ciphertext(tensor.ciphertext(d), beta)?);
		}
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}

	/// Ciphertext-side mean and variance over the channel axis.
	pub fn mean_and_variance(
		&self,
		tensor: &CiphertextTensor,
	) -> Result<(Ciphertext, Ciphertext)> {
		let he = self.he();
		let depth = tensor.depth();

		let mut sum = he.allocate_zero(tensor.level(), tensor.scale());
		for d in 0..depth {
			he.add_inplace(&mut sum, tensor.ciphertext(d))?;
		}
		let mut mean = he.multiply_scalar(&sum, 1.0 / depth as f64)?;
		he.rescale(&mut mean)?;

		let mut squares = he.allocate_zero(mean.level(), tensor.scale() * tensor.scale());
		for d in 0..depth {
			let diff = he.sub(tensor.ciphertext(d), &mean)?;
			he.multiply_relin_then_add(&diff, &diff, &mut squares)?;
		}
		he.rescale(&mut squares)?;
		let mut variance = he.multiply_scalar(&squares, 1.0 / depth as f64)?;
		he.rescale(&mut variance)?;

		Ok((mean, variance))
	}

	/// Layer norm with the reciprocal square root of the variance
	/// evaluated homomorphically through its polynomial approximation.
	pub fn layer_norm(
		&self,
		tensor: &CiphertextTensor,
		r: &[f64],
		b: &[f64],
		rsqrt_coeffs: &[f64],
		domain: (f64, f64),
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		if r.len() != depth || b.len() != depth {
			return Err(Error::shape(
				"layer_norm",
				format!("gain/shift of {}", depth),
				format!("{}/{}", r.len(), b.len()),
			));
		}

		let (mean, variance) = self.mean_and_variance(tensor)?;
		let inv_std = self.poly_ciphertext(&variance, rsqrt_coeffs, domain)?;

		let results: Vec<Result<Ciphertext>> = self.pool().install(|| {
			(0..depth)
				.into_par_iter()
				.map(|d| {
					let he = self.he().clone();
					let diff = he.sub(tensor.ciphertext(d), &mean)?;
					let mut scaled = he.multiply_scalar(&diff, r[d])?;
					he.rescale(&mut scaled)?;
					let mut normalised = he.multiply_relin(&scaled, &inv_std)?;
					he.rescale(&mut normalised)?;
					Ok(he.add_scalar(&normalised, b[d])?)
				})
				.collect()
		});
		let ciphertexts = results.into_iter().collect::<Result<Vec<_>>>()?;
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}

	/// Layer norm with a precomputed plaintext reciprocal std per column:
	/// `out[d] = (N·T[d] − Σ_k T[k]) · (r[d]·σ⁻¹ / N) + b[d]`. Spends a
	/// single level where the homomorphic variant needs five.
	pub fn layer_norm_replace_variance(
		&self,
		tensor: &CiphertextTensor,
		r: &[f64],
		b: &[f64],
		inv_std: &[f64],
	) -> Result<CiphertextTensor> {
		let (rows, cols, depth) = tensor.shape();
		if r.len() != depth || b.len() != depth {
			return Err(Error::shape(
				"layer_norm_replace_variance",
				format!("gain/shift of {}", depth),
				format!("{}/{}", r.len(), b.len()),
			));
		}
		if inv_std.len() != cols {
			return Err(Error::shape(
				"layer_norm_replace_variance",
				format!("reciprocal std of {}", cols),
				inv_std.len(),
			));
		}

		let he = self.he();
		let mut sum = he.allocate_zero(tensor.level(), tensor.scale());
		for d in 0..depth {
			he.add_inplace(&mut sum, tensor.ciphertext(d))?;
		}
		let repeated = repeat_vector(inv_std, rows);

		let results: Vec<Result<Ciphertext>> = self.pool().install(|| {
			(0..depth)
				.into_par_iter()
				.map(|d| {
					let he = self.he().clone();
					let scaled_up = he.multiply_scalar_int(tensor.ciphertext(d), depth as i64)?;
					let centred = he.sub(&scaled_up, &sum)?;
					let gains = scale_vector(&repeated, r[d] / depth as f64);
					let mut normalised = he.multiply_plain(&centred, &gains)?;
					he.rescale(&mut normalised)?;
					Ok(he.add_scalar(&normalised, b[d])?)
				})
				.collect()
		});
		let ciphertexts = results.into_iter().collect::<Result<Vec<_>>>()?;
		CiphertextTensor::new(ciphertexts, rows, cols, depth)
	}
}
