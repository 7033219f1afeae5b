//! The request driver: encrypt, attend, unfold, decrypt.

use std::io;
use std::time::Instant;

use crate::attention::{fused_attention, precompute_rotations, HeadCoefficients};
use crate::coefficient::{build_coefficients, ModelCoefficients};
use crate::constants::{BABY_STEP, CLASSIFIER_RESCALER, GIANT_STEP, RELU_DOMAIN};
use crate::keys::{self, PublicKeySet, SecretKeySet};
use crate::model::DashformerParameters;
use crate::tensor::{decrypt_tensor, encrypt_tensor, CiphertextTensor, TensorEvaluator};
use crate::unfold::evaluate_unfolded;
use crate::{Error, Result};

/// The end-to-end encrypted inference driver.
///
/// A pipeline owns the key sets, the coefficient bundles built once from
/// the model, and the worker pool every parallel stage runs on. One
/// `run` call serves one request: the input batch lives as ciphertexts
/// only within that call.
pub struct Pipeline {
	public: PublicKeySet,
	secret: SecretKeySet,
	model: DashformerParameters,
	coefficients: ModelCoefficients,
	pool: rayon::ThreadPool,
}

impl Pipeline {
	/// Builds a pipeline with the production CKKS parameter set.
	pub fn new(model: DashformerParameters, workers: usize) -> Result<Self> {
		let (public, secret) = keys::setup()?;
		Self::with_key_sets(model, public, secret, workers)
	}

	/// Builds a pipeline over externally provided key sets.
	pub fn with_key_sets(
		model: DashformerParameters,
		public: PublicKeySet,
		secret: SecretKeySet,
		workers: usize,
	) -> Result<Self> {
		let pool = rayon::ThreadPoolBuilder::new()
			.num_threads(workers)
			.build()
			.map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
		let coefficients = build_coefficients(&model);

		Ok(Self {
			public,
			secret,
			model,
			coefficients,
			pool,
		})
	}

	/// Runs encrypted inference over a batch of one-hot encoded
	/// sequences and returns one row of rescaled logits per sequence.
	pub fn run(&self, one_hot: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<f64>>> {
		let started = Instant::now();
		let x0 = encrypt_tensor(&self.public, &self.pool, one_hot)?;
		tracing::info!(
			rows = x0.rows(),
			cols = x0.cols(),
			depth = x0.depth(),
			elapsed = ?started.elapsed(),
			"input encrypted"
		);

		let eng = TensorEvaluator::new(&self.public, &self.pool);

		let stage = Instant::now();
		let rotations = precompute_rotations(&eng, &x0, BABY_STEP, GIANT_STEP)?;
		tracing::debug!(elapsed = ?stage.elapsed(), "rotation precomputes ready");

		let stage = Instant::now();
		let heads = self.coefficients.qkv.a_q.len();
		let mut head: Option<CiphertextTensor> = None;
		for h in 0..heads {
			let beta = self.model.softmax_b[h] / self.model.softmax_c[h].sqrt();
			let coefficients = HeadCoefficients::new(&self.coefficients, h, beta);
			let attention =
				fused_attention(&eng, &x0, &rotations, &coefficients, BABY_STEP, GIANT_STEP)?;
			head = Some(match head {
				None => attention,
				Some(concatenated) => concatenated.concat_depth(attention)?,
			});
		}
		let head = head.ok_or_else(|| Error::shape("pipeline", "at least one head", 0))?;
		tracing::info!(elapsed = ?stage.elapsed(), heads, "fused attention done");

		let stage = Instant::now();
		let pooled = evaluate_unfolded(
			&eng,
			&self.coefficients.dash,
			&head,
			&x0,
			&self.model.relu_coefficients,
			RELU_DOMAIN,
		)?;
		tracing::info!(
			elapsed = ?stage.elapsed(),
			level = pooled.level(),
			"unfolded evaluator done"
		);

		let values = decrypt_tensor(&self.secret, &pooled)?;
		let logits = values
			.iter()
			.map(|sequence| {
				sequence[0]
					.iter()
					.map(|v| v * CLASSIFIER_RESCALER)
					.collect()
			})
			.collect();

		tracing::info!(elapsed = ?started.elapsed(), "request complete");
		Ok(logits)
	}

	/// The model parameters this pipeline serves.
	pub fn model(&self) -> &DashformerParameters {
		&self.model
	}

	/// The coefficient bundles built from the model.
	pub fn coefficients(&self) -> &ModelCoefficients {
		&self.coefficients
	}
}
