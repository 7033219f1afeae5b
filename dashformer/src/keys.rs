//! CKKS parameter and key set-up for the two parties of a request.

use dashformer_ckks::{
	CkksContext, CkksEncoder, CkksEvaluator, CkksParameters, CkksParametersBuilder, Decryptor,
	Encryptor, KeyGenerator,
};

use crate::constants::SEQUENCE_LENGTH;
use crate::Result;

/// Everything the evaluating party holds: parameters, encoder, encryptor
/// and the evaluator with its relinearisation and Galois keys.
pub struct PublicKeySet {
	/// The CKKS parameter set.
	pub params: CkksParameters,
	/// Slot-vector encoder at the default scale.
	pub encoder: CkksEncoder,
	/// Public-key encryptor.
	pub encryptor: Encryptor,
	/// The evaluator, holding the evaluation keys.
	pub evaluator: CkksEvaluator,
}

/// Everything the decrypting party holds.
pub struct SecretKeySet {
	/// The CKKS parameter set.
	pub params: CkksParameters,
	/// Slot-vector encoder at the default scale.
	pub encoder: CkksEncoder,
	/// Secret-key decryptor.
	pub decryptor: Decryptor,
}

/// Generates the production CKKS parameter set and key material:
/// `logN = 14`, an 11-prime chain `[38, 33×10]`, auxiliary primes
/// `[36, 36]`, default scale `2^33`, and Galois keys covering every
/// column rotation in `[-S, S]`.
pub fn setup() -> Result<(PublicKeySet, SecretKeySet)> {
	setup_with_log_n(14)
}

/// Same key material on a smaller ring; the test suites use this to keep
/// ciphertexts short while exercising the identical modulus chain.
pub fn setup_with_log_n(log_n: usize) -> Result<(PublicKeySet, SecretKeySet)> {
	let params = CkksParametersBuilder::new()
		.set_log_n(log_n)
		.set_log_q(vec![38, 33, 33, 33, 33, 33, 33, 33, 33, 33, 33])
		.set_log_p(vec![36, 36])
		.set_log_default_scale(33)
		.build()?;
	let ctx = CkksContext::new(&params)?;

	let gen = KeyGenerator::new(&ctx)?;
	let secret_key = gen.secret_key();
	let public_key = gen.create_public_key();
	let relin_key = gen.create_relinearization_key();

	let limit = SEQUENCE_LENGTH as i64;
	let rotations: Vec<i64> = (-limit..=limit).collect();
	let galois_keys = gen.create_galois_keys(&rotations)?;

	let encoder = CkksEncoder::new(&ctx, params.default_scale())?;
	let encryptor = Encryptor::with_public_key(&ctx, &public_key)?;
	let evaluator = CkksEvaluator::new(&ctx, &relin_key, &galois_keys)?;
	let decryptor = Decryptor::new(&ctx, &secret_key)?;

	tracing::info!(
		log_n = params.log_n(),
		log_qp = params.log_qp(),
		max_level = params.max_level(),
		log_scale = params.log_default_scale(),
		"CKKS parameters initialised"
	);

	Ok((
		PublicKeySet {
			params: params.clone(),
			encoder: encoder.clone(),
			encryptor,
			evaluator,
		},
		SecretKeySet {
			params,
			encoder,
			decryptor,
		},
	))
}
