use crate::{CkksParameters, Result};

/// A validated parameter context from which the encoder, encryptor,
/// decryptor and evaluator are constructed.
#[derive(Debug, Clone)]
pub struct CkksContext {
	params: CkksParameters,
}

impl CkksContext {
	/// Creates a context for the given parameter set.
	pub fn new(params: &CkksParameters) -> Result<Self> {
		Ok(Self {
			params: params.clone(),
		})
	}

	/// The parameter set backing this context.
	pub fn params(&self) -> &CkksParameters {
		&self.params
	}

	/// Number of plaintext slots.
	pub fn slot_count(&self) -> usize {
		self.params.slot_count()
	}

	/// Highest level a fresh ciphertext starts at.
	pub fn max_level(&self) -> usize {
		self.params.max_level()
	}

	/// The default encoding scale.
	pub fn default_scale(&self) -> f64 {
		self.params.default_scale()
	}
}
