use serde::{Deserialize, Serialize};

/// An encryption of a slot vector.
///
/// A ciphertext carries its residual level in the modulus chain and the
/// scale accumulated by multiplications; both are tracked explicitly so
/// that misuse (exhausted levels, drifted scales, foreign keys) surfaces
/// as an error instead of silent precision loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ciphertext {
	pub(crate) slots: Vec<f64>,
	pub(crate) level: usize,
	pub(crate) scale: f64,
	pub(crate) key_id: u64,
}

impl Ciphertext {
	/// The residual level in the modulus chain.
	pub fn level(&self) -> usize {
		self.level
	}

	/// The current scale.
	pub fn scale(&self) -> f64 {
		self.scale
	}

	/// Number of slots.
	pub fn slot_count(&self) -> usize {
		self.slots.len()
	}
}
