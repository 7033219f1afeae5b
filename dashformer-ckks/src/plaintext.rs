use serde::{Deserialize, Serialize};

/// A plaintext slot vector together with the scale it was encoded at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plaintext {
	pub(crate) values: Vec<f64>,
	pub(crate) scale: f64,
}

impl Plaintext {
	/// The encoded slot values.
	pub fn values(&self) -> &[f64] {
		&self.values
	}

	/// The scale the values were encoded at.
	pub fn scale(&self) -> f64 {
		self.scale
	}
}
