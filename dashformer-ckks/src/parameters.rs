use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Encryption parameters for the CKKS scheme.
///
/// The parameters fix the ring degree (`2^log_n`), the modulus chain
/// (`log_q`, one prime per level, consumed from the back by rescaling),
/// the auxiliary primes (`log_p`, used by key switching) and the default
/// encoding scale. They determine how many slots a ciphertext packs and
/// how many multiplicative levels a computation may spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CkksParameters {
	log_n: usize,
	log_q: Vec<usize>,
	log_p: Vec<usize>,
	log_default_scale: usize,
}

impl CkksParameters {
	/// Log2 of the ring degree.
	pub fn log_n(&self) -> usize {
		self.log_n
	}

	/// Number of plaintext slots (`N/2`).
	pub fn slot_count(&self) -> usize {
		1 << (self.log_n - 1)
	}

	/// Highest level a fresh ciphertext starts at.
	pub fn max_level(&self) -> usize {
		self.log_q.len() - 1
	}

	/// The default encoding scale `2^log_default_scale`.
	pub fn default_scale(&self) -> f64 {
		(self.log_default_scale as f64).exp2()
	}

	/// The prime consumed by a rescale performed at `level`.
	pub(crate) fn rescale_prime(&self, level: usize) -> f64 {
		(self.log_q[level] as f64).exp2()
	}

	/// Log2 of the total ciphertext modulus, a hard ceiling for scale growth.
	pub(crate) fn max_log_scale(&self) -> f64 {
		self.log_q.iter().sum::<usize>() as f64
	}

	/// Log2 of the full modulus `Q·P`, for reporting.
	pub fn log_qp(&self) -> usize {
		self.log_q.iter().sum::<usize>() + self.log_p.iter().sum::<usize>()
	}

	/// Log2 of the default scale.
	pub fn log_default_scale(&self) -> usize {
		self.log_default_scale
	}
}

/// Represents a builder that sets up and creates CKKS parameters.
///
/// The modulus chain and default scale significantly affect the precision,
/// the available multiplicative depth and the size of ciphertexts.
pub struct CkksParametersBuilder {
	log_n: Option<usize>,
	log_q: Vec<usize>,
	log_p: Vec<usize>,
	log_default_scale: Option<usize>,
}

impl CkksParametersBuilder {
	/// Creates a new builder.
	pub fn new() -> Self {
		Self {
			log_n: None,
			log_q: Vec::new(),
			log_p: Vec::new(),
			log_default_scale: None,
		}
	}

	/// Sets the log2 of the ring degree. Larger values give more slots and
	/// noise margin at the expense of performance.
	pub fn set_log_n(mut self, log_n: usize) -> Self {
		self.log_n = Some(log_n);
		self
	}

	/// Sets the bit sizes of the modulus chain, one prime per level. The
	/// first entry is the base prime; rescaling consumes entries from the
	/// back of the chain.
	pub fn set_log_q(mut self, log_q: Vec<usize>) -> Self {
		self.log_q = log_q;
		self
	}

	/// Sets the bit sizes of the auxiliary key-switching primes.
	pub fn set_log_p(mut self, log_p: Vec<usize>) -> Self {
		self.log_p = log_p;
		self
	}

	/// Sets the log2 of the default encoding scale.
	pub fn set_log_default_scale(mut self, log_scale: usize) -> Self {
		self.log_default_scale = Some(log_scale);
		self
	}

	/// Validates the parameter choices and returns the parameter set.
	pub fn build(self) -> Result<CkksParameters> {
		let log_n = self.log_n.ok_or(Error::InvalidArgument)?;
		if !(10..=17).contains(&log_n) {
			return Err(Error::InvalidArgument);
		}
		if self.log_q.is_empty() {
			return Err(Error::InvalidArgument);
		}
		if self.log_q.iter().any(|&q| !(20..=60).contains(&q)) {
			return Err(Error::InvalidArgument);
		}
		let log_default_scale = self.log_default_scale.ok_or(Error::InvalidArgument)?;
		if log_default_scale > 60 {
			return Err(Error::InvalidArgument);
		}

		Ok(CkksParameters {
			log_n,
			log_q: self.log_q,
			log_p: self.log_p,
			log_default_scale,
		})
	}
}

impl Default for CkksParametersBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn can_build_params() {
		let params = CkksParametersBuilder::new()
			.set_log_n(14)
			.set_log_q(vec![38, 33, 33, 33, 33, 33, 33, 33, 33, 33, 33])
			.set_log_p(vec![36, 36])
			.set_log_default_scale(33)
			.build()
			.unwrap();

		assert_eq!(params.slot_count(), 8192);
		assert_eq!(params.max_level(), 10);
		assert_eq!(params.default_scale(), 2.0f64.powi(33));
		assert_eq!(params.log_qp(), 38 + 33 * 10 + 72);
	}

	#[test]
	fn rejects_missing_chain() {
		let err = CkksParametersBuilder::new()
			.set_log_n(14)
			.set_log_default_scale(33)
			.build()
			.unwrap_err();
		assert_eq!(err, Error::InvalidArgument);
	}

	#[test]
	fn rejects_out_of_range_degree() {
		let err = CkksParametersBuilder::new()
			.set_log_n(4)
			.set_log_q(vec![38, 33])
			.set_log_default_scale(33)
			.build()
			.unwrap_err();
		assert_eq!(err, Error::InvalidArgument);
	}
}
