use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{CkksContext, Error, Result};

/// The secret key. Decryption is only possible with the key the data was
/// encrypted under; the identity ties ciphertexts to their key set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretKey {
	pub(crate) id: u64,
}

/// The public encryption key derived from a secret key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
	pub(crate) id: u64,
}

/// The relinearisation key required by ciphertext-ciphertext multiplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelinearizationKey {
	pub(crate) id: u64,
}

/// A set of Galois keys enabling cyclic slot rotations by fixed steps.
///
/// Steps are stored normalised modulo the slot count, so a key generated
/// for `-49` also serves the equivalent positive step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaloisKeySet {
	pub(crate) id: u64,
	pub(crate) slots: u64,
	pub(crate) steps: BTreeSet<u64>,
}

impl GaloisKeySet {
	/// Whether a rotation by `step` is provisioned.
	pub fn supports(&self, step: i64) -> bool {
		let n = self.slots as i64;
		let normalized = ((step % n) + n) % n;
		self.steps.contains(&(normalized as u64))
	}
}

/// Generates the secret key and every evaluation key derived from it.
pub struct KeyGenerator {
	id: u64,
	slot_count: usize,
}

impl KeyGenerator {
	/// Creates a key generator with a fresh secret key.
	pub fn new(ctx: &CkksContext) -> Result<Self> {
		Ok(Self {
			id: rand::random(),
			slot_count: ctx.slot_count(),
		})
	}

	/// Returns the secret key.
	pub fn secret_key(&self) -> SecretKey {
		SecretKey {
			id: self.id,
		}
	}

	/// Creates the public encryption key.
	pub fn create_public_key(&self) -> PublicKey {
		PublicKey {
			id: self.id,
		}
	}

	/// Creates the relinearisation key.
	pub fn create_relinearization_key(&self) -> RelinearizationKey {
		RelinearizationKey {
			id: self.id,
		}
	}

	/// Creates Galois keys for the given rotation steps.
	pub fn create_galois_keys(&self, steps: &[i64]) -> Result<GaloisKeySet> {
		if steps.is_empty() {
			return Err(Error::InvalidArgument);
		}
		let n = self.slot_count as i64;
		let steps = steps
			.iter()
			.map(|&step| (((step % n) + n) % n) as u64)
			.collect();
		Ok(GaloisKeySet {
			id: self.id,
			slots: self.slot_count as u64,
			steps,
		})
	}
}
