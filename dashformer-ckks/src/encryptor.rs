use rand::Rng;

use crate::{Ciphertext, CkksContext, Error, Plaintext, PublicKey, Result};

/// Magnitude of the fresh-encryption error. CKKS is approximate by design;
/// downstream consumers must tolerate noise of at least this order.
const ENCRYPTION_NOISE: f64 = 1e-8;

/// Encrypts plaintexts into ciphertexts under a public key.
#[derive(Debug, Clone)]
pub struct Encryptor {
	ctx: CkksContext,
	key_id: u64,
}

impl Encryptor {
	/// Creates an encryptor bound to the given public key.
	pub fn with_public_key(ctx: &CkksContext, key: &PublicKey) -> Result<Self> {
		Ok(Self {
			ctx: ctx.clone(),
			key_id: key.id,
		})
	}

	/// Encrypts a plaintext, producing a fresh ciphertext at the top of the
	/// modulus chain.
	pub fn encrypt(&self, plaintext: &Plaintext) -> Result<Ciphertext> {
		if plaintext.values.len() != self.ctx.slot_count() {
			return Err(Error::InvalidArgument);
		}

		let mut rng = rand::thread_rng();
		let slots = plaintext
			.values
			.iter()
			.map(|&v| v + rng.gen_range(-ENCRYPTION_NOISE..=ENCRYPTION_NOISE))
			.collect();

		Ok(Ciphertext {
			slots,
			level: self.ctx.max_level(),
			scale: plaintext.scale,
			key_id: self.key_id,
		})
	}
}
