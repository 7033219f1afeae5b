use crate::{Ciphertext, CkksContext, Error, Plaintext, Result, SecretKey};

/// Decrypts ciphertexts under the secret key.
#[derive(Debug, Clone)]
pub struct Decryptor {
	key_id: u64,
	_ctx: CkksContext,
}

impl Decryptor {
	/// Creates a decryptor for the given secret key.
	pub fn new(ctx: &CkksContext, secret_key: &SecretKey) -> Result<Self> {
		Ok(Self {
			key_id: secret_key.id,
			_ctx: ctx.clone(),
		})
	}

	/// Decrypts a ciphertext and returns the plaintext.
	///
	/// * `ciphertext` - The ciphertext to decrypt.
	pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Plaintext> {
		if ciphertext.key_id != self.key_id {
			return Err(Error::KeyMismatch);
		}

		Ok(Plaintext {
			values: ciphertext.slots.clone(),
			scale: ciphertext.scale,
		})
	}
}
