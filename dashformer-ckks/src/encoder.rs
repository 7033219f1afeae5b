use crate::{CkksContext, Error, Plaintext, Result};

/// Encodes vectors of real numbers into plaintexts.
///
/// The floating-point coefficients are scaled up by the encoder's scale
/// before they enter the ring; the scale therefore determines the bit
/// precision of the encoding and must stay clear of the total modulus.
#[derive(Debug, Clone)]
pub struct CkksEncoder {
	ctx: CkksContext,
	scale: f64,
}

impl CkksEncoder {
	/// Creates an encoder for the given context.
	///
	/// * `ctx` - The context.
	/// * `scale` - The scaling factor.
	pub fn new(ctx: &CkksContext, scale: f64) -> Result<Self> {
		if !scale.is_finite() || scale <= 0.0 {
			return Err(Error::InvalidArgument);
		}
		Ok(Self {
			ctx: ctx.clone(),
			scale,
		})
	}

	/// Number of slots this encoder produces.
	pub fn slot_count(&self) -> usize {
		self.ctx.slot_count()
	}

	/// Encodes the given values into a plaintext, padding the remaining
	/// slots with zero.
	pub fn encode_f64(&self, data: &[f64]) -> Result<Plaintext> {
		let slots = self.slot_count();
		if data.len() > slots {
			return Err(Error::SlotOverflow {
				len: data.len(),
				slots,
			});
		}

		let mut values = vec![0.0; slots];
		values[..data.len()].copy_from_slice(data);

		Ok(Plaintext {
			values,
			scale: self.scale,
		})
	}

	/// Inverse of encode: decodes a plaintext back into its slot values.
	pub fn decode_f64(&self, plaintext: &Plaintext) -> Vec<f64> {
		plaintext.values.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::CkksParametersBuilder;

	fn create_context(log_n: usize) -> CkksContext {
		let params = CkksParametersBuilder::new()
			.set_log_n(log_n)
			.set_log_q(vec![38, 33, 33])
			.set_log_default_scale(33)
			.build()
			.unwrap();
		CkksContext::new(&params).unwrap()
	}

	#[test]
	fn can_get_slot_count() {
		let ctx = create_context(13);
		let encoder = CkksEncoder::new(&ctx, 2.0f64.powi(33)).unwrap();
		assert_eq!(encoder.slot_count(), 8192 / 2);
	}

	#[test]
	fn can_encode_and_decode() {
		let ctx = create_context(12);
		let encoder = CkksEncoder::new(&ctx, 2.0f64.powi(33)).unwrap();

		let data: Vec<f64> = (0..encoder.slot_count())
			.map(|i| i as f64 - 1024.0)
			.collect();

		let plaintext = encoder.encode_f64(&data).unwrap();
		let decoded = encoder.decode_f64(&plaintext);

		assert_eq!(data, decoded[..data.len()]);
	}

	#[test]
	fn rejects_oversized_vectors() {
		let ctx = create_context(12);
		let encoder = CkksEncoder::new(&ctx, 2.0f64.powi(33)).unwrap();

		let data = vec![1.0; encoder.slot_count() + 1];
		let err = encoder.encode_f64(&data).unwrap_err();
		assert!(matches!(err, Error::SlotOverflow { .. }));
	}
}
