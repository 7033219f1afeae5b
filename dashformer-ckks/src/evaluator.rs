use std::sync::Arc;

use crate::{
	Ciphertext, CkksContext, Error, GaloisKeySet, RelinearizationKey, Result,
};

/// Relative tolerance when comparing the tracked scales of two operands.
const SCALE_TOLERANCE: f64 = 1e-9;

/// Evaluates arithmetic on CKKS ciphertexts.
///
/// Every operation has a published level and scale effect:
///
/// - additions require matching scales and align both operands to the
///   lower level;
/// - plaintext and scalar multiplications raise the scale by the default
///   scale (integer scalars are exact and leave it unchanged);
/// - ciphertext multiplications multiply the operand scales and require
///   the relinearisation key;
/// - `rescale` consumes one level and divides the scale by that level's
///   prime;
/// - rotations require a provisioned Galois key and leave level and scale
///   untouched.
///
/// The evaluator itself is immutable; cloning yields a thread-local
/// shallow copy that shares the backing key material.
#[derive(Debug, Clone)]
pub struct CkksEvaluator {
	ctx: CkksContext,
	key_id: u64,
	galois: Arc<GaloisKeySet>,
}

impl CkksEvaluator {
	/// Creates an evaluator holding the evaluation keys.
	pub fn new(
		ctx: &CkksContext,
		relin_key: &RelinearizationKey,
		galois_keys: &GaloisKeySet,
	) -> Result<Self> {
		if relin_key.id != galois_keys.id {
			return Err(Error::KeyMismatch);
		}
		Ok(Self {
			ctx: ctx.clone(),
			key_id: relin_key.id,
			galois: Arc::new(galois_keys.clone()),
		})
	}

	/// The context this evaluator operates under.
	pub fn context(&self) -> &CkksContext {
		&self.ctx
	}

	/// The default encoding scale of the parameter set.
	pub fn default_scale(&self) -> f64 {
		self.ctx.default_scale()
	}

	/// Allocates an all-zero ciphertext at the given level and scale, for
	/// use as a multiply-accumulate target.
	pub fn allocate_zero(&self, level: usize, scale: f64) -> Ciphertext {
		Ciphertext {
			slots: vec![0.0; self.ctx.slot_count()],
			level,
			scale,
			key_id: self.key_id,
		}
	}

	fn check_key(&self, a: &Ciphertext) -> Result<()> {
		if a.key_id != self.key_id {
			return Err(Error::KeyMismatch);
		}
		Ok(())
	}

	fn check_scales(lhs: f64, rhs: f64) -> Result<()> {
		if (lhs - rhs).abs() > SCALE_TOLERANCE * lhs.abs().max(rhs.abs()) {
			return Err(Error::ScaleMismatch {
				lhs,
				rhs,
			});
		}
		Ok(())
	}

	fn check_scale_bound(&self, scale: f64) -> Result<()> {
		if scale.log2() > self.ctx.params().max_log_scale() {
			return Err(Error::ScaleOutOfBounds);
		}
		Ok(())
	}

	fn check_plain_len(&self, values: &[f64]) -> Result<()> {
		if values.len() > self.ctx.slot_count() {
			return Err(Error::SlotOverflow {
				len: values.len(),
				slots: self.ctx.slot_count(),
			});
		}
		Ok(())
	}

	/// Adds two ciphertexts. Operands are aligned to the lower level.
	pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
		self.check_key(a)?;
		self.check_key(b)?;
		Self::check_scales(a.scale, b.scale)?;

		let slots = a
			.slots
			.iter()
			.zip(b.slots.iter())
			.map(|(x, y)| x + y)
			.collect();

		Ok(Ciphertext {
			slots,
			level: a.level.min(b.level),
			scale: a.scale,
			key_id: a.key_id,
		})
	}

	/// Adds `b` into `a` in place.
	pub fn add_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> Result<()> {
		*a = self.add(a, b)?;
		Ok(())
	}

	/// Subtracts `b` from `a`.
	pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
		self.check_key(a)?;
		self.check_key(b)?;
		Self::check_scales(a.scale, b.scale)?;

		let slots = a
			.slots
			.iter()
			.zip(b.slots.iter())
			.map(|(x, y)| x - y)
			.collect();

		Ok(Ciphertext {
			slots,
			level: a.level.min(b.level),
			scale: a.scale,
			key_id: a.key_id,
		})
	}

	/// Adds a plaintext slot vector, encoded at the ciphertext's scale.
	/// Slots past the end of `values` are unchanged.
	pub fn add_plain(&self, a: &Ciphertext, values: &[f64]) -> Result<Ciphertext> {
		self.check_key(a)?;
		self.check_plain_len(values)?;

		let mut out = a.clone();
		for (slot, v) in out.slots.iter_mut().zip(values.iter()) {
			*slot += v;
		}
		Ok(out)
	}

	/// Adds a scalar to every slot.
	pub fn add_scalar(&self, a: &Ciphertext, value: f64) -> Result<Ciphertext> {
		self.check_key(a)?;

		let mut out = a.clone();
		for slot in out.slots.iter_mut() {
			*slot += value;
		}
		Ok(out)
	}

	/// Multiplies by a plaintext slot vector encoded at the default scale.
	/// The result must be rescaled before it can meet a fresh ciphertext in
	/// an addition. Slots past the end of `values` are zeroed.
	pub fn multiply_plain(&self, a: &Ciphertext, values: &[f64]) -> Result<Ciphertext> {
		self.check_key(a)?;
		self.check_plain_len(values)?;
		let scale = a.scale * self.default_scale();
		self.check_scale_bound(scale)?;

		let mut slots = vec![0.0; a.slots.len()];
		for (i, v) in values.iter().enumerate() {
			slots[i] = a.slots[i] * v;
		}

		Ok(Ciphertext {
			slots,
			level: a.level,
			scale,
			key_id: a.key_id,
		})
	}

	/// Multiplies every slot by a real scalar, raising the scale by the
	/// default scale.
	pub fn multiply_scalar(&self, a: &Ciphertext, value: f64) -> Result<Ciphertext> {
		self.check_key(a)?;
		let scale = a.scale * self.default_scale();
		self.check_scale_bound(scale)?;

		Ok(Ciphertext {
			slots: a.slots.iter().map(|x| x * value).collect(),
			level: a.level,
			scale,
			key_id: a.key_id,
		})
	}

	/// Multiplies every slot by an integer scalar. Integers are exact in
	/// the ring, so level and scale are unchanged.
	pub fn multiply_scalar_int(&self, a: &Ciphertext, value: i64) -> Result<Ciphertext> {
		self.check_key(a)?;

		Ok(Ciphertext {
			slots: a.slots.iter().map(|x| x * value as f64).collect(),
			level: a.level,
			scale: a.scale,
			key_id: a.key_id,
		})
	}

	/// Relinearised ciphertext-ciphertext multiplication. The operand
	/// scales multiply; operands are aligned to the lower level.
	pub fn multiply_relin(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
		self.check_key(a)?;
		self.check_key(b)?;
		let scale = a.scale * b.scale;
		self.check_scale_bound(scale)?;

		let slots = a
			.slots
			.iter()
			.zip(b.slots.iter())
			.map(|(x, y)| x * y)
			.collect();

		Ok(Ciphertext {
			slots,
			level: a.level.min(b.level),
			scale,
			key_id: a.key_id,
		})
	}

	/// Fused multiply-accumulate with a plaintext vector: `acc += a * values`.
	/// The accumulator must sit at the product scale `a.scale * default`.
	pub fn multiply_plain_then_add(
		&self,
		a: &Ciphertext,
		values: &[f64],
		acc: &mut Ciphertext,
	) -> Result<()> {
		self.check_key(a)?;
		self.check_key(acc)?;
		self.check_plain_len(values)?;
		Self::check_scales(acc.scale, a.scale * self.default_scale())?;

		for (i, v) in values.iter().enumerate() {
			acc.slots[i] += a.slots[i] * v;
		}
		acc.level = acc.level.min(a.level);
		Ok(())
	}

	/// Fused relinearised multiply-accumulate: `acc += a * b`. The
	/// accumulator must sit at the product scale.
	pub fn multiply_relin_then_add(
		&self,
		a: &Ciphertext,
		b: &Ciphertext,
		acc: &mut Ciphertext,
	) -> Result<()> {
		self.check_key(a)?;
		self.check_key(b)?;
		self.check_key(acc)?;
		Self::check_scales(acc.scale, a.scale * b.scale)?;

		for ((slot, x), y) in acc.slots.iter_mut().zip(a.slots.iter()).zip(b.slots.iter()) {
			*slot += x * y;
		}
		acc.level = acc.level.min(a.level).min(b.level);
		Ok(())
	}

	/// Consumes one level, dividing the scale by that level's prime.
	pub fn rescale(&self, a: &mut Ciphertext) -> Result<()> {
		self.check_key(a)?;
		if a.level == 0 {
			return Err(Error::LevelExhausted);
		}
		a.scale /= self.ctx.params().rescale_prime(a.level);
		a.level -= 1;
		Ok(())
	}

	/// Cyclic left rotation of the slot vector by `step`. Requires the
	/// matching Galois key.
	pub fn rotate(&self, a: &Ciphertext, step: i64) -> Result<Ciphertext> {
		self.check_key(a)?;
		let n = self.ctx.slot_count();
		let k = (((step % n as i64) + n as i64) % n as i64) as usize;
		if k == 0 {
			return Ok(a.clone());
		}
		if !self.galois.supports(step) {
			return Err(Error::KeyMissing {
				step,
			});
		}

		let mut slots = vec![0.0; n];
		for (i, slot) in slots.iter_mut().enumerate() {
			*slot = a.slots[(i + k) % n];
		}

		Ok(Ciphertext {
			slots,
			level: a.level,
			scale: a.scale,
			key_id: a.key_id,
		})
	}

	/// Folds `count` slot blocks of stride `batch` by summing: slot `j` of
	/// the result holds `sum_i a[j + i*batch]`. Evaluated by the halving
	/// decomposition, so the rotation steps it needs are `batch * m` for
	/// the halved block sizes.
	pub fn inner_sum(&self, a: &Ciphertext, batch: usize, count: usize) -> Result<Ciphertext> {
		if batch == 0 || count == 0 {
			return Err(Error::InvalidArgument);
		}
		self.check_key(a)?;
		self.sum_blocks(a, batch as i64, count)
	}

	fn sum_blocks(&self, base: &Ciphertext, batch: i64, count: usize) -> Result<Ciphertext> {
		if count == 1 {
			return Ok(base.clone());
		}
		let half = self.sum_blocks(base, batch, count / 2)?;
		let mut res = self.add(&half, &self.rotate(&half, batch * (count / 2) as i64)?)?;
		if count % 2 == 1 {
			res = self.add(&res, &self.rotate(base, batch * (count - 1) as i64)?)?;
		}
		Ok(res)
	}

	/// Re-interprets the tracked scale of a ciphertext.
	///
	/// This re-expresses the same ciphertext under a different scale
	/// bookkeeping; callers use it at the documented points where fused
	/// multiply-adds leave the tracked scale off the default by rounding
	/// of the modulus chain. It must never replace a missing rescale.
	pub fn reinterpret_scale(&self, a: &mut Ciphertext, scale: f64) -> Result<()> {
		self.check_key(a)?;
		if !scale.is_finite() || scale <= 0.0 {
			return Err(Error::InvalidArgument);
		}
		let ratio = a.scale / scale;
		for slot in a.slots.iter_mut() {
			*slot *= ratio;
		}
		a.scale = scale;
		Ok(())
	}
}
