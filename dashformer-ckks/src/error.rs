use static_assertions::const_assert;

/// A type representing all errors that can occur in the CKKS backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	/// An argument is invalid.
	#[error("the argument is not valid")]
	InvalidArgument,

	/// A value vector is longer than the slot vector of the ring.
	#[error("value vector of length {len} does not fit into {slots} slots")]
	SlotOverflow {
		/// Length of the offending value vector.
		len: usize,
		/// Number of slots supported by the parameter set.
		slots: usize,
	},

	/// The modulus chain has no level left for a rescale.
	#[error("no level left in the modulus chain")]
	LevelExhausted,

	/// A rotation was requested for which no Galois key was generated.
	#[error("no Galois key provisioned for rotation step {step}")]
	KeyMissing {
		/// The requested rotation step.
		step: i64,
	},

	/// Two ciphertexts with different scales were combined additively.
	#[error("ciphertext scales do not match: {lhs} vs {rhs}")]
	ScaleMismatch {
		/// Scale of the left operand.
		lhs: f64,
		/// Scale of the right operand.
		rhs: f64,
	},

	/// The accumulated scale no longer fits the remaining modulus.
	#[error("scale overflows the remaining modulus")]
	ScaleOutOfBounds,

	/// The operands were produced under a different key set.
	#[error("operands were produced under a different key set")]
	KeyMismatch,
}

const_assert!(std::mem::size_of::<Error>() <= 32);

/// The result type for backend operations.
pub type Result<T> = std::result::Result<T, Error>;
