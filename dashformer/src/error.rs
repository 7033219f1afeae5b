/// A type representing all errors surfaced by the inference engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Input rank or shape disagreement. Fatal for the operation.
	#[error("shape mismatch in {op}: expected {expected}, got {got}")]
	ShapeMismatch {
		/// The operation that rejected its operands.
		op: &'static str,
		/// The expected dimensions.
		expected: String,
		/// The dimensions actually supplied.
		got: String,
	},

	/// Insufficient CKKS levels remain for the requested depth.
	#[error("insufficient CKKS levels remain")]
	LevelExhausted,

	/// A rotation was requested that the Galois key set does not cover.
	#[error("no Galois key provisioned for rotation step {step}")]
	KeyMissing {
		/// The requested rotation step.
		step: i64,
	},

	/// Opaque error from the HE provider.
	#[error("HE backend: {0}")]
	HeBackend(dashformer_ckks::Error),

	/// Malformed model-parameter file or tokeniser.
	#[error("parse error: {0}")]
	Parse(String),

	/// Filesystem failure.
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl From<dashformer_ckks::Error> for Error {
	fn from(err: dashformer_ckks::Error) -> Self {
		match err {
			dashformer_ckks::Error::LevelExhausted => Error::LevelExhausted,
			dashformer_ckks::Error::KeyMissing {
				step,
			} => Error::KeyMissing {
				step,
			},
			other => Error::HeBackend(other),
		}
	}
}

impl Error {
	pub(crate) fn shape(
		op: &'static str,
		expected: impl ToString,
		got: impl ToString,
	) -> Self {
		Error::ShapeMismatch {
			op,
			expected: expected.to_string(),
			got: got.to_string(),
		}
	}
}

/// The result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
