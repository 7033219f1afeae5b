//! Fixed architecture shape of the Dashformer model.

/// Sequence length (positions per input, the column axis of a tensor).
pub const SEQUENCE_LENGTH: usize = 50;

/// Embedding and hidden width.
pub const MODEL_DIM: usize = 128;

/// Number of self-attention heads.
pub const NUM_HEADS: usize = 4;

/// Width of one attention head.
pub const HEAD_DIM: usize = 32;

/// Hidden width of the feed-forward block.
pub const FFN_DIM: usize = 256;

/// Number of classifier outputs.
pub const NUM_CLASSES: usize = 25;

/// Baby-step factor of the BSGS attention. `BABY_STEP * GIANT_STEP`
/// must cover the sequence length.
pub const BABY_STEP: usize = 7;

/// Giant-step factor of the BSGS attention.
pub const GIANT_STEP: usize = 8;

/// The classifier weights are pre-divided by this constant so that the
/// final ciphertexts stay bounded; decrypted logits are multiplied by it
/// again before they are written out.
pub const CLASSIFIER_RESCALER: f64 = 2649.372705;

/// Fitting domain of the ReLU polynomial approximation.
pub const RELU_DOMAIN: (f64, f64) = (-50.0, 40.0);
