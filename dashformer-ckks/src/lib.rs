//! Slot-level CKKS arithmetic backend for encrypted Dashformer inference.
//!
//! The crate exposes the algebra the inference engine depends on: packed
//! slot vectors, additions with plaintexts and scalars, plaintext-weighted
//! and relinearised multiplications with fused accumulation, rescaling
//! along a modulus chain, Galois rotations and block inner sums. Levels,
//! scales, rotation-key coverage and key identity are tracked explicitly,
//! so a computation that would fail on a lattice implementation (missing
//! Galois key, exhausted chain, drifted scale, foreign key) fails here
//! with the matching error, and fresh encryptions carry approximation
//! noise. The lattice layer itself is deliberately out of scope: this
//! backend is the reference provider behind the same object surface a
//! hardware-backed provider would implement.
//!
//! Objects follow the usual CKKS workflow: build [`CkksParameters`],
//! derive a [`CkksContext`], generate keys with [`KeyGenerator`], then
//! construct [`CkksEncoder`], [`Encryptor`], [`Decryptor`] and
//! [`CkksEvaluator`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod ciphertext;
mod context;
mod decryptor;
mod encoder;
mod encryptor;
mod error;
mod evaluator;
mod keys;
mod parameters;
mod plaintext;

pub use ciphertext::Ciphertext;
pub use context::CkksContext;
pub use decryptor::Decryptor;
pub use encoder::CkksEncoder;
pub use encryptor::Encryptor;
pub use error::{Error, Result};
pub use evaluator::CkksEvaluator;
pub use keys::{GaloisKeySet, KeyGenerator, PublicKey, RelinearizationKey, SecretKey};
pub use parameters::{CkksParameters, CkksParametersBuilder};
pub use plaintext::Plaintext;
