//! Privacy-preserving inference of the Dashformer model over CKKS
//! ciphertexts.
//!
//! A client encrypts a tokenised biological sequence; the server, holding
//! only public and evaluation keys, runs the entire forward pass in the
//! encrypted domain: embedding and positional encoding folded into
//! plaintext coefficients, four fused baby-step/giant-step attention
//! heads, the unfolded residual/layer-norm/feed-forward/classifier stack,
//! and pooling. Decrypting the result matches the plaintext model (with
//! polynomial activations) up to the scheme's approximation error.
//!
//! The crate splits into the ciphertext-tensor layer ([`tensor`]), the
//! plaintext coefficient pre-computation ([`coefficient`], [`linalg`]),
//! the attention and post-attention kernels ([`attention`], [`unfold`])
//! and the request driver ([`pipeline`]) with its file-format boundaries
//! ([`model`], [`tokenizer`], [`output`]).

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

pub mod attention;
pub mod coefficient;
pub mod config;
pub mod constants;
mod error;
pub mod keys;
pub mod linalg;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod tensor;
pub mod tokenizer;
pub mod unfold;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
