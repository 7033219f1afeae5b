//! Token-to-id mapping and one-hot encoding of the input sequences.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Deserialize)]
struct TokenizerFile {
	config: TokenizerConfig,
}

#[derive(Deserialize)]
struct TokenizerConfig {
	// The Keras export nests the index as a JSON string inside the JSON.
	word_index: String,
}

/// Maps lowercased tokens to vocabulary ids.
#[derive(Debug, Clone)]
pub struct Tokenizer {
	word_index: HashMap<String, usize>,
}

impl Tokenizer {
	/// Loads a tokeniser from its JSON export.
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)?;
		let file: TokenizerFile = serde_json::from_str(&content)
			.map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
		let word_index: HashMap<String, usize> =
			serde_json::from_str(&file.config.word_index).map_err(|e| {
				Error::Parse(format!("{}: word_index: {}", path.display(), e))
			})?;
		if word_index.is_empty() {
			return Err(Error::Parse(format!(
				"{}: empty word_index",
				path.display()
			)));
		}
		Ok(Self {
			word_index,
		})
	}

	/// Depth of the one-hot encoding. Id 0 is reserved, so the vocabulary
	/// spans one more channel than the index has entries.
	pub fn vocabulary_size(&self) -> usize {
		self.word_index.len() + 1
	}

	/// Looks up the id of a token, case-insensitively.
	pub fn token_id(&self, token: &str) -> Option<usize> {
		self.word_index.get(&token.to_lowercase()).copied()
	}
}

/// Reads an input file (one sequence per line, tokens separated by single
/// spaces, anything after a comma ignored) and one-hot encodes it into an
/// `R×C×V` value tensor.
pub fn read_one_hot_sequences(
	path: &Path,
	tokenizer: &Tokenizer,
) -> Result<Vec<Vec<Vec<f64>>>> {
	let content = fs::read_to_string(path)?;
	let vocabulary = tokenizer.vocabulary_size();

	let mut sequences = Vec::new();
	for (line_no, line) in content.lines().enumerate() {
		let tokens = line.split(',').next().unwrap_or("");
		if tokens.is_empty() {
			continue;
		}

		let mut one_hot = Vec::new();
		for token in tokens.split(' ') {
			let id = tokenizer.token_id(token).ok_or_else(|| {
				Error::Parse(format!(
					"{}: line {}: unknown token {:?}",
					path.display(),
					line_no + 1,
					token
				))
			})?;
			let mut row = vec![0.0; vocabulary];
			row[id] = 1.0;
			one_hot.push(row);
		}
		sequences.push(one_hot);
	}

	if sequences.is_empty() {
		return Err(Error::Parse(format!(
			"{}: no sequences found",
			path.display()
		)));
	}
	Ok(sequences)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scratch_file(name: &str, content: &str) -> std::path::PathBuf {
		let path = std::env::temp_dir().join(format!(
			"dashformer-tokenizer-{}-{}",
			std::process::id(),
			name
		));
		fs::write(&path, content).unwrap();
		path
	}

	fn tokenizer_json() -> String {
		// word_index is itself JSON, carried as a string field.
		let index = r#"{\"a\": 1, \"c\": 2, \"g\": 3, \"t\": 4}"#;
		format!(r#"{{"config": {{"word_index": "{}"}}}}"#, index)
	}

	#[test]
	fn parses_nested_word_index() {
		let path = scratch_file("tok.json", &tokenizer_json());
		let tokenizer = Tokenizer::from_file(&path).unwrap();
		assert_eq!(tokenizer.vocabulary_size(), 5);
		assert_eq!(tokenizer.token_id("A"), Some(1));
		assert_eq!(tokenizer.token_id("t"), Some(4));
		assert_eq!(tokenizer.token_id("x"), None);
		fs::remove_file(path).ok();
	}

	#[test]
	fn one_hot_encodes_sequences() {
		let tok_path = scratch_file("tok2.json", &tokenizer_json());
		let tokenizer = Tokenizer::from_file(&tok_path).unwrap();

		let seq_path = scratch_file("seq.list", "a c g,metadata ignored\nT T\n");
		let tensor = read_one_hot_sequences(&seq_path, &tokenizer).unwrap();

		assert_eq!(tensor.len(), 2);
		assert_eq!(tensor[0].len(), 3);
		assert_eq!(tensor[0][0][1], 1.0);
		assert_eq!(tensor[0][1][2], 1.0);
		assert_eq!(tensor[1][0][4], 1.0);
		assert_eq!(tensor[1][0].iter().sum::<f64>(), 1.0);

		fs::remove_file(tok_path).ok();
		fs::remove_file(seq_path).ok();
	}

	#[test]
	fn unknown_tokens_are_fatal() {
		let tok_path = scratch_file("tok3.json", &tokenizer_json());
		let tokenizer = Tokenizer::from_file(&tok_path).unwrap();

		let seq_path = scratch_file("seq-bad.list", "a z\n");
		let err = read_one_hot_sequences(&seq_path, &tokenizer).unwrap_err();
		assert!(matches!(err, Error::Parse(_)));

		fs::remove_file(tok_path).ok();
		fs::remove_file(seq_path).ok();
	}
}
