//! Result file writing.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::Result;

/// Writes one row of tab-separated logits per sequence into
/// `output.txt` under the given directory.
pub fn write_logits(dir: &Path, logits: &[Vec<f64>]) -> Result<()> {
	fs::create_dir_all(dir)?;
	let mut file = fs::File::create(dir.join("output.txt"))?;
	for row in logits {
		let line = row
			.iter()
			.map(|v| v.to_string())
			.collect::<Vec<_>>()
			.join("\t");
		writeln!(file, "{}", line)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn writes_tab_separated_rows() {
		let dir = std::env::temp_dir().join(format!("dashformer-out-{}", std::process::id()));
		write_logits(&dir, &[vec![1.5, -2.0], vec![0.25, 3.0]]).unwrap();

		let content = fs::read_to_string(dir.join("output.txt")).unwrap();
		assert_eq!(content, "1.5\t-2\n0.25\t3\n");

		fs::remove_dir_all(dir).ok();
	}
}
