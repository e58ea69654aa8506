//! Local volume path rewriting (§4.6): substitutes a drive-letter prefix with the snapshot's
//! device path.

use crate::error::{OrchestratorError, Result};

/// Extract the drive-letter volume (`C:`, lowercase accepted) from `path`, rejecting UNC paths.
pub fn extract_volume(path: &str) -> Result<String> {
	if path.starts_with("\\\\") {
		return Err(OrchestratorError::Validation(
			"extract_volume does not accept UNC paths".into(),
		));
	}
	let bytes = path.as_bytes();
	if bytes.len() < 2 || !bytes[0].is_ascii_alphabetic() || bytes[1] != b':' {
		return Err(OrchestratorError::Validation(format!(
			"'{path}' does not start with a drive letter"
		)));
	}
	Ok(format!("{}:", bytes[0].to_ascii_uppercase() as char))
}

/// Rewrite `original` so it reads from `shadow_path` instead of its original volume.
///
/// `original = <volume><rest>`; the result is `shadow_path + rest`, with `rest` retaining its
/// separator and trailing content verbatim.
pub fn rewrite_local_path(original: &str, shadow_path: &str) -> Result<String> {
	let volume = extract_volume(original)?;
	let rest = &original[volume.len()..];
	Ok(format!("{shadow_path}{rest}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_uppercase_volume() {
		assert_eq!(extract_volume("C:\\data\\x").unwrap(), "C:");
	}

	#[test]
	fn extracts_and_normalizes_lowercase_volume() {
		assert_eq!(extract_volume("c:\\data").unwrap(), "C:");
	}

	#[test]
	fn rejects_unc_paths() {
		assert!(extract_volume("\\\\server\\share\\x").is_err());
	}

	#[test]
	fn rewrite_substitutes_prefix_and_preserves_rest() {
		let rewritten = rewrite_local_path(
			"C:\\data\\file.txt",
			"\\\\?\\GLOBALROOT\\Device\\HarddiskVolumeShadowCopy7",
		)
		.unwrap();
		assert_eq!(
			rewritten,
			"\\\\?\\GLOBALROOT\\Device\\HarddiskVolumeShadowCopy7\\data\\file.txt"
		);
	}
}
