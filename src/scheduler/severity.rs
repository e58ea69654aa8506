//! Fixed bit-flag severity mapping for copy-tool exit codes (§4.4).
//!
//! Exit codes are bitsets: bit 0 is a successful-copy indicator, bit 1 a mismatch, bit 2 an
//! access-denied/retryable error, bit 3 a fatal error. Any bit 2 or 3 set maps to `Error`/
//! `Fatal`; mismatch alone maps to the per-profile `mismatch_severity` override (default
//! `Warning`); otherwise `Success`.

use crate::model::{MismatchSeverity, Severity};
use crate::traits::ExitMeaning;

const FLAG_SUCCESS: i32 = 0b0001;
const FLAG_MISMATCH: i32 = 0b0010;
const FLAG_ERROR: i32 = 0b0100;
const FLAG_FATAL: i32 = 0b1000;

/// Map a copy-tool exit code to its severity, honoring a per-profile mismatch override.
pub fn classify(exit_code: i32, mismatch_override: Option<MismatchSeverity>) -> ExitMeaning {
	if exit_code & FLAG_FATAL != 0 {
		return ExitMeaning {
			severity: Severity::Fatal,
			message: format!("copy tool exited fatally (code {exit_code})"),
			should_retry: true,
		};
	}
	if exit_code & FLAG_ERROR != 0 {
		return ExitMeaning {
			severity: Severity::Error,
			message: format!("copy tool reported an error (code {exit_code})"),
			should_retry: true,
		};
	}
	if exit_code & FLAG_MISMATCH != 0 {
		let severity = match mismatch_override.unwrap_or(MismatchSeverity::Warning) {
			MismatchSeverity::Success => Severity::Success,
			MismatchSeverity::Warning => Severity::Warning,
			MismatchSeverity::Error => Severity::Error,
		};
		let should_retry = severity == Severity::Error;
		return ExitMeaning {
			severity,
			message: format!("copy tool reported a file mismatch (code {exit_code})"),
			should_retry,
		};
	}
	if exit_code & FLAG_SUCCESS != 0 || exit_code == 0 {
		return ExitMeaning {
			severity: Severity::Success,
			message: "copy completed".into(),
			should_retry: false,
		};
	}
	ExitMeaning {
		severity: Severity::Warning,
		message: format!("copy tool exited with unrecognized code {exit_code}"),
		should_retry: false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clean_run_is_success() {
		assert_eq!(classify(0, None).severity, Severity::Success);
		assert_eq!(classify(FLAG_SUCCESS, None).severity, Severity::Success);
	}

	#[test]
	fn fatal_bit_wins_over_everything() {
		let m = classify(FLAG_SUCCESS | FLAG_MISMATCH | FLAG_ERROR | FLAG_FATAL, None);
		assert_eq!(m.severity, Severity::Fatal);
		assert!(m.should_retry);
	}

	#[test]
	fn error_bit_is_retryable() {
		let m = classify(FLAG_ERROR, None);
		assert_eq!(m.severity, Severity::Error);
		assert!(m.should_retry);
	}

	#[test]
	fn mismatch_defaults_to_warning_and_no_retry() {
		let m = classify(FLAG_MISMATCH, None);
		assert_eq!(m.severity, Severity::Warning);
		assert!(!m.should_retry);
	}

	#[test]
	fn mismatch_override_to_error_is_retryable() {
		let m = classify(FLAG_MISMATCH, Some(MismatchSeverity::Error));
		assert_eq!(m.severity, Severity::Error);
		assert!(m.should_retry);
	}

	#[test]
	fn mismatch_override_to_success_suppresses_retry() {
		let m = classify(FLAG_MISMATCH, Some(MismatchSeverity::Success));
		assert_eq!(m.severity, Severity::Success);
		assert!(!m.should_retry);
	}
}
