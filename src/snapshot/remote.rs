//! Remote (UNC) path rewriting via a junction under the share (§4.6).

use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Parsed components of a `\\server\share\rest` UNC path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncPath {
	pub server: String,
	pub share: String,
	pub rest: String,
}

/// Parse a UNC path, failing if any of server/share/rest is missing.
pub fn parse_unc(path: &str) -> Result<UncPath> {
	let trimmed = path.strip_prefix("\\\\").ok_or_else(|| {
		OrchestratorError::Validation(format!("'{path}' is not a UNC path"))
	})?;
	let mut parts = trimmed.splitn(3, '\\');
	let server = parts.next().unwrap_or("").to_string();
	let share = parts.next().unwrap_or("").to_string();
	let rest = parts.next().unwrap_or("").to_string();
	if server.is_empty() {
		return Err(OrchestratorError::Validation(format!(
			"'{path}' is missing a server component"
		)));
	}
	if share.is_empty() {
		return Err(OrchestratorError::Validation(format!(
			"'{path}' is missing a share component"
		)));
	}
	Ok(UncPath { server, share, rest })
}

/// A unique junction name, e.g. `.robocurse-vss-3fae9c21-...`.
pub fn junction_name() -> String {
	format!(".robocurse-vss-{}", Uuid::new_v4())
}

/// Compose the rewritten UNC path once a junction has been created under the share.
pub fn rewrite_remote_path(unc: &UncPath, junction: &str) -> String {
	if unc.rest.is_empty() {
		format!("\\\\{}\\{}\\{}", unc.server, unc.share, junction)
	} else {
		format!("\\\\{}\\{}\\{}\\{}", unc.server, unc.share, junction, unc.rest)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_server_share_and_rest() {
		let unc = parse_unc("\\\\FILESRV\\backups\\clients\\acme").unwrap();
		assert_eq!(unc.server, "FILESRV");
		assert_eq!(unc.share, "backups");
		assert_eq!(unc.rest, "clients\\acme");
	}

	#[test]
	fn rest_may_be_empty() {
		let unc = parse_unc("\\\\FILESRV\\backups").unwrap();
		assert_eq!(unc.rest, "");
	}

	#[test]
	fn missing_share_is_an_error() {
		assert!(parse_unc("\\\\FILESRV").is_err());
	}

	#[test]
	fn non_unc_path_is_an_error() {
		assert!(parse_unc("C:\\data").is_err());
	}

	#[test]
	fn rewrite_joins_junction_and_rest() {
		let unc = UncPath {
			server: "FILESRV".into(),
			share: "backups".into(),
			rest: "clients\\acme".into(),
		};
		let rewritten = rewrite_remote_path(&unc, ".robocurse-vss-abc");
		assert_eq!(rewritten, "\\\\FILESRV\\backups\\.robocurse-vss-abc\\clients\\acme");
	}

	#[test]
	fn junction_name_has_expected_prefix() {
		assert!(junction_name().starts_with(".robocurse-vss-"));
	}
}
