use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replace `path` with `contents` so that readers only ever observe the old
/// file or the complete new one.
///
/// The data is written and fsynced to a sibling temp file, then renamed over
/// the target.  On unix the file is created owner-read/write only.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent)?;
	}

	let tmp = temp_path(path);
	let result = write_synced(&tmp, contents).and_then(|()| fs::rename(&tmp, path));
	if result.is_err() {
		let _ = fs::remove_file(&tmp);
	}
	result
}

fn temp_path(path: &Path) -> PathBuf {
	let mut name = path
		.file_name()
		.map(|n| n.to_os_string())
		.unwrap_or_default();
	name.push(format!(".tmp-{}", std::process::id()));
	path.with_file_name(name)
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
	let mut options = fs::OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(0o600);
	}
	let mut file = options.open(path)?;
	file.write_all(contents)?;
	file.sync_all()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn replaces_existing_file_and_leaves_no_temp() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("keystore.json");

		write_atomic(&path, b"first").unwrap();
		write_atomic(&path, b"second").unwrap();

		assert_eq!(fs::read(&path).unwrap(), b"second");
		let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
			.unwrap()
			.filter_map(|e| e.ok())
			.filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
			.collect();
		assert!(leftovers.is_empty());
	}

	#[cfg(unix)]
	#[test]
	fn new_files_are_owner_only() {
		use std::os::unix::fs::PermissionsExt;
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("secret.json");
		write_atomic(&path, b"{}").unwrap();
		let mode = fs::metadata(&path).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}
}
