//! Filesystem inspection for model assets and built app bundles.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::Pattern;
use tracing::debug;

use crate::check::Mode;

/// One expected asset file and what was found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReport {
    pub path: PathBuf,
    /// Final path component, used in printed output.
    pub name: String,
    /// Size in bytes, or `None` if the path does not exist.
    pub size_bytes: Option<u64>,
}

impl AssetReport {
    fn inspect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let size_bytes = std::fs::metadata(path).ok().map(|m| m.len());
        Self {
            path: path.to_path_buf(),
            name,
            size_bytes,
        }
    }

    pub fn is_present(&self) -> bool {
        self.size_bytes.is_some()
    }

    pub fn size_mb(&self) -> Option<f64> {
        self.size_bytes.map(|b| b as f64 / (1024.0 * 1024.0))
    }
}

/// Stat each expected asset file in order.
///
/// In [`Mode::Basic`] inspection stops after the first missing file, so the
/// returned list ends with that file. In [`Mode::Complete`] every path is
/// inspected.
pub fn inspect_source_files(paths: &[PathBuf], mode: Mode) -> Vec<AssetReport> {
    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let report = AssetReport::inspect(path);
        let missing = !report.is_present();
        debug!(path = %path.display(), size = ?report.size_bytes, "Inspected asset");
        reports.push(report);
        if missing && mode.stops_on_failure() {
            break;
        }
    }
    reports
}

/// Sorted entry names of the bundled models directory.
///
/// # Errors
///
/// Returns the I/O error if the directory is missing or unreadable.
pub fn list_bundled_models(models_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = std::fs::read_dir(models_dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Locate a simulator build of `app_name` under an Xcode DerivedData root.
///
/// Matches `<derived>/<app_name>-*/Build/Products/Debug-iphonesimulator/<app_name>.app`
/// and returns the most recently modified match.
pub fn discover_app_bundle(derived_data_dir: &Path, app_name: &str) -> Option<PathBuf> {
    let escaped_app = Pattern::escape(app_name);
    let pattern = format!(
        "{}/{}-*/Build/Products/Debug-iphonesimulator/{}.app",
        Pattern::escape(&derived_data_dir.to_string_lossy()),
        escaped_app,
        escaped_app,
    );
    debug!(%pattern, "Searching for built app");

    glob::glob(&pattern)
        .ok()?
        .filter_map(Result::ok)
        .filter(|path| path.is_dir())
        .max_by_key(|path| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn complete_mode_reports_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_file(dir.path(), "model", 2 * 1024 * 1024);
        let paths = vec![model, dir.path().join("tokenizer"), dir.path().join("vocab")];

        let reports = inspect_source_files(&paths, Mode::Complete);

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].name, "model");
        assert_eq!(reports[0].size_mb(), Some(2.0));
        assert!(!reports[1].is_present());
        assert!(!reports[2].is_present());
    }

    #[test]
    fn basic_mode_stops_at_first_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write_file(dir.path(), "model", 10),
            dir.path().join("tokenizer"),
            write_file(dir.path(), "config", 10),
        ];

        let reports = inspect_source_files(&paths, Mode::Basic);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].name, "tokenizer");
        assert!(!reports[1].is_present());
    }

    #[test]
    fn basic_mode_with_all_present_inspects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![write_file(dir.path(), "a", 1), write_file(dir.path(), "b", 1)];

        assert_eq!(inspect_source_files(&paths, Mode::Basic).len(), 2);
    }

    #[test]
    fn list_bundled_models_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "vocab", 1);
        write_file(dir.path(), "config", 1);
        write_file(dir.path(), "model", 1);

        let names = list_bundled_models(dir.path()).unwrap();
        assert_eq!(names, vec!["config", "model", "vocab"]);
    }

    #[test]
    fn list_bundled_models_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_bundled_models(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn discover_app_bundle_finds_derived_data_build() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir
            .path()
            .join("MyApp-abcdef")
            .join("Build/Products/Debug-iphonesimulator/MyApp.app");
        fs::create_dir_all(&app).unwrap();
        // A different project must not match.
        fs::create_dir_all(
            dir.path()
                .join("Other-123")
                .join("Build/Products/Debug-iphonesimulator/Other.app"),
        )
        .unwrap();

        assert_eq!(discover_app_bundle(dir.path(), "MyApp"), Some(app));
    }

    #[test]
    fn discover_app_bundle_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_app_bundle(dir.path(), "MyApp").is_none());
    }
}
