use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cancel::{CancellationToken, CancelledError};
use crate::metadata::{self, ReadError};
use crate::photo::PhotoRecord;
use crate::ThrottledProgress;

/// Extensions recognised as photos when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "nef"];

/// A candidate file whose metadata could not be used
#[derive(Debug)]
pub struct Unreadable {
    pub path: PathBuf,
    pub error: ReadError,
}

/// Result of scanning all source paths
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Photos with both capture time and GPS position
    pub tagged: Vec<PhotoRecord>,
    /// Photos with a capture time but no GPS position
    pub untagged: Vec<PhotoRecord>,
    pub unreadable: Vec<Unreadable>,
}

impl ScanResult {
    pub fn total(&self) -> usize {
        self.tagged.len() + self.untagged.len() + self.unreadable.len()
    }
}

/// Split records by GPS presence: `(tagged, untagged)`.
pub fn partition(records: impl IntoIterator<Item = PhotoRecord>) -> (Vec<PhotoRecord>, Vec<PhotoRecord>) {
    records.into_iter().partition(PhotoRecord::has_gps)
}

/// Case-insensitive extension check against the configured list
pub fn is_photo(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

/// Collect candidate photo files under every root.
pub fn collect_candidates(roots: &[PathBuf], extensions: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for root in roots {
        if !root.exists() {
            anyhow::bail!("source path does not exist: {}", root.display());
        }

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(e).with_context(|| format!("cannot read {}", root.display()));
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable entry: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if is_photo(entry.path(), extensions) {
                files.push(entry.into_path());
            } else {
                tracing::debug!("skip non-photo file: {}", entry.path().display());
            }
        }
    }

    Ok(files)
}

/// Walk all roots and read metadata of every photo in parallel.
///
/// Stops with [`CancelledError`] as soon as `cancel` fires; files not yet read are skipped.
pub fn scan_paths(
    roots: &[PathBuf],
    extensions: &[String],
    cancel: Option<&CancellationToken>,
    progress: &ThrottledProgress,
) -> anyhow::Result<ScanResult> {
    let check = || cancel.map_or(Ok(()), CancellationToken::check);

    let files = collect_candidates(roots, extensions)?;
    check()?;
    let total = files.len() as u64;
    let counter = AtomicU64::new(0);

    let outcomes: Vec<(PathBuf, Result<PhotoRecord, ReadError>)> = files
        .into_par_iter()
        .map(|path| -> Result<_, CancelledError> {
            check()?;
            let outcome = metadata::read_photo(&path);
            let current = counter.fetch_add(1, Ordering::Relaxed);
            progress.report("scan", current, total, "Reading EXIF");
            Ok((path, outcome))
        })
        .collect::<Result<_, CancelledError>>()?;

    let mut result = ScanResult::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(record) => {
                match record.coordinate {
                    Some(c) => tracing::debug!(
                        "{}: taken {}, gps {}",
                        path.display(),
                        record.captured_at,
                        c
                    ),
                    None => tracing::debug!("{}: taken {}, no gps", path.display(), record.captured_at),
                }
                if record.has_gps() {
                    result.tagged.push(record);
                } else {
                    result.untagged.push(record);
                }
            }
            Err(error) => {
                tracing::warn!("failed to read photo {}: {error}", path.display());
                result.unreadable.push(Unreadable { path, error });
            }
        }
    }

    progress.report("scan", total, total, "Scan complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photo::Coordinate;
    use chrono::NaiveDate;
    use std::fs;

    fn exts() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_photo() {
        let exts = exts();
        assert!(is_photo(Path::new("a/IMG_0001.JPG"), &exts));
        assert!(is_photo(Path::new("b.jpeg"), &exts));
        assert!(is_photo(Path::new("DSC_1234.nef"), &exts));
        assert!(!is_photo(Path::new("notes.txt"), &exts));
        assert!(!is_photo(Path::new("jpg"), &exts));
        assert!(!is_photo(Path::new("movie.mp4"), &exts));
    }

    #[test]
    fn test_partition_by_gps() {
        let t = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let (tagged, untagged) = partition(vec![
            PhotoRecord::new("a.jpg", t, Some(Coordinate::new(1.0, 1.0))),
            PhotoRecord::new("b.jpg", t, None),
            PhotoRecord::new("c.jpg", t, None),
        ]);
        assert_eq!(tagged.len(), 1);
        assert_eq!(untagged.len(), 2);
    }

    #[test]
    fn test_collect_candidates_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("day1").join("burst");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(nested.join("b.JPEG"), b"x").unwrap();
        fs::write(nested.join("readme.md"), b"x").unwrap();

        let mut files = collect_candidates(&[dir.path().to_path_buf()], &exts()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some()));
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(collect_candidates(&[missing], &exts()).is_err());
    }

    #[test]
    fn test_scan_reports_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.jpg"), b"not really a jpeg").unwrap();
        fs::write(dir.path().join("skip.txt"), b"text").unwrap();

        let cb = |_: &str, _: u64, _: u64, _: &str| {};
        let tp = ThrottledProgress::new(&cb);
        let result = scan_paths(&[dir.path().to_path_buf()], &exts(), None, &tp).unwrap();

        assert!(result.tagged.is_empty());
        assert!(result.untagged.is_empty());
        assert_eq!(result.unreadable.len(), 1);
        assert_eq!(result.total(), 1);
    }

    #[test]
    fn test_scan_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            fs::write(dir.path().join(format!("img_{i}.jpg")), b"x").unwrap();
        }
        let token = CancellationToken::new();
        token.cancel();

        let cb = |_: &str, _: u64, _: u64, _: &str| {};
        let tp = ThrottledProgress::new(&cb);
        let err = scan_paths(&[dir.path().to_path_buf()], &exts(), Some(&token), &tp).unwrap_err();
        assert!(err.downcast_ref::<CancelledError>().is_some());
    }
}
