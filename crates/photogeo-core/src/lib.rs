pub mod cancel;
pub mod index;
pub mod matcher;
pub mod metadata;
pub mod photo;
pub mod policy;
pub mod report;
pub mod scan;
pub mod writer;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::TimeDelta;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use cancel::{CancellationToken, CancelledError};
pub use index::{TimeIndexBuilder, TimeOrderedIndex};
pub use matcher::{find_nearest, MatchResult, Matcher, Nearest};
pub use photo::{Coordinate, PhotoRecord};
pub use policy::{MatchPolicy, DEFAULT_MAX_GAP_MINUTES};
pub use report::{BatchReport, Entry, Status, Summary};
pub use writer::{DryRun, ExifTool, GpsWriter, WriteError};

fn default_max_gap() -> i64 {
    DEFAULT_MAX_GAP_MINUTES
}

fn default_extensions() -> Vec<String> {
    scan::DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_exiftool() -> PathBuf {
    PathBuf::from("exiftool")
}

fn default_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeotagOptions {
    /// Directories (or single files) to scan
    #[serde(default = "default_paths")]
    pub paths: Vec<PathBuf>,
    /// Largest accepted time difference to the nearest GPS-tagged photo
    #[serde(default = "default_max_gap")]
    pub max_gap_minutes: i64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exiftool")]
    pub exiftool: PathBuf,
    #[serde(default)]
    pub overwrite_original: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Where to write the JSON report
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl Default for GeotagOptions {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            max_gap_minutes: default_max_gap(),
            extensions: default_extensions(),
            exiftool: default_exiftool(),
            overwrite_original: false,
            dry_run: false,
            report: None,
        }
    }
}

impl GeotagOptions {
    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn policy(&self) -> anyhow::Result<MatchPolicy> {
        let gap = TimeDelta::try_minutes(self.max_gap_minutes)
            .filter(|gap| *gap >= TimeDelta::zero())
            .ok_or_else(|| anyhow::anyhow!("invalid maximum gap: {} minutes", self.max_gap_minutes))?;
        Ok(MatchPolicy::new(gap))
    }

    pub fn writer(&self) -> Box<dyn GpsWriter> {
        if self.dry_run {
            Box::new(DryRun)
        } else {
            Box::new(ExifTool::new(&self.exiftool).with_overwrite_original(self.overwrite_original))
        }
    }
}

/// Control options for a run.
#[derive(Debug, Clone, Default)]
pub struct GeotagControl {
    pub cancel_token: Option<CancellationToken>,
}

impl GeotagControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Minimum spacing between two forwarded progress updates of the same run.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Rate limiter in front of a [`ProgressCallback`], shared by the worker threads.
///
/// Intermediate steps arriving within `interval` of the last forwarded one are
/// dropped. The last step of a stage always goes through so the caller sees it finish.
pub struct ThrottledProgress<'a> {
    callback: &'a ProgressCallback,
    interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(callback: &'a ProgressCallback) -> Self {
        Self::with_interval(callback, PROGRESS_INTERVAL)
    }

    pub fn with_interval(callback: &'a ProgressCallback, interval: Duration) -> Self {
        Self {
            callback,
            interval,
            last_sent: Mutex::new(None),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let last_step = current + 1 >= total;
        if last_step || self.claim_slot() {
            (self.callback)(stage, current, total, message);
        }
    }

    /// True when enough time has passed since the last forwarded update; marks now as sent.
    fn claim_slot(&self) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if last_sent.is_some_and(|sent| now.duration_since(sent) < self.interval) {
            return false;
        }
        *last_sent = Some(now);
        true
    }
}

/// Human readable delta, e.g. `1h 02m 05s`.
pub fn format_delta(delta: TimeDelta) -> String {
    let secs = delta.num_seconds().abs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Run the full scan, match and write pipeline.
pub fn process(options: &GeotagOptions, progress_callback: &ProgressCallback) -> anyhow::Result<BatchReport> {
    process_with_control(options, &GeotagControl::default(), progress_callback)
}

/// Run the full pipeline with cancellation support.
///
/// Cancelling before the scan finishes returns [`CancelledError`]; afterwards
/// the partial report is returned with the unwritten photos marked cancelled.
pub fn process_with_control(
    options: &GeotagOptions,
    control: &GeotagControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<BatchReport> {
    let tp = ThrottledProgress::new(progress_callback);
    let matcher = Matcher::new(options.policy()?);
    let writer = options.writer();

    if let Some(ref token) = control.cancel_token {
        token.check()?;
    }

    let paths: Vec<String> = options.paths.iter().map(|p| p.display().to_string()).collect();
    tracing::info!("scanning photos in: {}", paths.join(","));

    let scan = scan::scan_paths(&options.paths, &options.extensions, control.cancel_token.as_ref(), &tp)?;

    if let Some(ref token) = control.cancel_token {
        token.check()?;
    }

    tracing::info!(
        "found {} gps tagged photos, and {} without gps tag",
        scan.tagged.len(),
        scan.untagged.len()
    );

    let scanned = scan.total() as u64;
    let unreadable: Vec<(PathBuf, String)> = scan
        .unreadable
        .into_iter()
        .map(|u| (u.path, u.error.to_string()))
        .collect();

    let mut report = geotag_records(scan.tagged, &scan.untagged, &matcher, writer.as_ref(), control, &tp);
    report.summary.scanned = scanned;
    report.summary.unreadable = unreadable.len() as u64;
    report.unreadable = unreadable;

    let s = &report.summary;
    tracing::info!(
        written = s.written,
        dry_run = s.dry_run,
        rejected = s.rejected,
        no_candidates = s.no_candidates,
        failed = s.failed,
        cancelled = s.cancelled,
        "geotagging finished"
    );

    if let Some(ref path) = options.report {
        report.save(path)?;
        tracing::info!("report written to {}", path.display());
    }

    Ok(report)
}

/// Match every untagged photo against the tagged set and write accepted matches.
///
/// Matching and writing run in parallel; entries keep the order of `untagged`.
pub fn geotag_records(
    tagged: Vec<PhotoRecord>,
    untagged: &[PhotoRecord],
    matcher: &Matcher,
    writer: &dyn GpsWriter,
    control: &GeotagControl,
    progress: &ThrottledProgress,
) -> BatchReport {
    let (index, missing_gps) = TimeOrderedIndex::build(tagged);
    for photo in &missing_gps {
        tracing::warn!("{} has no gps position, not used as a source", photo.path.display());
    }

    let total = untagged.len() as u64;
    let counter = AtomicU64::new(0);

    let entries: Vec<Entry> = untagged
        .par_iter()
        .map(|photo| {
            let result = matcher.match_photo(&index, photo);
            let entry = resolve(photo, &result, writer, control);
            let current = counter.fetch_add(1, Ordering::Relaxed);
            progress.report("geotag", current, total, "Matching photos");
            entry
        })
        .collect();

    let mut report = BatchReport::default();
    report.summary.tagged = index.len() as u64;
    report.summary.untagged = total;
    for entry in entries {
        report.push(entry);
    }
    report
}

fn resolve(photo: &PhotoRecord, result: &MatchResult<'_>, writer: &dyn GpsWriter, control: &GeotagControl) -> Entry {
    let target = photo.path.display();

    let Some(nearest) = result.nearest else {
        tracing::info!("no gps tagged photo to match {target}, skipping");
        return Entry {
            photo: photo.path.clone(),
            source: None,
            delta_secs: None,
            status: Status::NoCandidates,
        };
    };

    tracing::info!(
        "found nearest match for {target} is {}, time diff: {}",
        nearest.record.path.display(),
        format_delta(nearest.delta)
    );

    let status = if !result.accepted {
        tracing::info!("time difference to nearest photo is too big, skipping {target}");
        Status::Rejected
    } else if control.is_cancelled() {
        Status::Cancelled
    } else {
        match writer.write_gps(nearest.record, &photo.path) {
            Ok(()) if writer.is_dry_run() => Status::DryRun,
            Ok(()) => Status::Written,
            Err(e) => {
                tracing::warn!("failed to copy gps data to {target}: {e}");
                Status::WriteFailed { error: e.to_string() }
            }
        }
    };

    Entry {
        photo: photo.path.clone(),
        source: Some(nearest.record.path.clone()),
        delta_secs: Some(nearest.delta.num_seconds()),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn gps(name: &str, t: NaiveDateTime) -> PhotoRecord {
        PhotoRecord::new(name, t, Some(Coordinate::new(48.85, 2.35)))
    }

    fn plain(name: &str, t: NaiveDateTime) -> PhotoRecord {
        PhotoRecord::new(name, t, None)
    }

    /// Records every write and fails for targets named in `fail_on`.
    #[derive(Default)]
    struct Recorder {
        fail_on: Vec<&'static str>,
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl GpsWriter for Recorder {
        fn write_gps(&self, source: &PhotoRecord, target: &Path) -> Result<(), WriteError> {
            self.calls.lock().unwrap().push((source.path.clone(), target.to_path_buf()));
            if self.fail_on.iter().any(|f| target == Path::new(f)) {
                return Err(WriteError::Failed {
                    program: "stub".into(),
                    status: "exit status: 1".into(),
                    stderr: "read-only file".into(),
                });
            }
            Ok(())
        }
    }

    fn ignore(_: &str, _: u64, _: u64, _: &str) {}

    static IGNORE: fn(&str, u64, u64, &str) = ignore;

    fn no_progress() -> &'static ProgressCallback {
        &IGNORE
    }

    #[test]
    fn test_geotag_outcomes() {
        let tagged = vec![gps("g2.jpg", at(9, 10)), gps("g1.jpg", at(9, 0)), gps("g3.jpg", at(9, 30))];
        let untagged = vec![plain("tie.nef", at(9, 5)), plain("early.nef", at(8, 0)), plain("late.nef", at(9, 45))];

        let writer = Recorder::default();
        let tp = ThrottledProgress::new(no_progress());
        let report = geotag_records(
            tagged,
            &untagged,
            &Matcher::new(MatchPolicy::from_minutes(20)),
            &writer,
            &GeotagControl::default(),
            &tp,
        );

        assert_eq!(report.entries.len(), 3);
        let tie = &report.entries[0];
        assert_eq!(tie.status, Status::Written);
        assert_eq!(tie.source.as_deref(), Some(Path::new("g2.jpg")));
        assert_eq!(tie.delta_secs, Some(300));

        let early = &report.entries[1];
        assert_eq!(early.status, Status::Rejected);
        assert_eq!(early.delta_secs, Some(3600));

        let late = &report.entries[2];
        assert_eq!(late.status, Status::Written);
        assert_eq!(late.source.as_deref(), Some(Path::new("g3.jpg")));

        assert_eq!(writer.calls.lock().unwrap().len(), 2);
        assert_eq!(report.summary.tagged, 3);
        assert_eq!(report.summary.untagged, 3);
        assert_eq!(report.summary.written, 2);
        assert_eq!(report.summary.rejected, 1);
    }

    #[test]
    fn test_no_candidates_without_tagged_photos() {
        let writer = Recorder::default();
        let tp = ThrottledProgress::new(no_progress());
        let report = geotag_records(
            Vec::new(),
            &[plain("a.jpg", at(12, 0))],
            &Matcher::default(),
            &writer,
            &GeotagControl::default(),
            &tp,
        );
        assert_eq!(report.entries[0].status, Status::NoCandidates);
        assert!(report.entries[0].source.is_none());
        assert!(writer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_write_does_not_stop_batch() {
        let writer = Recorder {
            fail_on: vec!["b.jpg"],
            ..Default::default()
        };
        let tp = ThrottledProgress::new(no_progress());
        let untagged: Vec<_> = ["a.jpg", "b.jpg", "c.jpg"]
            .iter()
            .map(|n| plain(n, at(10, 1)))
            .collect();
        let report = geotag_records(
            vec![gps("g.jpg", at(10, 0))],
            &untagged,
            &Matcher::default(),
            &writer,
            &GeotagControl::default(),
            &tp,
        );

        assert_eq!(writer.calls.lock().unwrap().len(), 3);
        assert_eq!(report.summary.written, 2);
        assert_eq!(report.summary.failed, 1);
        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed[0].photo, PathBuf::from("b.jpg"));
        assert!(matches!(&failed[0].status, Status::WriteFailed { error } if error.contains("read-only")));
    }

    #[test]
    fn test_cancelled_batch_skips_writes() {
        let token = CancellationToken::new();
        token.cancel();
        let control = GeotagControl::new().with_cancel_token(token);

        let writer = Recorder::default();
        let tp = ThrottledProgress::new(no_progress());
        let report = geotag_records(
            vec![gps("g.jpg", at(10, 0))],
            &[plain("a.jpg", at(10, 2)), plain("b.jpg", at(15, 0))],
            &Matcher::default(),
            &writer,
            &control,
            &tp,
        );

        assert!(writer.calls.lock().unwrap().is_empty());
        assert_eq!(report.entries[0].status, Status::Cancelled);
        // Rejections are decided without writing, so they stay final
        assert_eq!(report.entries[1].status, Status::Rejected);
        assert!(report.was_cancelled());
    }

    #[test]
    fn test_dry_run_status() {
        let tp = ThrottledProgress::new(no_progress());
        let report = geotag_records(
            vec![gps("g.jpg", at(10, 0))],
            &[plain("a.jpg", at(10, 0))],
            &Matcher::default(),
            &DryRun,
            &GeotagControl::default(),
            &tp,
        );
        assert_eq!(report.entries[0].status, Status::DryRun);
        assert_eq!(report.summary.dry_run, 1);
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(TimeDelta::seconds(42)), "42s");
        assert_eq!(format_delta(TimeDelta::seconds(305)), "5m 05s");
        assert_eq!(format_delta(TimeDelta::seconds(3725)), "1h 02m 05s");
    }

    #[test]
    fn test_options_defaults_and_policy() {
        let opts: GeotagOptions = serde_json::from_str(r#"{"paths": ["/photos"]}"#).unwrap();
        assert_eq!(opts.max_gap_minutes, 20);
        assert_eq!(opts.extensions, vec!["jpg", "jpeg", "nef"]);
        assert_eq!(opts.policy().unwrap().max_gap(), TimeDelta::minutes(20));
        assert!(!opts.writer().is_dry_run());

        let bad = GeotagOptions {
            max_gap_minutes: -1,
            ..Default::default()
        };
        assert!(bad.policy().is_err());
    }

    #[test]
    fn test_process_directory_without_exiftool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("corrupt.jpg"), b"garbage").unwrap();
        let report_path = dir.path().join("report.json");

        let options = GeotagOptions {
            paths: vec![dir.path().to_path_buf()],
            dry_run: true,
            report: Some(report_path.clone()),
            ..Default::default()
        };
        let report = process(&options, no_progress()).unwrap();

        assert_eq!(report.summary.scanned, 1);
        assert_eq!(report.summary.unreadable, 1);
        assert!(report.entries.is_empty());
        assert!(report_path.exists());
    }

    #[test]
    fn test_process_cancelled_before_scan() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let options = GeotagOptions {
            paths: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let err = process_with_control(&options, &GeotagControl::new().with_cancel_token(token), no_progress())
            .unwrap_err();
        assert!(err.downcast_ref::<CancelledError>().is_some());
    }

    #[test]
    fn test_progress_drops_bursts_but_not_the_last_step() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&seen);
        let cb = move |stage: &str, current: u64, _: u64, _: &str| {
            sink.lock().unwrap().push((stage.to_string(), current));
        };
        let tp = ThrottledProgress::with_interval(&cb, Duration::from_secs(3600));

        for current in 0..5 {
            tp.report("scan", current, 5, "");
        }
        tp.report("write", 0, 2, "");

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("scan".to_string(), 0), ("scan".to_string(), 4)]);
    }
}
