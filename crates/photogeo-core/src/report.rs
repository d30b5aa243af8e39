use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What happened to one untagged photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Written,
    DryRun,
    /// Nearest tagged photo was further away than the maximum gap
    Rejected,
    /// No tagged photos to match against
    NoCandidates,
    WriteFailed { error: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub photo: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_secs: Option<i64>,
    #[serde(flatten)]
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub scanned: u64,
    pub tagged: u64,
    pub untagged: u64,
    pub unreadable: u64,
    pub written: u64,
    pub dry_run: u64,
    pub rejected: u64,
    pub no_candidates: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Per-photo outcomes of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub summary: Summary,
    pub entries: Vec<Entry>,
    /// Candidate files skipped for unreadable metadata, with the reason
    #[serde(default)]
    pub unreadable: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn push(&mut self, entry: Entry) {
        let s = &mut self.summary;
        match entry.status {
            Status::Written => s.written += 1,
            Status::DryRun => s.dry_run += 1,
            Status::Rejected => s.rejected += 1,
            Status::NoCandidates => s.no_candidates += 1,
            Status::WriteFailed { .. } => s.failed += 1,
            Status::Cancelled => s.cancelled += 1,
        }
        self.entries.push(entry);
    }

    pub fn failures(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, Status::WriteFailed { .. }))
    }

    pub fn was_cancelled(&self) -> bool {
        self.summary.cancelled > 0
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}
