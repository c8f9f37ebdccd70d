//! Append-only, human-readable logs. Nothing reads these back.

use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const SEPARATOR: &str = "---";

#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `[timestamp] header`, the sections, and a separator line.
    pub fn append(
        &self,
        at: DateTime<Utc>,
        header: &str,
        sections: &[(&str, &str)],
    ) -> std::io::Result<()> {
        let mut record = format!("[{}] {}\n", at.to_rfc3339(), header);
        for (label, text) in sections {
            if text.contains('\n') {
                record.push_str(&format!("{label}:\n{text}\n"));
            } else {
                record.push_str(&format!("{label}: {text}\n"));
            }
        }
        record.push_str(&format!("\n{SEPARATOR}\n\n"));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(record.as_bytes())
    }

    /// Like [`append`](Self::append), but a failure is logged and dropped.
    pub fn append_best_effort(&self, at: DateTime<Utc>, header: &str, sections: &[(&str, &str)]) {
        if let Err(e) = self.append(at, header, sections) {
            tracing::warn!("Failed to append to {:?}: {}", self.path, e);
        }
    }
}
