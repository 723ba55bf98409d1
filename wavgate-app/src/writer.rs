//! Segment persistence: one WAV file per segment plus an optional JSONL
//! index.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::info;
use wavgate_core::{CompletedSegment, SegmentKind, SegmentSummary};

use crate::settings::AppSettings;

const INDEX_FILE: &str = "segments.jsonl";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexRecord<'a> {
    #[serde(flatten)]
    summary: SegmentSummary,
    file: &'a str,
    captured_at: DateTime<Utc>,
}

pub struct SegmentWriter {
    dir: PathBuf,
    timestamp_names: bool,
    index: Option<File>,
    written: usize,
}

impl SegmentWriter {
    pub fn create(settings: &AppSettings) -> Result<Self> {
        let dir = settings.output_dir.clone();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        let index = if settings.write_index {
            let path = dir.join(INDEX_FILE);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Some(file)
        } else {
            None
        };
        Ok(Self {
            dir,
            timestamp_names: settings.timestamp_names,
            index,
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn write(&mut self, segment: &CompletedSegment) -> Result<PathBuf> {
        let now = Utc::now();
        let name = file_name(segment.seq, segment.kind, self.timestamp_names.then_some(now));
        let path = self.dir.join(&name);
        fs::write(&path, &segment.wav)
            .with_context(|| format!("failed to write {}", path.display()))?;

        let summary = segment.summary();
        let summary_json = serde_json::to_string(&summary)?;
        info!(file = %path.display(), summary = %summary_json, "segment saved");
        if let Some(index) = self.index.as_mut() {
            append_record(index, summary, &name, now)?;
        }
        self.written += 1;
        Ok(path)
    }
}

fn file_name(seq: u64, kind: SegmentKind, at: Option<DateTime<Utc>>) -> String {
    let kind = match kind {
        SegmentKind::Complete => "complete",
        SegmentKind::Snapshot => "snapshot",
        SegmentKind::Flush => "flush",
    };
    match at {
        Some(at) => format!(
            "segment-{}-{seq}-{kind}.wav",
            at.with_timezone(&Local).format("%Y%m%d-%H%M%S")
        ),
        None => format!("segment-{seq}-{kind}.wav"),
    }
}

fn append_record(
    index: &mut File,
    summary: SegmentSummary,
    file: &str,
    captured_at: DateTime<Utc>,
) -> Result<()> {
    let record = IndexRecord {
        summary,
        file,
        captured_at,
    };
    let mut line = serde_json::to_string(&record)?;
    line.push('\n');
    index
        .write_all(line.as_bytes())
        .context("failed to append segment index")
}
