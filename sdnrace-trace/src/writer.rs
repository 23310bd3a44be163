//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::hb::HbEvent;

// Default trace file name inside the results directory.
pub const DEFAULT_TRACE_FILENAME: &str = "hb.json";

// Append-only writer for the newline-delimited JSON trace file. Every
// record is flushed as soon as it is written so a partial trace stays
// usable after a crash.
#[derive(Debug)]
pub struct TraceWriter {
    file: File,
    path: PathBuf,
}

// ===== impl TraceWriter =====

impl TraceWriter {
    // Creates the trace file, truncating any previous run's output.
    pub fn create(
        results_dir: &Path,
        filename: &str,
    ) -> std::io::Result<TraceWriter> {
        let path = results_dir.join(filename);
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(TraceWriter { file, path })
    }

    // Appends one event record to the trace file.
    pub fn write_event(&mut self, event: &HbEvent) -> std::io::Result<()> {
        let line =
            serde_json::to_string(event).map_err(std::io::Error::other)?;
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ===== global functions =====

// Reads a persisted trace back into memory. Unparseable lines are logged
// and skipped so a truncated trace can still be analysed.
pub fn read_events(path: &Path) -> std::io::Result<Vec<HbEvent>> {
    let file = File::open(path)?;
    let mut events = vec![];

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(event) => events.push(event),
            Err(error) => {
                warn!(%error, lineno, "failed to parse trace record");
            }
        }
    }

    Ok(events)
}
