// SPDX-License-Identifier: MIT OR Apache-2.0

//! # JSON Lines Source
//!
//! Reads one JSON record per line on a background thread and feeds them into
//! a [`RecordBuffer`]. The line number (starting at 1) becomes the record
//! offset, so re-reading the same input after a restart is recognised as a
//! replay.
//!
//! Malformed lines are logged and skipped; blank lines are ignored. The reader
//! stays at most [`READ_AHEAD`] records ahead of the scheduler.

use super::RecordSource;
use crate::core::error::{EngineError, EngineResult};
use crate::core::event::Record;
use crate::core::stream::input::buffer::{RecordBuffer, RecordSender};
use crate::core::stream::input::mapper::JsonRecordMapper;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Records buffered between the reader thread and the scheduler
pub const READ_AHEAD: usize = 8192;

#[derive(Debug)]
pub struct JsonLinesSource {
    buffer: RecordBuffer,
    running: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
}

impl JsonLinesSource {
    /// Start reading `reader` on a new thread
    pub fn spawn<R>(reader: R, mapper: JsonRecordMapper) -> EngineResult<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (sender, buffer) = RecordBuffer::bounded(READ_AHEAD);
        let running = Arc::new(AtomicBool::new(true));
        let malformed = Arc::new(AtomicU64::new(0));

        let thread_running = Arc::clone(&running);
        let thread_malformed = Arc::clone(&malformed);
        thread::Builder::new()
            .name("fareflux-json-reader".to_string())
            .spawn(move || read_lines(reader, mapper, sender, thread_running, thread_malformed))
            .map_err(|e| EngineError::source_failure(format!("failed to start reader thread: {}", e)))?;

        Ok(Self {
            buffer,
            running,
            malformed,
        })
    }

    /// Read records from the file at `path`
    pub fn open(path: impl AsRef<Path>, mapper: JsonRecordMapper) -> EngineResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            EngineError::source_failure(format!("cannot open '{}': {}", path.display(), e))
        })?;
        Self::spawn(BufReader::new(file), mapper)
    }

    /// Lines skipped because they could not be mapped
    pub fn malformed_lines(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

fn read_lines<R: BufRead>(
    reader: R,
    mapper: JsonRecordMapper,
    sender: RecordSender,
    running: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
) {
    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line_number = index as u64 + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("[JsonLinesSource] read failed at line {}: {}", line_number, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = match mapper.map(&line) {
            Ok(record) => record.with_offset(line_number),
            Err(e) => {
                malformed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[JsonLinesSource] skipping line {}: {}", line_number, e);
                continue;
            }
        };
        if sender.send(record).is_err() {
            // consumer gone
            break;
        }
    }
    log::debug!("[JsonLinesSource] reader finished");
}

impl RecordSource for JsonLinesSource {
    fn next_batch(&mut self, timeout: Option<Duration>) -> EngineResult<Vec<Record>> {
        self.buffer.next_batch(timeout)
    }

    fn is_exhausted(&self) -> bool {
        self.buffer.is_exhausted()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
