// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Record Buffer
//!
//! Thread-safe queue between record producers and the trigger scheduler.
//!
//! ```text
//! producer threads ──RecordSender──▶ channel ──▶ RecordBuffer::next_batch ──▶ scheduler
//! ```
//!
//! An unbounded buffer never blocks producers; a bounded one blocks them while
//! it is full, which holds a fast reader back to the pace of the trigger
//! cycle. The buffer is exhausted once every sender has been dropped and the
//! queue has been drained.

use super::source::RecordSource;
use crate::core::error::{EngineError, EngineResult};
use crate::core::event::Record;
use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Producer side of a [`RecordBuffer`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RecordSender {
    sender: Sender<Record>,
    next_offset: Arc<Mutex<u64>>,
}

impl RecordSender {
    /// Enqueue a record as is, keeping any offset assigned by the producer
    pub fn send(&self, record: Record) -> EngineResult<()> {
        self.sender
            .send(record)
            .map_err(|_| EngineError::stopped("record buffer has been closed"))
    }

    /// Enqueue a record under the next buffer-assigned offset.
    ///
    /// Offsets are assigned and enqueued under one lock, so queue order matches
    /// offset order across concurrent producers.
    pub fn send_next(&self, mut record: Record) -> EngineResult<u64> {
        let mut next = self
            .next_offset
            .lock()
            .map_err(|_| EngineError::other("record offset counter is poisoned"))?;
        let offset = *next;
        record.offset = Some(offset);
        self.send(record)?;
        *next += 1;
        Ok(offset)
    }
}

/// Consumer side, drained by the scheduler once per cycle
#[derive(Debug)]
pub struct RecordBuffer {
    receiver: Receiver<Record>,
    exhausted: bool,
}

impl RecordBuffer {
    /// Unbounded buffer with offsets assigned from 1
    pub fn new() -> (RecordSender, RecordBuffer) {
        Self::from_channel(unbounded(), 1)
    }

    /// Buffer holding at most `capacity` records; producers block when it is full
    pub fn bounded(capacity: usize) -> (RecordSender, RecordBuffer) {
        Self::from_channel(bounded(capacity), 1)
    }

    fn from_channel(
        (sender, receiver): (Sender<Record>, Receiver<Record>),
        first_offset: u64,
    ) -> (RecordSender, RecordBuffer) {
        (
            RecordSender {
                sender,
                next_offset: Arc::new(Mutex::new(first_offset)),
            },
            RecordBuffer {
                receiver,
                exhausted: false,
            },
        )
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl RecordSource for RecordBuffer {
    /// Wait up to `timeout` for the first record, then drain whatever else is queued.
    ///
    /// `None` never waits.
    fn next_batch(&mut self, timeout: Option<Duration>) -> EngineResult<Vec<Record>> {
        let mut batch = Vec::new();
        if self.exhausted {
            return Ok(batch);
        }

        let first = match timeout {
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(record) => Some(record),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.exhausted = true;
                    None
                }
            },
            None => None,
        };
        batch.extend(first);

        loop {
            match self.receiver.try_recv() {
                Ok(record) => batch.push(record),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        Ok(batch)
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
