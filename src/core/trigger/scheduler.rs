// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Trigger Scheduler
//!
//! Drives an [`AggregationEngine`] from a [`RecordSource`] on a dedicated
//! thread, one engine cycle per trigger.
//!
//! - **interval**: a cycle every `trigger.interval`, draining whatever the
//!   source has buffered by then (possibly nothing)
//! - **on-arrival**: a cycle as soon as records are available; the interval
//!   only bounds how long the scheduler waits before checking for shutdown
//!
//! The loop ends when the source is exhausted or [`SchedulerHandle::shutdown`]
//! is called. A signal is observed between cycles only, so the cycle in
//! progress always completes; one final cycle then drains the source before
//! the engine is shut down and handed back through [`SchedulerHandle::join`].
//! An exhausted source has nothing left to drain, so its last batch is the
//! final cycle.
//! A fatal cycle error ends the loop at once and is returned from `join`.

use super::policy::TriggerMode;
use crate::core::aggregation_engine::AggregationEngine;
use crate::core::error::{EngineError, EngineResult};
use crate::core::event::Record;
use crate::core::persistence::SnapshotService;
use crate::core::stream::input::source::RecordSource;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub struct TriggerScheduler {
    engine: AggregationEngine,
    checkpoints: Option<(SnapshotService, u64)>,
}

impl TriggerScheduler {
    pub fn new(engine: AggregationEngine) -> Self {
        Self {
            engine,
            checkpoints: None,
        }
    }

    /// Persist a snapshot every `every_cycles` cycles and after the final cycle
    pub fn with_checkpoints(mut self, service: SnapshotService, every_cycles: u64) -> Self {
        self.checkpoints = Some((service, every_cycles.max(1)));
        self
    }

    /// Start the trigger loop on its own thread
    pub fn spawn<S>(self, source: S) -> EngineResult<SchedulerHandle>
    where
        S: RecordSource + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let name = format!("fareflux-scheduler-{}", self.engine.name());
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || self.run(source, shutdown_rx))
            .map_err(|e| EngineError::other(format!("failed to start scheduler thread: {}", e)))?;
        Ok(SchedulerHandle {
            shutdown_tx,
            thread,
        })
    }

    fn run<S: RecordSource>(
        self,
        mut source: S,
        shutdown_rx: Receiver<()>,
    ) -> EngineResult<AggregationEngine> {
        let result = self.drive(&mut source, shutdown_rx);
        if let Err(e) = &result {
            log::error!("[TriggerScheduler] stopped on error: {}", e);
            source.stop();
        }
        result
    }

    fn drive<S: RecordSource>(
        mut self,
        source: &mut S,
        shutdown_rx: Receiver<()>,
    ) -> EngineResult<AggregationEngine> {
        let policy = self.engine.config().trigger;
        log::info!(
            "[TriggerScheduler] '{}' started ({} trigger, every {:?})",
            self.engine.name(),
            policy.mode.as_str(),
            policy.interval
        );
        source.validate_connectivity()?;

        let mut next_tick = Instant::now() + policy.interval;
        let exhausted = loop {
            let signalled = match policy.mode {
                TriggerMode::Interval => {
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    !matches!(shutdown_rx.recv_timeout(wait), Err(RecvTimeoutError::Timeout))
                }
                TriggerMode::OnArrival => {
                    !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty))
                }
            };
            if signalled {
                break false;
            }

            let batch = match policy.mode {
                TriggerMode::Interval => {
                    next_tick += policy.interval;
                    let now = Instant::now();
                    if next_tick < now {
                        next_tick = now + policy.interval;
                    }
                    source.next_batch(None)?
                }
                TriggerMode::OnArrival => source.next_batch(Some(policy.interval))?,
            };

            if source.is_exhausted() {
                self.cycle(batch)?;
                break true;
            }
            if batch.is_empty() && policy.mode == TriggerMode::OnArrival {
                continue;
            }
            self.cycle(batch)?;
        };

        if exhausted {
            log::info!("[TriggerScheduler] source exhausted after cycle {}", self.engine.cycle());
        } else {
            log::info!("[TriggerScheduler] shutdown requested, draining");
            let remaining = source.next_batch(None)?;
            self.cycle(remaining)?;
        }
        source.stop();
        self.checkpoint();
        self.engine.shutdown();
        Ok(self.engine)
    }

    fn cycle(&mut self, batch: Vec<Record>) -> EngineResult<()> {
        self.engine.run_cycle(batch)?;
        if let Some((_, every)) = &self.checkpoints {
            if self.engine.cycle() % every == 0 {
                self.checkpoint();
            }
        }
        Ok(())
    }

    /// Persistence failures are logged; processing continues from memory
    fn checkpoint(&self) {
        if let Some((service, _)) = &self.checkpoints {
            if let Err(e) = service.persist(&self.engine.snapshot()) {
                log::error!(
                    "[TriggerScheduler] checkpoint at cycle {} failed: {}",
                    self.engine.cycle(),
                    e
                );
            }
        }
    }
}

/// Control handle for a running [`TriggerScheduler`].
///
/// Dropping the handle without calling `join` also stops the loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: Sender<()>,
    thread: JoinHandle<EngineResult<AggregationEngine>>,
}

impl SchedulerHandle {
    /// Ask the loop to stop after the cycle in progress and a final drain
    pub fn shutdown(&self) {
        // full means a signal is already pending
        let _ = self.shutdown_tx.try_send(());
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to end and take back the stopped engine
    pub fn join(self) -> EngineResult<AggregationEngine> {
        let SchedulerHandle {
            shutdown_tx,
            thread,
        } = self;
        let result = thread
            .join()
            .map_err(|_| EngineError::other("scheduler thread panicked"))?;
        drop(shutdown_tx);
        result
    }
}
