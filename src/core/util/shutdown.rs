// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process shutdown
//!
//! A stop is raised either by Ctrl-C or by any [`ShutdownHandle::request`].
//! The binary's supervision loop observes it and forwards it to the trigger
//! scheduler, which finishes the cycle in progress and drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Requested,
}

#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.handle().request();
    }

    /// Resolve on Ctrl-C or on the first programmatic request.
    ///
    /// When the interrupt handler cannot be installed only programmatic
    /// requests remain.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        if self.is_shutdown() {
            return ShutdownReason::Requested;
        }
        let interrupt = async {
            match signal::ctrl_c().await {
                Ok(()) => log::info!("[Shutdown] interrupt received, draining"),
                Err(e) => {
                    log::error!("[Shutdown] cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = interrupt => {
                self.requested.store(true, Ordering::Release);
                ShutdownReason::Interrupt
            }
            _ = self.wake.notified() => ShutdownReason::Requested,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            requested: Arc::clone(&self.requested),
            wake: Arc::clone(&self.wake),
        }
    }
}

/// Cloneable view of a [`ShutdownCoordinator`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Raise the stop; repeated requests are no-ops
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::AcqRel) {
            log::info!("[Shutdown] stop requested");
            // stores a permit if nobody is waiting yet
            self.wake.notify_one();
        }
    }
}
