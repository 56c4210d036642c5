// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod policy;
pub mod scheduler;
pub mod state;

pub use policy::{TriggerMode, TriggerPolicy};
pub use scheduler::{SchedulerHandle, TriggerScheduler};
pub use state::TriggerState;
