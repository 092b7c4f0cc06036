//! Engine control core: sampling schedule, fixed-point PID, RPM estimation
//! and double-buffered data records.
//!
//! Hardware-free. The firmware binary feeds it [`state::SensorFrame`]s and
//! flywheel edge times and drives servos from the returned pulse widths.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod calibration;
pub mod commands;
pub mod config;
pub mod error;
pub mod math;
pub mod pid;
pub mod records;
pub mod report;
pub mod rpm;
pub mod scheduler;
pub mod settings;
pub mod shared;
pub mod state;

pub use error::Error;
pub use scheduler::Scheduler;
pub use shared::SharedEcu;
