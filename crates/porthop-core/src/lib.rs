//! # porthop Core
//!
//! Port schedule for the porthop forwarder.
//!
//! This crate provides:
//! - RFC 6238 one-time codes keyed by a base32 shared secret
//! - Period-aligned time windows with a validity extension
//! - Port derivation from a window start
//! - The ordered set of ports valid for a list of probe offsets
//! - The validated link configuration
//!
//! Everything here is a pure function of its inputs; callers supply `now`.
//!
//! ## Example
//!
//! ```
//! use porthop_core::{PortSchedule, ScheduleParams, TotpGenerator};
//!
//! let totp = TotpGenerator::from_base32("JBSWY3DPEHPK3PXP").unwrap();
//! let schedule = PortSchedule::new(
//!     totp,
//!     ScheduleParams {
//!         period: 30,
//!         extension: 15,
//!         base_port: 3000,
//!         port_range: 1000,
//!         offsets: vec![-15, 0, 15],
//!     },
//! )
//! .unwrap();
//!
//! for assignment in schedule.valid_ports(1_700_000_020) {
//!     assert!((3000..4000).contains(&assignment.port));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod schedule;
pub mod totp;
pub mod window;

pub use config::{HopConfig, MAX_OFFSET_SECS, Mode, Protocol, mask_secret};
pub use error::{CodeGenerationError, ConfigError, DeriveError};
pub use schedule::{
    PortAssignment, PortSchedule, ScheduleParams, compute_valid_ports, derive_offset, derive_port,
};
pub use totp::{CODE_DIGITS, TotpGenerator};
pub use window::TimeWindow;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix seconds.
///
/// A clock set before the epoch reads as a negative value.
#[must_use]
pub fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
    }
}
