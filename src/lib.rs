//! High level bindings to the Linux PWM subsystem
//!
//! # Implementation details
//!
//! The kernel exposes PWM controllers through files in `/sys/class/pwm`, so
//! this library requires sysfs to be mounted.
//!
//! A controller, `pwmchip<N>`, owns one or more channels. A channel has to be
//! exported before its `period`, `duty_cycle`, `enable` and `polarity`
//! attributes exist, and should be disabled and unexported when done.
//! [`system::class::pwm::PwmChannel`] models that lifecycle.
//!
//! This crate attempts to correctly document these interfaces, and provide
//! kernel documentation sources where possible.
//! This is done on a best effort basis.
//!
//! # Logging
//!
//! Lifecycle transitions and attribute writes are reported through the
//! [`log`] facade. No logger is installed by this crate.
#![doc(html_root_url = "https://docs.rs/linpwm/0.1.0")]

pub mod error;
pub mod sysfs;

pub mod system;
pub mod util;

pub use error::{PwmError, Result};
pub use system::class::pwm::{Exported, Polarity, PwmChannel, PwmChip};
