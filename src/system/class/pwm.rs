//! Abstraction for handling devices in the pwm class
//!
//! # Examples
//!
//! Drive a hobby servo from channel 0 of the first controller.
//!
//! ```rust,no_run
//! # use linpwm::{PwmChannel, Result};
//! # fn main() -> Result<()> {
//! let mut pwm = PwmChannel::new(0, 0)?;
//! pwm.with_exported(|pwm| {
//!     pwm.configure(20_000_000, 1_500_000)?;
//!     pwm.enable()?;
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! # Implementation
//!
//! This uses the sysfs interface, documented [here][1] and [here][2].
//!
//! Channel attributes only exist between `export` and `unexport`, and the
//! kernel validates every write against the current state of the channel. A
//! `duty_cycle` longer than the `period` is rejected, as is a `period` shorter
//! than the current `duty_cycle`, and many drivers refuse to change
//! `polarity` while the channel is enabled.
//!
//! Nothing here is clamped or retried. A rejected write means the hardware
//! state is not what was asked for, and that is always surfaced.
//!
//! [1]: https://www.kernel.org/doc/Documentation/ABI/testing/sysfs-class-pwm
//! [2]: https://www.kernel.org/doc/html/latest/driver-api/pwm.html
use std::{
    fmt,
    io,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{debug, trace, warn};
use walkdir::WalkDir;

use super::Device;
use crate::{
    error::{text::*, Attribute, Operation, PwmError, Result},
    sysfs::{Backend, Kernel},
    util::{first_line, PWM_CLASS_PATH},
};

const NSEC_PER_SEC: f64 = 1_000_000_000.0;

fn chip_path(root: &Path, chip: u32) -> PathBuf {
    root.join(format!("pwmchip{chip}"))
}

/// Check the controller directory exists, without modifying anything.
fn find_controller<B: Backend>(backend: &B, root: &Path, chip: u32) -> Result<PathBuf> {
    let path = chip_path(root, chip);
    match backend.is_dir(&path) {
        Ok(true) => Ok(path),
        Ok(false) => Err(PwmError::ControllerNotFound { chip, path }),
        Err(source) => Err(PwmError::ChipAccessFailed { chip, source }),
    }
}

/// Output polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Polarity {
    /// Output is high for the duty cycle, low for the rest of the period.
    #[default]
    Normal,

    /// Output is low for the duty cycle, high for the rest of the period.
    Inversed,
}

impl Polarity {
    /// The sysfs representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Inversed => "inversed",
        }
    }
}

impl Polarity {
    /// Anything other than `inversed` is normal polarity.
    fn from_attr(s: &str) -> Self {
        match s.trim() {
            "inversed" => Self::Inversed,
            _ => Self::Normal,
        }
    }
}

impl FromStr for Polarity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_attr(s))
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PWM controller, `pwmchip<N>`
#[derive(Debug, Clone)]
pub struct PwmChip<B = Kernel> {
    chip: u32,

    /// Full path to the controller directory.
    path: PathBuf,

    backend: B,
}

impl PwmChip {
    /// Controller `chip` of the running kernel.
    ///
    /// # Errors
    ///
    /// - [`PwmError::ControllerNotFound`] if there is no such controller.
    pub fn new(chip: u32) -> Result<Self> {
        Self::with_backend(PWM_CLASS_PATH, chip, Kernel)
    }

    /// Every controller of the running kernel, sorted by number.
    pub fn chips() -> Result<Vec<Self>> {
        Self::chips_in(PWM_CLASS_PATH, Kernel)
    }
}

impl<B: Backend> PwmChip<B> {
    /// Controller `chip` under the class directory `root`, accessed through
    /// `backend`.
    ///
    /// # Errors
    ///
    /// - [`PwmError::ControllerNotFound`] if there is no such controller.
    pub fn with_backend<P: AsRef<Path>>(root: P, chip: u32, backend: B) -> Result<Self> {
        let path = find_controller(&backend, root.as_ref(), chip)?;
        Ok(Self {
            chip,
            path,
            backend,
        })
    }

    /// Every controller under the class directory `root`, sorted by number.
    ///
    /// Entries that don't look like `pwmchip<N>` are ignored.
    pub fn chips_in<P: AsRef<Path>>(root: P, backend: B) -> Result<Vec<Self>>
    where
        B: Clone,
    {
        let mut chips = Vec::new();
        // Class entries are symlinks into `/sys/devices`.
        for entry in WalkDir::new(root.as_ref())
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = entry.map_err(|e| PwmError::Io(e.into()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let chip = entry
                .file_name()
                .to_str()
                .and_then(|s| s.strip_prefix("pwmchip"))
                .and_then(|s| s.parse::<u32>().ok());
            if let Some(chip) = chip {
                chips.push(Self {
                    chip,
                    path: entry.path().to_path_buf(),
                    backend: backend.clone(),
                });
            }
        }
        chips.sort_unstable_by_key(|c| c.chip);
        Ok(chips)
    }

    /// The controller number
    pub fn chip(&self) -> u32 {
        self.chip
    }

    /// Number of channels this controller provides
    pub fn npwm(&self) -> Result<u32> {
        let chip = self.chip;
        let s = self
            .backend
            .read(&self.path.join("npwm"))
            .map_err(|source| PwmError::ChipAccessFailed { chip, source })?;
        first_line(&s)
            .parse()
            .map_err(|_| PwmError::ChipAccessFailed {
                chip,
                source: io::Error::new(io::ErrorKind::InvalidData, NOT_A_NUMBER),
            })
    }

    /// Handle to `channel` of this controller.
    ///
    /// The channel is not exported.
    pub fn channel(&self, channel: u32) -> PwmChannel<B>
    where
        B: Clone,
    {
        PwmChannel::new_unchecked(self.chip, channel, self.path.clone(), self.backend.clone())
    }
}

impl<B: Backend> Device for PwmChip<B> {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// One channel of a PWM controller
///
/// # Lifecycle
///
/// A new handle is not exported. [`PwmChannel::export`] asks the kernel to
/// create the channel directory, after which the attributes may be read and
/// written. Disable the channel before [`PwmChannel::unexport`], or let
/// [`PwmChannel::acquire`] or [`PwmChannel::with_exported`] do the teardown.
///
/// # Note
///
/// Nothing stops two handles, in this process or another, from driving the
/// same channel. Treat the hardware channel as a singleton.
#[derive(Debug)]
pub struct PwmChannel<B = Kernel> {
    chip: u32,
    channel: u32,

    /// `<root>/pwmchip<chip>`
    base: PathBuf,

    /// `<root>/pwmchip<chip>/pwm<channel>`
    path: PathBuf,

    /// Last observed export state. The directory is the source of truth.
    exported: bool,

    backend: B,
}

impl PwmChannel {
    /// Handle to `channel` of controller `chip` of the running kernel.
    ///
    /// Only checks the controller exists, nothing is written.
    ///
    /// # Errors
    ///
    /// - [`PwmError::ControllerNotFound`] if there is no such controller.
    pub fn new(chip: u32, channel: u32) -> Result<Self> {
        Self::with_backend(PWM_CLASS_PATH, chip, channel, Kernel)
    }
}

// Public
impl<B: Backend> PwmChannel<B> {
    /// Handle to `channel` of controller `chip` under the class directory
    /// `root`, accessed through `backend`.
    ///
    /// Only checks the controller exists, nothing is written.
    ///
    /// # Errors
    ///
    /// - [`PwmError::ControllerNotFound`] if there is no such controller.
    /// - [`PwmError::ChipAccessFailed`] if its existence couldn't be checked.
    pub fn with_backend<P: AsRef<Path>>(
        root: P,
        chip: u32,
        channel: u32,
        backend: B,
    ) -> Result<Self> {
        let base = find_controller(&backend, root.as_ref(), chip)?;
        Ok(Self::new_unchecked(chip, channel, base, backend))
    }

    /// The controller number
    pub fn chip(&self) -> u32 {
        self.chip
    }

    /// The channel number within the controller
    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Path to the controller directory
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Export state as of the last time it was checked or changed, without
    /// touching the filesystem.
    ///
    /// Another process may have changed it since. Use
    /// [`PwmChannel::is_exported`] for the real state.
    pub fn was_exported(&self) -> bool {
        self.exported
    }

    /// Whether the channel directory currently exists.
    pub fn is_exported(&mut self) -> Result<bool> {
        self.exported = self
            .backend
            .is_dir(&self.path)
            .map_err(|source| PwmError::ChipAccessFailed {
                chip: self.chip,
                source,
            })?;
        Ok(self.exported)
    }

    /// Export the channel, creating its attributes.
    ///
    /// Does nothing if the channel is already exported.
    ///
    /// # Errors
    ///
    /// - [`PwmError::ExportFailed`] if the kernel refused, for example because
    ///   the channel doesn't exist or is in use by a driver.
    pub fn export(&mut self) -> Result<()> {
        if self.is_exported()? {
            trace!("{} already exported", self.path.display());
            return Ok(());
        }
        self.backend
            .write(&self.base.join("export"), &self.channel.to_string())
            .map_err(|source| PwmError::ExportFailed {
                chip: self.chip,
                channel: self.channel,
                source,
            })?;
        self.exported = true;
        debug!("Exported {}", self.path.display());
        Ok(())
    }

    /// Unexport the channel, removing its attributes.
    ///
    /// Does nothing if the channel isn't exported.
    ///
    /// # Errors
    ///
    /// - [`PwmError::StillEnabled`] if the channel is enabled. Nothing is
    ///   written in that case.
    /// - [`PwmError::UnexportFailed`] if the kernel refused.
    pub fn unexport(&mut self) -> Result<()> {
        if !self.is_exported()? {
            trace!("{} not exported", self.path.display());
            return Ok(());
        }
        if self.is_enabled()? {
            return Err(PwmError::StillEnabled {
                chip: self.chip,
                channel: self.channel,
            });
        }
        self.backend
            .write(&self.base.join("unexport"), &self.channel.to_string())
            .map_err(|source| PwmError::UnexportFailed {
                chip: self.chip,
                channel: self.channel,
                source,
            })?;
        self.exported = false;
        debug!("Unexported {}", self.path.display());
        Ok(())
    }

    /// The period, in nanoseconds
    pub fn period(&self) -> Result<u64> {
        self.read_u64(Attribute::Period)
    }

    /// Set the period, in nanoseconds.
    ///
    /// The kernel rejects a period shorter than the current duty cycle, see
    /// [`PwmChannel::configure`].
    pub fn set_period(&self, period: u64) -> Result<()> {
        self.write_attr(Attribute::Period, &period.to_string())
    }

    /// The active time of one period, in nanoseconds
    pub fn duty_cycle(&self) -> Result<u64> {
        self.read_u64(Attribute::DutyCycle)
    }

    /// Set the active time of one period, in nanoseconds.
    ///
    /// The kernel rejects a duty cycle longer than the current period.
    pub fn set_duty_cycle(&self, duty_cycle: u64) -> Result<()> {
        self.write_attr(Attribute::DutyCycle, &duty_cycle.to_string())
    }

    /// Whether the output is enabled
    pub fn is_enabled(&self) -> Result<bool> {
        Ok(self.read_attr(Attribute::Enable)? == "1")
    }

    /// Start or stop generating the signal
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.write_attr(Attribute::Enable, if enabled { "1" } else { "0" })
    }

    /// Start generating the signal
    pub fn enable(&self) -> Result<()> {
        self.set_enabled(true)
    }

    /// Stop generating the signal
    pub fn disable(&self) -> Result<()> {
        self.set_enabled(false)
    }

    /// Output polarity
    pub fn polarity(&self) -> Result<Polarity> {
        let s = self.read_attr(Attribute::Polarity)?;
        Ok(Polarity::from_attr(&s))
    }

    /// Set output polarity.
    ///
    /// Many drivers only allow this while the channel is disabled.
    pub fn set_polarity(&self, polarity: Polarity) -> Result<()> {
        self.write_attr(Attribute::Polarity, polarity.as_str())
    }

    /// Whether the output polarity is [`Polarity::Inversed`]
    pub fn is_inversed(&self) -> Result<bool> {
        Ok(self.polarity()? == Polarity::Inversed)
    }

    /// Set [`Polarity::Inversed`] if `inversed`, otherwise [`Polarity::Normal`]
    pub fn set_inversed(&self, inversed: bool) -> Result<()> {
        self.set_polarity(if inversed {
            Polarity::Inversed
        } else {
            Polarity::Normal
        })
    }

    /// Set both period and duty cycle, in nanoseconds.
    ///
    /// The kernel checks every write against the other value, so the order
    /// matters. When the new period is shorter than the current duty cycle the
    /// duty cycle is written first, otherwise the period is.
    ///
    /// # Errors
    ///
    /// - [`PwmError::AttributeAccessFailed`] if `duty_cycle > period`, before
    ///   anything is written, or if either write fails.
    pub fn configure(&self, period: u64, duty_cycle: u64) -> Result<()> {
        if duty_cycle > period {
            return Err(PwmError::AttributeAccessFailed {
                attribute: Attribute::DutyCycle,
                operation: Operation::Write,
                source: io::Error::new(io::ErrorKind::InvalidInput, DUTY_OVER_PERIOD),
            });
        }
        if period < self.duty_cycle()? {
            self.set_duty_cycle(duty_cycle)?;
            self.set_period(period)
        } else {
            self.set_period(period)?;
            self.set_duty_cycle(duty_cycle)
        }
    }

    /// Frequency of the signal, in Hz.
    ///
    /// Zero if no period is configured.
    pub fn frequency(&self) -> Result<f64> {
        let period = self.period()?;
        if period == 0 {
            return Ok(0.0);
        }
        Ok(NSEC_PER_SEC / period as f64)
    }

    /// Set the frequency, in Hz, and the fraction of each period the output is
    /// active, `0.0..=1.0`.
    ///
    /// Both are rounded to the nearest nanosecond. See
    /// [`PwmChannel::configure`].
    pub fn set_frequency(&self, frequency: f64, duty_ratio: f64) -> Result<()> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(PwmError::InvalidFrequency(frequency));
        }
        if !(0.0..=1.0).contains(&duty_ratio) {
            return Err(PwmError::InvalidDutyRatio(duty_ratio));
        }
        let period = (NSEC_PER_SEC / frequency).round();
        if period < 1.0 || period > u64::MAX as f64 {
            return Err(PwmError::InvalidFrequency(frequency));
        }
        let period = period as u64;
        let duty_cycle = ((period as f64 * duty_ratio).round() as u64).min(period);
        self.configure(period, duty_cycle)
    }

    /// Export the channel, returning a guard that tears it down when dropped.
    ///
    /// Teardown disables the output, resets the polarity to
    /// [`Polarity::Normal`] and unexports the channel, in that order, even if
    /// a step fails. Failures during drop can only be logged, use
    /// [`Exported::release`] to see them.
    ///
    /// # Errors
    ///
    /// - [`PwmError::ExportFailed`], see [`PwmChannel::export`]
    pub fn acquire(&mut self) -> Result<Exported<'_, B>> {
        self.export()?;
        Ok(Exported {
            channel: self,
            released: false,
        })
    }

    /// Export the channel, run `f`, then tear the channel down.
    ///
    /// Teardown always runs, see [`PwmChannel::acquire`]. If `f` fails its
    /// error is returned, otherwise any teardown error is.
    pub fn with_exported<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut guard = self.acquire()?;
        let ret = f(&mut *guard);
        let teardown = guard.release();
        match ret {
            Ok(v) => teardown.map(|_| v),
            Err(e) => Err(e),
        }
    }
}

// Private
impl<B: Backend> PwmChannel<B> {
    fn new_unchecked(chip: u32, channel: u32, base: PathBuf, backend: B) -> Self {
        let path = base.join(format!("pwm{channel}"));
        Self {
            chip,
            channel,
            base,
            path,
            exported: false,
            backend,
        }
    }

    fn read_attr(&self, attribute: Attribute) -> Result<String> {
        let s = self
            .backend
            .read(&self.path.join(attribute.file_name()))
            .map_err(|source| PwmError::AttributeAccessFailed {
                attribute,
                operation: Operation::Read,
                source,
            })?;
        let s = first_line(&s);
        trace!("{}/{attribute} = {s}", self.path.display());
        Ok(s.to_owned())
    }

    fn read_u64(&self, attribute: Attribute) -> Result<u64> {
        let s = self.read_attr(attribute)?;
        let invalid = |text: &'static str| PwmError::AttributeAccessFailed {
            attribute,
            operation: Operation::Read,
            source: io::Error::new(io::ErrorKind::InvalidData, text),
        };
        if s.is_empty() {
            return Err(invalid(EMPTY));
        }
        s.parse().map_err(|_| invalid(NOT_A_NUMBER))
    }

    fn write_attr(&self, attribute: Attribute, value: &str) -> Result<()> {
        self.backend
            .write(&self.path.join(attribute.file_name()), value)
            .map_err(|source| PwmError::AttributeAccessFailed {
                attribute,
                operation: Operation::Write,
                source,
            })?;
        debug!("{}/{attribute} <- {value}", self.path.display());
        Ok(())
    }

    /// Disable, reset polarity, unexport. Every step runs, the first error is
    /// returned.
    fn teardown(&mut self) -> Result<()> {
        let exported = self.is_exported().map_err(|e| {
            warn!("Teardown of {} failed: {e}", self.path.display());
            e
        })?;
        if !exported {
            return Ok(());
        }
        let steps = [
            self.set_enabled(false),
            self.set_polarity(Polarity::Normal),
            self.unexport(),
        ];
        let mut ret = Ok(());
        for step in steps {
            if let Err(e) = step {
                warn!("Teardown of {} failed: {e}", self.path.display());
                if ret.is_ok() {
                    ret = Err(e);
                }
            }
        }
        ret
    }
}

impl<B: Backend> Device for PwmChannel<B> {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// An exported [`PwmChannel`], torn down on drop
///
/// Created by [`PwmChannel::acquire`].
#[derive(Debug)]
pub struct Exported<'a, B: Backend = Kernel> {
    channel: &'a mut PwmChannel<B>,
    released: bool,
}

impl<'a, B: Backend> Exported<'a, B> {
    /// Tear the channel down now, reporting the first failure.
    ///
    /// The channel can be exported again afterwards.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.channel.teardown()
    }
}

impl<'a, B: Backend> Deref for Exported<'a, B> {
    type Target = PwmChannel<B>;

    fn deref(&self) -> &Self::Target {
        self.channel
    }
}

impl<'a, B: Backend> DerefMut for Exported<'a, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.channel
    }
}

impl<'a, B: Backend> Drop for Exported<'a, B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Failures were already logged.
        let _ = self.channel.teardown();
    }
}
