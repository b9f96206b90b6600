//! Utility functions

/// Technically Linux requires sysfs to be at `/sys`, calling it a system
/// configuration error otherwise.
///
/// But our upcoming distro is planning to experiment with filesystem layout
/// changes, including of `/sys`, so do this to allow easily changing it.
pub const SYSFS_PATH: &str = "/sys";

/// PWM class location. Same reasons as [`SYSFS_PATH`].
pub const PWM_CLASS_PATH: &str = "/sys/class/pwm";

/// Parse the first line of an attribute, without surrounding whitespace.
pub(crate) fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default().trim()
}
