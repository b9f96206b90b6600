//! Error handling stuff
use displaydoc::Display;
use nix::errno::Errno;
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = PwmError> = std::result::Result<T, E>;

/// Error type for [`linpwm::system::class::pwm`]
#[derive(Debug, Display, Error)]
pub enum PwmError {
    /// IO Failed: {0}
    Io(#[from] io::Error),

    /// PWM controller {chip} not found at {path:?}
    ControllerNotFound { chip: u32, path: PathBuf },

    /// Couldn't export channel {channel} of pwmchip{chip}: {source}
    ExportFailed {
        chip: u32,
        channel: u32,
        source: io::Error,
    },

    /// Couldn't unexport channel {channel} of pwmchip{chip}: {source}
    UnexportFailed {
        chip: u32,
        channel: u32,
        source: io::Error,
    },

    /// Channel {channel} of pwmchip{chip} is still enabled, disable it before unexporting
    StillEnabled { chip: u32, channel: u32 },

    /// Couldn't {operation} `{attribute}`: {source}
    AttributeAccessFailed {
        attribute: Attribute,
        operation: Operation,
        source: io::Error,
    },

    /// Couldn't access pwmchip{chip}: {source}
    ChipAccessFailed { chip: u32, source: io::Error },

    /// Invalid frequency {0} Hz
    InvalidFrequency(f64),

    /// Invalid duty ratio {0}, must be within 0.0..=1.0
    InvalidDutyRatio(f64),
}

impl PwmError {
    /// The kernel error code behind this failure, if there is one.
    ///
    /// The kernel reports rejected writes through `errno`, so this is how to
    /// tell a claimed channel (`EBUSY`) from an out of range duty cycle
    /// (`EINVAL`) or missing permissions (`EACCES`).
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Io(source)
            | Self::ExportFailed { source, .. }
            | Self::UnexportFailed { source, .. }
            | Self::AttributeAccessFailed { source, .. }
            | Self::ChipAccessFailed { source, .. } => source.raw_os_error().map(Errno::from_i32),
            _ => None,
        }
    }

    /// The attribute this error is about, if any.
    pub fn attribute(&self) -> Option<Attribute> {
        match self {
            Self::AttributeAccessFailed { attribute, .. } => Some(*attribute),
            _ => None,
        }
    }
}

/// Per-channel sysfs attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// `period`, nanoseconds
    Period,

    /// `duty_cycle`, nanoseconds
    DutyCycle,

    /// `enable`
    Enable,

    /// `polarity`
    Polarity,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Period,
        Attribute::DutyCycle,
        Attribute::Enable,
        Attribute::Polarity,
    ];

    /// Name of the attribute file under the channel directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Period => "period",
            Self::DutyCycle => "duty_cycle",
            Self::Enable => "enable",
            Self::Polarity => "polarity",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Which way an attribute was being accessed
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// read
    Read,

    /// write
    Write,
}

/// Error text.
pub(crate) mod text {
    pub const EMPTY: &str = "attribute was empty";

    pub const NOT_A_NUMBER: &str = "attribute was not a decimal number";

    pub const DUTY_OVER_PERIOD: &str = "duty cycle exceeds period";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_from_kernel_rejection() {
        let e = PwmError::AttributeAccessFailed {
            attribute: Attribute::DutyCycle,
            operation: Operation::Write,
            source: io::Error::from_raw_os_error(Errno::EINVAL as i32),
        };
        assert_eq!(e.errno(), Some(Errno::EINVAL));
        assert_eq!(e.attribute(), Some(Attribute::DutyCycle));

        let e = PwmError::StillEnabled { chip: 0, channel: 1 };
        assert_eq!(e.errno(), None);
        assert_eq!(e.attribute(), None);
    }

    #[test]
    fn display() {
        let e = PwmError::AttributeAccessFailed {
            attribute: Attribute::Period,
            operation: Operation::Read,
            source: io::ErrorKind::NotFound.into(),
        };
        assert!(e.to_string().starts_with("Couldn't read `period`"));

        let e = PwmError::ControllerNotFound {
            chip: 3,
            path: "/sys/class/pwm/pwmchip3".into(),
        };
        assert_eq!(
            e.to_string(),
            "PWM controller 3 not found at \"/sys/class/pwm/pwmchip3\""
        );
    }
}
