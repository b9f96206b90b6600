//! Abstractions for handling certain classes of device
//!
//! A "class" is a specific kernel subsystem, exposed under `/sys/class`.
//!
//! See the [sysfs rules][1] for details
//!
//! [1]: https://www.kernel.org/doc/html/latest/admin-guide/sysfs-rules.html
use std::{
    fmt::Debug,
    io,
    path::{Path, PathBuf},
};

use self::imp::{read_attrs, Sealed};

pub mod pwm;

mod imp {
    use super::*;

    pub trait Sealed {}

    impl<B> Sealed for pwm::PwmChip<B> {}
    impl<B> Sealed for pwm::PwmChannel<B> {}

    pub fn read_attrs(path: &Path, buf: &mut Vec<PathBuf>) -> io::Result<()> {
        for dir in path.read_dir()? {
            let dir = dir?;
            let ty = dir.file_type()?;
            let path = dir.path();
            if ty.is_symlink() {
                continue;
            }
            if ty.is_dir() {
                let _ = read_attrs(&path, buf);
            }
            buf.push(path);
        }
        Ok(())
    }
}

/// A kernel object living in a class directory
pub trait Device: Sealed + Debug {
    /// Full path to the device
    ///
    /// # Example
    ///
    /// `/sys/class/pwm/pwmchip0/pwm1`
    fn path(&self) -> &Path;

    /// Kernel name of the device.
    ///
    /// Identical to the last component of [`Device::path`]
    ///
    /// # Example
    ///
    /// `pwm1`
    fn kernel_name(&self) -> &str {
        self.path()
            .file_name()
            .expect("device path cannot end in ..")
            .to_str()
            .expect("kernel_name cannot be invalid utf-8")
    }

    /// Returns the path to every visible attribute, recursively, sorted.
    ///
    /// There may be attributes you do not have permission to see.
    ///
    /// Use [`Path::strip_prefix`] with [`Device::path`] to get just the
    /// attribute path
    ///
    /// # Example
    ///
    /// \[`<path>/duty_cycle`, `<path>/enable`, `<path>/period`]
    fn attributes(&self) -> io::Result<Vec<PathBuf>> {
        let mut v = Vec::new();
        read_attrs(self.path(), &mut v)?;
        v.sort_unstable();
        Ok(v)
    }
}
