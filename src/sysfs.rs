//! An interface to the Linux `/sys` filesystem, or sysfs.
//!
//! Everything this crate does to hardware goes through [`Backend`], which
//! models the three things sysfs attribute I/O needs: whole-file reads,
//! whole-file writes, and directory existence checks.
//!
//! # Implementation Details
//!
//! This is the userspace interface to low-level kernel details, and is subject
//! to change between kernel versions.
//!
//! Attribute files are not regular files. A write is handed to the driver in
//! one piece and the driver either accepts all of it or rejects it with an
//! `errno`, so values are always written with a single `write` call. Files are
//! never created, a missing attribute is an error.
//!
//! # Stability
//!
//! The PWM class interface is documented as 'Testing' [here][1], mostly stable
//! and complete, with backwards compatible additions allowed.
//!
//! [1]: https://www.kernel.org/doc/Documentation/ABI/testing/sysfs-class-pwm
use std::{
    fmt::Debug,
    fs::{self, OpenOptions},
    io::{self, prelude::*},
    path::Path,
};

#[cfg(test)]
pub(crate) mod fake;

/// Attribute I/O against a sysfs tree
pub trait Backend: Debug {
    /// Whether `path` exists and is a directory.
    ///
    /// # Errors
    ///
    /// If existence couldn't be determined, for example due to permissions.
    fn is_dir(&self, path: &Path) -> io::Result<bool>;

    /// Read the entire contents of the attribute at `path`.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Write `value` to the existing attribute at `path` in one operation.
    fn write(&self, path: &Path, value: &str) -> io::Result<()>;
}

/// The running kernel's sysfs, through [`std::fs`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Kernel;

impl Backend for Kernel {
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(m) => Ok(m.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut f = OpenOptions::new().write(true).truncate(true).open(path)?;
        f.write_all(value.as_bytes())
    }
}

impl<B: Backend + ?Sized> Backend for &B {
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        (**self).is_dir(path)
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, value: &str) -> io::Result<()> {
        (**self).write(path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

    #[test]
    fn kernel_io() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let attr = dir.path().join("period");
        fs::write(&attr, "20000000\n")?;

        assert!(Kernel.is_dir(dir.path())?);
        assert!(!Kernel.is_dir(&attr)?);
        assert!(!Kernel.is_dir(&dir.path().join("missing"))?);

        Kernel.write(&attr, "1000")?;
        assert_eq!(Kernel.read(&attr)?, "1000");
        Ok(())
    }

    #[test]
    fn kernel_write_never_creates() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let attr = dir.path().join("enable");
        let e = Kernel.write(&attr, "1").unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
        assert!(!attr.exists());
        Ok(())
    }
}
