//! A scratch sysfs tree that reacts to writes the way the PWM core does.
//!
//! Only what the PWM class needs is simulated: `export` creates the channel
//! directory, `unexport` removes it, and attribute writes are validated with
//! the same `errno`s the kernel returns.
use super::{Backend, Kernel};
use nix::errno::Errno;
use std::{
    cell::{Cell, RefCell},
    fs,
    io,
    path::{Path, PathBuf},
    rc::Rc,
};
use tempfile::TempDir;

fn errno(e: Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

fn parse<T: std::str::FromStr>(value: &str) -> io::Result<T> {
    value.trim().parse().map_err(|_| errno(Errno::EINVAL))
}

#[derive(Debug, Clone)]
pub(crate) struct FakeKernel {
    dir: Rc<TempDir>,

    /// Accepted writes, as (attribute file name, value)
    writes: Rc<RefCell<Vec<(String, String)>>>,

    /// Make directory checks fail with `EIO`
    broken: Rc<Cell<bool>>,
}

impl FakeKernel {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: Rc::new(tempfile::tempdir()?),
            writes: Default::default(),
            broken: Default::default(),
        })
    }

    /// The fake `/sys/class/pwm`
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Register controller `chip` with `npwm` channels.
    pub fn add_chip(&self, chip: u32, npwm: u32) -> io::Result<PathBuf> {
        let path = self.chip_path(chip);
        fs::create_dir(&path)?;
        fs::write(path.join("npwm"), format!("{npwm}\n"))?;
        fs::write(path.join("export"), "")?;
        fs::write(path.join("unexport"), "")?;
        Ok(path)
    }

    pub fn chip_path(&self, chip: u32) -> PathBuf {
        self.root().join(format!("pwmchip{chip}"))
    }

    pub fn channel_path(&self, chip: u32, channel: u32) -> PathBuf {
        self.chip_path(chip).join(format!("pwm{channel}"))
    }

    /// Raw, untrimmed, attribute contents.
    pub fn attr(&self, chip: u32, channel: u32, name: &str) -> io::Result<String> {
        fs::read_to_string(self.channel_path(chip, channel).join(name))
    }

    /// Every accepted write so far, oldest first.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.borrow().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    /// Fail every directory existence check from now on.
    pub fn break_sysfs(&self) {
        self.broken.set(true);
    }

    /// Export `channel` behind the back of any handle.
    pub fn export_externally(&self, chip: u32, channel: u32) -> io::Result<()> {
        self.write(&self.chip_path(chip).join("export"), &channel.to_string())
    }

    /// Unexport `channel` behind the back of any handle.
    pub fn unexport_externally(&self, chip: u32, channel: u32) -> io::Result<()> {
        self.write(&self.chip_path(chip).join("unexport"), &channel.to_string())
    }

    fn hwpwm(chip: &Path, value: &str) -> io::Result<PathBuf> {
        let channel: u32 = parse(value)?;
        let npwm: u32 = parse(&fs::read_to_string(chip.join("npwm"))?)?;
        if channel >= npwm {
            return Err(errno(Errno::ENODEV));
        }
        Ok(chip.join(format!("pwm{channel}")))
    }

    fn export(chip: &Path, value: &str) -> io::Result<()> {
        let path = Self::hwpwm(chip, value)?;
        if path.exists() {
            return Err(errno(Errno::EBUSY));
        }
        fs::create_dir(&path)?;
        fs::write(path.join("period"), "0\n")?;
        fs::write(path.join("duty_cycle"), "0\n")?;
        fs::write(path.join("enable"), "0\n")?;
        fs::write(path.join("polarity"), "normal\n")?;
        Ok(())
    }

    fn unexport(chip: &Path, value: &str) -> io::Result<()> {
        let path = Self::hwpwm(chip, value)?;
        if !path.exists() {
            return Err(errno(Errno::ENODEV));
        }
        fs::remove_dir_all(path)
    }

    fn read_u64(path: &Path) -> io::Result<u64> {
        parse(&fs::read_to_string(path)?)
    }
}

impl Backend for FakeKernel {
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        if self.broken.get() {
            return Err(errno(Errno::EIO));
        }
        Kernel.is_dir(path)
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        Kernel.read(path)
    }

    fn write(&self, path: &Path, value: &str) -> io::Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let dir = path.parent().ok_or(io::ErrorKind::InvalidInput)?;
        match name {
            "export" => Self::export(dir, value)?,
            "unexport" => Self::unexport(dir, value)?,
            "period" => {
                let period: u64 = parse(value)?;
                if period < Self::read_u64(&dir.join("duty_cycle"))? {
                    return Err(errno(Errno::EINVAL));
                }
            }
            "duty_cycle" => {
                let duty: u64 = parse(value)?;
                if duty > Self::read_u64(&dir.join("period"))? {
                    return Err(errno(Errno::EINVAL));
                }
            }
            "enable" => {
                if !matches!(value, "0" | "1") {
                    return Err(errno(Errno::EINVAL));
                }
            }
            "polarity" => {
                if !matches!(value, "normal" | "inversed") {
                    return Err(errno(Errno::EINVAL));
                }
                if fs::read_to_string(dir.join("enable"))?.trim() == "1" {
                    return Err(errno(Errno::EBUSY));
                }
            }
            _ => {}
        }
        Kernel.write(path, value)?;
        self.writes
            .borrow_mut()
            .push((name.to_owned(), value.to_owned()));
        Ok(())
    }
}
