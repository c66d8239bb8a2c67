//! Privileged x86 I/O port access
//!
//! A grant covers `count` consecutive ports starting at `base`. Acquiring
//! requires root and an `ioperm` grant; byte access then goes through
//! `/dev/port`, which works from any thread. When `/dev/port` cannot be
//! opened the grant falls back to direct `in`/`out` instructions.

use crate::error::{PanelError, Result};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Value returned for a failed `/dev/port` read ("not pressed", LEDs off)
pub const PORT_READ_FALLBACK: u8 = 0xFF;

/// Byte-wide access to hardware I/O ports
///
/// Implemented by [`IoPortGrant`] and by
/// [`SimulatedPorts`](super::SimulatedPorts).
pub trait PortIo: Send + Sync {
    fn read_byte(&self, port: u16) -> Result<u8>;
    fn write_byte(&self, port: u16, value: u8) -> Result<()>;
}

enum PortAccess {
    DevPort(File),
    /// `in`/`out` instructions. `ioperm` only covers the calling thread and
    /// threads it spawns afterwards, so each thread re-requests the range
    /// before its first access.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    Direct,
}

thread_local! {
    /// Port ranges this thread already holds an `ioperm` grant for
    static THREAD_GRANTS: RefCell<HashSet<(u16, u16)>> = RefCell::new(HashSet::new());
}

/// Record `(base, count)` for the current thread.
///
/// Returns `true` the first time a thread records a range.
fn record_thread_grant(base: u16, count: u16) -> bool {
    THREAD_GRANTS.with(|grants| grants.borrow_mut().insert((base, count)))
}

fn forget_thread_grant(base: u16, count: u16) {
    THREAD_GRANTS.with(|grants| grants.borrow_mut().remove(&(base, count)));
}

/// An acquired range of I/O ports, released exactly once
pub struct IoPortGrant {
    base: u16,
    count: u16,
    access: PortAccess,
    released: AtomicBool,
}

impl IoPortGrant {
    /// Acquire permission for `count` ports starting at `base`
    pub fn acquire(base: u16, count: u16) -> Result<Self> {
        if !running_as_root() {
            return Err(PanelError::PortPermission {
                base,
                reason: "I/O port access requires root privileges".to_string(),
            });
        }

        set_port_permission(base, count, true)?;

        let access = match File::options().read(true).write(true).open("/dev/port") {
            Ok(file) => PortAccess::DevPort(file),
            Err(e) => {
                debug!("/dev/port unavailable ({}), using port instructions", e);
                match direct_access() {
                    Some(access) => access,
                    None => {
                        let _ = set_port_permission(base, count, false);
                        return Err(PanelError::PortUnsupported);
                    }
                }
            }
        };

        record_thread_grant(base, count);
        info!("Acquired I/O ports 0x{:x}..0x{:x}", base, base + count);

        Ok(Self {
            base,
            count,
            access,
            released: AtomicBool::new(false),
        })
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Give the ports back. Releasing twice is a no-op.
    pub fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        forget_thread_grant(self.base, self.count);
        set_port_permission(self.base, self.count, false)?;
        debug!("Released I/O ports 0x{:x}..0x{:x}", self.base, self.base + self.count);
        Ok(())
    }

    fn check(&self, port: u16) -> Result<()> {
        if self.is_released() {
            return Err(PanelError::PortReleased { port });
        }
        if port < self.base || port - self.base >= self.count {
            return Err(PanelError::PortPermission {
                base: port,
                reason: format!(
                    "outside granted range 0x{:x}..0x{:x}",
                    self.base,
                    self.base + self.count
                ),
            });
        }
        Ok(())
    }

    /// Make sure the calling thread may execute port instructions
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn ensure_thread_permission(&self) -> Result<()> {
        if record_thread_grant(self.base, self.count) {
            if let Err(e) = set_port_permission(self.base, self.count, true) {
                forget_thread_grant(self.base, self.count);
                return Err(e);
            }
            debug!(
                "Granted I/O ports 0x{:x}..0x{:x} to thread {:?}",
                self.base,
                self.base + self.count,
                std::thread::current().name()
            );
        }
        Ok(())
    }
}

impl PortIo for IoPortGrant {
    fn read_byte(&self, port: u16) -> Result<u8> {
        self.check(port)?;

        match &self.access {
            PortAccess::DevPort(file) => {
                let mut buf = [0u8; 1];
                match read_at(file, &mut buf, port) {
                    Ok(1) => Ok(buf[0]),
                    _ => Ok(PORT_READ_FALLBACK),
                }
            }
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            PortAccess::Direct => {
                self.ensure_thread_permission()?;
                Ok(unsafe { inb(port) })
            }
        }
    }

    fn write_byte(&self, port: u16, value: u8) -> Result<()> {
        self.check(port)?;

        match &self.access {
            PortAccess::DevPort(file) => {
                let written = write_at(file, &[value], port)?;
                if written != 1 {
                    return Err(PanelError::ShortWrite {
                        written,
                        expected: 1,
                    });
                }
                Ok(())
            }
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            PortAccess::Direct => {
                self.ensure_thread_permission()?;
                unsafe { outb(port, value) };
                Ok(())
            }
        }
    }
}

impl Drop for IoPortGrant {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release I/O ports 0x{:x}: {}", self.base, e);
        }
    }
}

#[cfg(unix)]
fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
fn set_port_permission(base: u16, count: u16, enable: bool) -> Result<()> {
    let turn_on: libc::c_long = if enable { 1 } else { 0 };
    let ret = unsafe {
        libc::syscall(
            libc::SYS_ioperm,
            base as libc::c_ulong,
            count as libc::c_ulong,
            turn_on,
        )
    };
    if ret != 0 {
        return Err(PanelError::PortPermission {
            base,
            reason: format!("ioperm failed: {}", std::io::Error::last_os_error()),
        });
    }
    Ok(())
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
fn set_port_permission(_base: u16, _count: u16, _enable: bool) -> Result<()> {
    Err(PanelError::PortUnsupported)
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn direct_access() -> Option<PortAccess> {
    Some(PortAccess::Direct)
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn direct_access() -> Option<PortAccess> {
    None
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], port: u16) -> std::io::Result<usize> {
    file.read_at(buf, u64::from(port))
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], port: u16) -> std::io::Result<usize> {
    file.write_at(buf, u64::from(port))
}

#[cfg(not(unix))]
fn read_at(_file: &File, _buf: &mut [u8], _port: u16) -> std::io::Result<usize> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

#[cfg(not(unix))]
fn write_at(_file: &File, _buf: &[u8], _port: u16) -> std::io::Result<usize> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

/// Read a byte with the x86 `in` instruction.
///
/// Caller must hold an `ioperm` grant covering `port` on this thread.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    core::arch::asm!(
        "in al, dx",
        out("al") value,
        in("dx") port,
        options(nomem, nostack, preserves_flags)
    );
    value
}

/// Write a byte with the x86 `out` instruction.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
unsafe fn outb(port: u16, value: u8) {
    core::arch::asm!(
        "out dx, al",
        in("dx") port,
        in("al") value,
        options(nomem, nostack, preserves_flags)
    );
}
