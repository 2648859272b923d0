//! Async wrapper around a USB gadget HID character device.
//!
//! The gadget function (configfs, bound to the UDC with the Pro Controller
//! descriptor from [`crate::procon::descriptor`]) hands host output reports
//! to userspace through `/dev/hidg*` and transmits whatever is written
//! back. The fd is put into non-blocking mode and driven through tokio's
//! `AsyncFd`, one frame per read/write.

use std::ffi::CString;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// Wire frames are the report id byte plus a 63-byte body.
pub const FRAME_LEN: usize = 64;

/// Wrapper to impl AsRawFd for a raw fd.
struct RawFdWrapper(RawFd);

impl AsRawFd for RawFdWrapper {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl Drop for RawFdWrapper {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// An async handle on the gadget HID device node.
pub struct GadgetDevice {
    inner: AsyncFd<RawFdWrapper>,
}

impl GadgetDevice {
    pub fn open(path: &Path) -> io::Result<Self> {
        let c_path = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;

        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            inner: AsyncFd::with_interest(RawFdWrapper(fd), Interest::READABLE | Interest::WRITABLE)?,
        })
    }

    /// Read one host output report. Returns the frame length; the report id
    /// is the first byte.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|inner| {
                let n = unsafe {
                    libc::read(inner.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len())
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Transmit one input report: the id byte, the body, zero pad up to the
    /// frame length.
    pub async fn write_report(&self, report_id: u8, body: &[u8]) -> io::Result<()> {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = report_id;
        let len = body.len().min(FRAME_LEN - 1);
        frame[1..1 + len].copy_from_slice(&body[..len]);
        self.write_all(&frame).await
    }

    async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < data.len() {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| {
                let n = unsafe {
                    libc::write(
                        inner.as_raw_fd(),
                        data[written..].as_ptr() as *const _,
                        data.len() - written,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}
