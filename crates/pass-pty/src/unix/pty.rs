//! Unix PTY allocation and controller-side I/O.
//!
//! The controller descriptor is opened non-blocking and registered with
//! tokio's reactor. [`UnixPtyMaster::split`] hands out a reader and a writer
//! that share the descriptor, so output can be drained on one task while
//! input is written from another.

use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use rustix::fs::{Mode, OFlags, fcntl_setfl, open};
use rustix::pty::{OpenptFlags, grantpt, openpt, ptsname, unlockpt};
use rustix::termios::{Winsize, tcgetwinsize, tcsetwinsize};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::config::WindowSize;
use crate::error::{PtyError, Result, errno_to_io};

/// State shared between the master and its split halves.
#[derive(Debug)]
struct Shared {
    /// The controller file descriptor wrapped for async I/O.
    fd: AsyncFd<OwnedFd>,
    /// Whether the PTY is still open.
    open: AtomicBool,
}

/// Unix PTY master implementation.
///
/// This struct wraps the controller side of a Unix pseudo-terminal.
pub struct UnixPtyMaster {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for UnixPtyMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyMaster")
            .field("fd", &self.shared.fd.as_raw_fd())
            .field("open", &self.is_open())
            .finish()
    }
}

impl UnixPtyMaster {
    /// Open a new PTY master.
    ///
    /// Returns the master together with the path of its child side.
    ///
    /// # Errors
    ///
    /// Returns [`PtyError::Create`] if PTY allocation fails.
    pub fn open() -> Result<(Self, String)> {
        let create = |e: rustix::io::Errno| PtyError::Create(errno_to_io(e));

        let master_fd = openpt(OpenptFlags::RDWR | OpenptFlags::NOCTTY).map_err(create)?;
        grantpt(&master_fd).map_err(create)?;
        unlockpt(&master_fd).map_err(create)?;

        let slave_name = ptsname(&master_fd, Vec::new()).map_err(create)?;
        let slave_path = slave_name
            .to_str()
            .map_err(|_| {
                PtyError::Create(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "invalid slave path encoding",
                ))
            })?
            .to_string();

        fcntl_setfl(&master_fd, OFlags::NONBLOCK).map_err(create)?;

        let fd = AsyncFd::new(master_fd).map_err(PtyError::Create)?;

        Ok((
            Self {
                shared: Arc::new(Shared {
                    fd,
                    open: AtomicBool::new(true),
                }),
            },
            slave_path,
        ))
    }

    /// Check if the PTY is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Set the window size.
    pub fn set_window_size(&self, size: WindowSize) -> Result<()> {
        if !self.is_open() {
            return Err(PtyError::Closed);
        }

        let winsize = Winsize {
            ws_col: size.cols,
            ws_row: size.rows,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        tcsetwinsize(self.shared.fd.get_ref(), winsize)
            .map_err(|e| PtyError::Resize(errno_to_io(e)))
    }

    /// Get the current window size.
    pub fn window_size(&self) -> Result<WindowSize> {
        if !self.is_open() {
            return Err(PtyError::Closed);
        }

        let winsize = tcgetwinsize(self.shared.fd.get_ref())
            .map_err(|e| PtyError::GetAttributes(errno_to_io(e)))?;

        Ok(WindowSize::new(winsize.ws_col, winsize.ws_row))
    }

    /// Split into an independently usable reader and writer.
    ///
    /// The descriptor is closed once the master and both halves are dropped.
    #[must_use]
    pub fn split(&self) -> (PtyReader, PtyWriter) {
        (
            PtyReader {
                shared: Arc::clone(&self.shared),
            },
            PtyWriter {
                shared: Arc::clone(&self.shared),
            },
        )
    }

    /// Close the PTY master.
    ///
    /// Readers observe end-of-stream and writers fail with `BrokenPipe` from
    /// now on. Calling this more than once is harmless.
    pub fn close(&self) {
        self.shared.open.store(false, Ordering::SeqCst);
    }
}

impl AsRawFd for UnixPtyMaster {
    fn as_raw_fd(&self) -> RawFd {
        self.shared.fd.as_raw_fd()
    }
}

/// Read half of a PTY master.
#[derive(Debug)]
pub struct PtyReader {
    shared: Arc<Shared>,
}

/// Write half of a PTY master.
#[derive(Debug)]
pub struct PtyWriter {
    shared: Arc<Shared>,
}

impl AsyncRead for PtyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.shared.open.load(Ordering::SeqCst) {
            return Poll::Ready(Ok(())); // EOF
        }

        loop {
            let mut guard = match self.shared.fd.poll_read_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };

            let unfilled = buf.initialize_unfilled();
            match rustix::io::read(self.shared.fd.get_ref(), unfilled) {
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(rustix::io::Errno::AGAIN) => {
                    guard.clear_ready();
                }
                // Linux reports EIO once every child-side descriptor is closed.
                Err(rustix::io::Errno::IO) => return Poll::Ready(Ok(())),
                Err(e) => return Poll::Ready(Err(errno_to_io(e))),
            }
        }
    }
}

impl AsyncWrite for PtyWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if !self.shared.open.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "PTY closed")));
        }

        loop {
            let mut guard = match self.shared.fd.poll_write_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };

            match rustix::io::write(self.shared.fd.get_ref(), buf) {
                Ok(n) => return Poll::Ready(Ok(n)),
                Err(rustix::io::Errno::AGAIN) => {
                    guard.clear_ready();
                }
                Err(rustix::io::Errno::IO) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "PTY child side closed",
                    )));
                }
                Err(e) => return Poll::Ready(Err(errno_to_io(e))),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.open.store(false, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// Open the child side of a PTY.
///
/// The descriptor is close-on-exec; children receive duplicates on their
/// standard streams instead.
pub fn open_slave(path: &str) -> Result<OwnedFd> {
    open(
        Path::new(path),
        OFlags::RDWR | OFlags::NOCTTY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(|e| PtyError::Create(errno_to_io(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn open_pty() {
        let Ok((master, slave_path)) = UnixPtyMaster::open() else {
            return; // no PTY support in this environment
        };
        assert!(master.is_open());
        assert!(slave_path.starts_with("/dev/pts/") || slave_path.starts_with("/dev/pty"));
    }

    #[tokio::test]
    async fn window_size_operations() {
        let Ok((master, _)) = UnixPtyMaster::open() else {
            return;
        };

        master.set_window_size(WindowSize::new(120, 40)).unwrap();

        let retrieved = master.window_size().unwrap();
        assert_eq!(retrieved.cols, 120);
        assert_eq!(retrieved.rows, 40);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let Ok((master, _)) = UnixPtyMaster::open() else {
            return;
        };
        master.close();
        master.close();
        assert!(!master.is_open());
        assert!(matches!(master.window_size(), Err(PtyError::Closed)));
    }

    #[tokio::test]
    async fn closed_halves_report_eof_and_broken_pipe() {
        let Ok((master, _)) = UnixPtyMaster::open() else {
            return;
        };
        let (mut reader, mut writer) = master.split();
        master.close();

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);

        let err = writer.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn bytes_written_on_child_side_reach_reader() {
        let Ok((master, slave_path)) = UnixPtyMaster::open() else {
            return;
        };
        let slave = open_slave(&slave_path).unwrap();
        let (mut reader, _writer) = master.split();

        rustix::io::write(&slave, b"ping").unwrap();

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert!(n > 0);
        assert!(String::from_utf8_lossy(&buf[..n]).contains("ping"));
    }
}
