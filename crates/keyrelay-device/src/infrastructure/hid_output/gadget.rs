//! Linux USB gadget keyboard output.
//!
//! The gadget's HID function shows up as a character device.  Each write of
//! exactly 8 bytes is delivered to the host as one boot keyboard report.
//!
//! The node only exists while the gadget is bound, and writes start failing
//! when the host goes away.  The sink therefore opens the node lazily, and a
//! failed write drops the handle so the next readiness check reopens it.
//!
//! The node is opened with `O_NONBLOCK`.  A blocking write on `/dev/hidg0`
//! waits until the host polls the endpoint, which could stall forever with
//! the emitter lock held.  Instead `is_ready` asks `poll(2)` whether a report
//! fits right now, and a write that would block comes back as
//! [`HidError::Busy`] for the emitter to retry under its deadline.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use keyrelay_core::{KeyboardReport, REPORT_LEN};
use tracing::{debug, info, warn};

use crate::application::type_keystrokes::{HidError, HidReportSink};

/// Writes reports to a gadget HID device node.
#[derive(Debug)]
pub struct GadgetHidSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl GadgetHidSink {
    /// Creates a sink for `path`.  Nothing is opened until the first report.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    fn handle(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NONBLOCK);
        }
        options.open(&self.path)
    }
}

impl HidReportSink for GadgetHidSink {
    fn is_ready(&self) -> bool {
        let mut file = self.handle();
        if file.is_none() {
            match self.open() {
                Ok(f) => {
                    info!(device = %self.path.display(), "HID gadget opened");
                    *file = Some(f);
                }
                Err(e) => {
                    debug!(device = %self.path.display(), "HID gadget not available: {e}");
                    return false;
                }
            }
        }

        let Some(handle) = file.as_ref() else {
            return false;
        };
        match writable(handle) {
            Ok(ready) => ready,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
            Err(e) => {
                warn!(device = %self.path.display(), "HID gadget unusable, closing handle: {e}");
                *file = None;
                false
            }
        }
    }

    fn send_report(&self, report: &KeyboardReport) -> Result<(), HidError> {
        let mut file = self.handle();
        let mut handle = match file.take() {
            Some(handle) => handle,
            None => self.open()?,
        };
        // One write per report: the gadget driver and pipes both take an
        // 8-byte write whole or not at all.
        match handle.write(&report.to_bytes()) {
            Ok(REPORT_LEN) => {
                *file = Some(handle);
                Ok(())
            }
            Ok(n) => {
                warn!(device = %self.path.display(), written = n, "short HID write, closing handle");
                Err(HidError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short HID write: {n} of {REPORT_LEN} bytes"),
                )))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                *file = Some(handle);
                Err(HidError::Busy)
            }
            Err(e) => {
                warn!(device = %self.path.display(), "HID write failed, closing handle: {e}");
                Err(HidError::Io(e))
            }
        }
    }
}

/// Returns `true` if a write to `file` would not block right now.
#[cfg(unix)]
fn writable(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let mut fds = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    };
    // SAFETY: `fds` is one valid pollfd that lives for the whole call, and a
    // zero timeout never blocks.
    let rc = unsafe { libc::poll(&mut fds, 1, 0) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    if fds.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "HID endpoint reported an error or hang-up",
        ));
    }
    Ok(fds.revents & libc::POLLOUT != 0)
}

#[cfg(not(unix))]
fn writable(_file: &File) -> io::Result<bool> {
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::{HidKey, HidKeyCode};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("keyrelay-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_missing_device_is_not_ready() {
        let sink = GadgetHidSink::new(temp_path("absent-node"));
        assert!(!sink.is_ready());
    }

    #[test]
    fn test_reports_are_written_as_eight_byte_records() {
        // Arrange: a plain file stands in for the device node
        let path = temp_path("hidg-capture");
        File::create(&path).unwrap();
        let sink = GadgetHidSink::new(&path);

        // Act
        assert!(sink.is_ready());
        sink.send_report(&KeyboardReport::single(HidKey::shifted(HidKeyCode::KeyA)))
            .unwrap();
        sink.send_report(&KeyboardReport::RELEASE).unwrap();

        // Assert
        let written = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(written.len(), 16);
        assert_eq!(&written[..8], &[0x02, 0, 0x04, 0, 0, 0, 0, 0]);
        assert_eq!(&written[8..], &[0u8; 8]);
    }

    /// A FIFO behaves like a gadget whose host has stopped polling: once the
    /// pipe buffer is full, writes would block until a reader drains it.
    #[cfg(unix)]
    mod stalled_endpoint {
        use super::*;
        use crate::application::type_keystrokes::{EmitterTiming, TypeKeystrokesUseCase};
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;
        use std::os::unix::fs::OpenOptionsExt;
        use std::path::Path;
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            mpsc, Arc,
        };
        use std::thread;
        use std::time::Duration;

        fn make_fifo(name: &str) -> PathBuf {
            let path = temp_path(name);
            std::fs::remove_file(&path).ok();
            let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
            // SAFETY: `c_path` is a valid NUL-terminated path.
            let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
            assert_eq!(rc, 0, "mkfifo failed: {}", io::Error::last_os_error());
            path
        }

        /// Opens the read end and never reads from it.
        fn idle_reader(path: &Path) -> File {
            OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
                .unwrap()
        }

        fn timing(ready_timeout: Option<Duration>) -> EmitterTiming {
            EmitterTiming {
                press_settle: Duration::ZERO,
                release_settle: Duration::ZERO,
                poll_interval: Duration::from_millis(1),
                ready_timeout,
            }
        }

        #[test]
        fn test_fifo_without_reader_is_not_ready() {
            let path = make_fifo("fifo-no-reader");
            let sink = GadgetHidSink::new(&path);

            let ready = sink.is_ready();
            std::fs::remove_file(&path).ok();

            assert!(!ready, "opening a FIFO with no reader must not succeed");
        }

        #[test]
        fn test_full_endpoint_times_out_instead_of_blocking() {
            // Arrange: more reports than the pipe buffer can hold
            let path = make_fifo("fifo-full-timeout");
            let _reader = idle_reader(&path);
            let sink: Arc<dyn HidReportSink> = Arc::new(GadgetHidSink::new(&path));
            let uc = TypeKeystrokesUseCase::new(
                sink,
                timing(Some(Duration::from_millis(20))),
                Arc::new(AtomicBool::new(true)),
            );
            let command = "a".repeat(10_000);

            // Act
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                tx.send(uc.type_command(&command)).ok();
            });
            let outcome = rx.recv_timeout(Duration::from_secs(5));
            std::fs::remove_file(&path).ok();

            // Assert
            let result = outcome.expect("typing must give up instead of blocking on a full endpoint");
            assert!(matches!(result, Err(HidError::NotReady(_))), "got {result:?}");
        }

        #[test]
        fn test_full_endpoint_is_cancelled_by_shutdown_flag() {
            // Arrange: unbounded wait, so only the flag can end it
            let path = make_fifo("fifo-full-cancel");
            let _reader = idle_reader(&path);
            let running = Arc::new(AtomicBool::new(true));
            let sink: Arc<dyn HidReportSink> = Arc::new(GadgetHidSink::new(&path));
            let uc = TypeKeystrokesUseCase::new(sink, timing(None), Arc::clone(&running));
            let command = "a".repeat(10_000);

            // Act
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                tx.send(uc.type_command(&command)).ok();
            });
            thread::sleep(Duration::from_millis(200));
            running.store(false, Ordering::Relaxed);
            let outcome = rx.recv_timeout(Duration::from_secs(5));
            std::fs::remove_file(&path).ok();

            // Assert
            let result = outcome.expect("clearing the flag must end the wait");
            assert!(matches!(result, Err(HidError::Cancelled)), "got {result:?}");
        }

        #[test]
        fn test_full_endpoint_reports_busy_and_not_ready() {
            // Arrange: fill the pipe directly through the sink
            let path = make_fifo("fifo-full-busy");
            let _reader = idle_reader(&path);
            let sink = GadgetHidSink::new(&path);
            assert!(sink.is_ready());

            // Act
            let mut busy = false;
            for _ in 0..100_000 {
                match sink.send_report(&KeyboardReport::RELEASE) {
                    Ok(()) => {}
                    Err(HidError::Busy) => {
                        busy = true;
                        break;
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            let ready_when_full = sink.is_ready();
            std::fs::remove_file(&path).ok();

            // Assert
            assert!(busy, "a full endpoint must answer Busy");
            assert!(!ready_when_full);
        }
    }
}
