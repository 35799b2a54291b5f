//! Hot-plug discovery.
//!
//! Watches the device directory for created nodes and attribute changes. Nodes usually appear
//! before udev has fixed their permissions, so the later attribute change is often the first
//! notification for which the node is actually readable.

use crate::backends::linux::EvdevDevice;
use crate::backends::{is_event_node_name, wait_readable};
use crate::config::SlotNames;
use crate::device::RawDevice;
use crate::error::{Error, Result};
use crate::manager::admit;
use crate::pump::POLL_INTERVAL;
use crate::registry::PendingQueue;
use crate::shutdown::ShutdownToken;
use inotify::{Inotify, WatchMask};
use std::collections::VecDeque;
use std::ffi::CString;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Whether `path` is an existing, readable character device.
pub fn is_ready_device(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.file_type().is_char_device() {
        return false;
    }
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

/// An inotify watch on one device directory.
pub struct DeviceWatcher {
    inotify: Inotify,
    dir: PathBuf,
    buffer: Vec<u8>,
    ready: fn(&Path) -> bool,
}

impl std::fmt::Debug for DeviceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWatcher").field("dir", &self.dir).finish()
    }
}

impl DeviceWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let inotify = Inotify::init().map_err(Error::Watch)?;
        inotify
            .watches()
            .add(&dir, WatchMask::CREATE | WatchMask::ATTRIB)
            .map_err(Error::Watch)?;
        log::debug!("watching {}", dir.display());
        Ok(Self {
            inotify,
            dir,
            buffer: vec![0; 4096],
            ready: is_ready_device,
        })
    }

    /// Replace the readiness check applied to notified nodes.
    pub fn with_readiness(mut self, ready: fn(&Path) -> bool) -> Self {
        self.ready = ready;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait up to `timeout` and return the ready event nodes that were notified.
    pub fn poll(&mut self, timeout: Duration) -> io::Result<Vec<PathBuf>> {
        if !wait_readable(self.inotify.as_raw_fd(), timeout)? {
            return Ok(Vec::new());
        }
        let events = match self.inotify.read_events(&mut self.buffer) {
            Ok(events) => events,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut paths: Vec<PathBuf> = Vec::new();
        for event in events {
            let Some(name) = event.name.and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_event_node_name(name) {
                continue;
            }
            let path = self.dir.join(name);
            if !paths.contains(&path) && (self.ready)(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Endless stream of ready nodes, ending only on shutdown or a read failure.
    ///
    /// Dropping the iterator keeps the watch; calling this again picks up where it left off.
    pub fn notifications<'a>(&'a mut self, shutdown: &'a ShutdownToken) -> Notifications<'a> {
        Notifications {
            watcher: self,
            shutdown,
            queued: VecDeque::new(),
        }
    }
}

/// Iterator returned by [`DeviceWatcher::notifications`].
#[derive(Debug)]
pub struct Notifications<'a> {
    watcher: &'a mut DeviceWatcher,
    shutdown: &'a ShutdownToken,
    queued: VecDeque<PathBuf>,
}

impl Iterator for Notifications<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if let Some(path) = self.queued.pop_front() {
                return Some(path);
            }
            if self.shutdown.is_triggered() {
                return None;
            }
            match self.watcher.poll(POLL_INTERVAL) {
                Ok(paths) => self.queued.extend(paths),
                Err(e) => {
                    log::error!("watching {} failed: {e}", self.watcher.dir().display());
                    return None;
                }
            }
        }
    }
}

/// Whether an open failure just means the node disappeared again.
fn vanished(err: &Error) -> bool {
    match err {
        Error::Device { source, .. } => {
            source.kind() == io::ErrorKind::NotFound || source.raw_os_error() == Some(libc::ENODEV)
        }
        _ => false,
    }
}

fn open_node(path: &Path) -> Result<Box<dyn RawDevice>> {
    Ok(Box::new(EvdevDevice::open(path)?))
}

/// Run the watcher on its own thread, admitting every classifiable node that appears.
pub fn spawn(
    watcher: DeviceWatcher,
    names: SlotNames,
    pending: Arc<PendingQueue>,
    shutdown: ShutdownToken,
) -> io::Result<JoinHandle<()>> {
    spawn_with(watcher, names, pending, shutdown, open_node)
}

/// Like [`spawn`], opening notified nodes with `open`.
///
/// Nodes that are gone again by the time `open` runs are skipped without a warning.
pub fn spawn_with<F>(
    mut watcher: DeviceWatcher,
    names: SlotNames,
    pending: Arc<PendingQueue>,
    shutdown: ShutdownToken,
    open: F,
) -> io::Result<JoinHandle<()>>
where
    F: Fn(&Path) -> Result<Box<dyn RawDevice>> + Send + 'static,
{
    thread::Builder::new()
        .name("uniplex-watch".into())
        .spawn(move || {
            for path in watcher.notifications(&shutdown) {
                match open(&path) {
                    Ok(device) => {
                        admit(device, &names, &pending);
                    }
                    Err(e) if vanished(&e) => {
                        log::debug!("{} vanished before it could be opened", path.display());
                    }
                    Err(e) => log::warn!("{e}"),
                }
            }
            log::debug!("device watcher stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn any_file(_: &Path) -> bool {
        true
    }

    #[test]
    fn test_regular_file_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("event0");
        fs::write(&file, b"").unwrap();
        assert!(!is_ready_device(&file));
        assert!(!is_ready_device(&dir.path().join("event1")));
    }

    #[test]
    fn test_poll_reports_event_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = DeviceWatcher::new(dir.path()).unwrap().with_readiness(any_file);
        assert_eq!(w.dir(), dir.path());
        assert!(w.poll(Duration::from_millis(10)).unwrap().is_empty());

        fs::write(dir.path().join("event4"), b"").unwrap();
        fs::write(dir.path().join("mouse0"), b"").unwrap();
        let paths = w.poll(Duration::from_secs(1)).unwrap();
        assert_eq!(paths, vec![dir.path().join("event4")]);
    }

    #[test]
    fn test_notifications_resume_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = DeviceWatcher::new(dir.path()).unwrap().with_readiness(any_file);
        let shutdown = ShutdownToken::new();

        fs::write(dir.path().join("event1"), b"").unwrap();
        assert_eq!(
            w.notifications(&shutdown).next(),
            Some(dir.path().join("event1"))
        );

        fs::write(dir.path().join("event2"), b"").unwrap();
        assert_eq!(
            w.notifications(&shutdown).next(),
            Some(dir.path().join("event2"))
        );

        shutdown.trigger();
        assert_eq!(w.notifications(&shutdown).next(), None);
    }

    fn device_error(path: &Path, source: io::Error) -> Error {
        Error::Device {
            path: path.to_owned(),
            source,
        }
    }

    #[test]
    fn test_vanished() {
        let path = Path::new("/dev/input/event3");
        assert!(vanished(&device_error(path, io::ErrorKind::NotFound.into())));
        assert!(vanished(&device_error(
            path,
            io::Error::from_raw_os_error(libc::ENODEV)
        )));
        assert!(!vanished(&device_error(
            path,
            io::ErrorKind::PermissionDenied.into()
        )));
        assert!(!vanished(&Error::Watch(io::ErrorKind::NotFound.into())));
    }

    #[test]
    fn test_spawn_skips_nodes_that_vanish() {
        use crate::backends::virtual_input::{self, VirtualDevice};
        use crate::registry::Pending;
        use std::time::Instant;

        fn open(path: &Path) -> Result<Box<dyn RawDevice>> {
            match path.file_name().and_then(|n| n.to_str()) {
                Some("event1") => Err(device_error(path, io::ErrorKind::NotFound.into())),
                _ => {
                    let info = virtual_input::mouse("mouse", &path.to_string_lossy());
                    Ok(Box::new(VirtualDevice::new(info).0))
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let w = DeviceWatcher::new(dir.path()).unwrap().with_readiness(any_file);
        let pending = Arc::new(PendingQueue::default());
        let shutdown = ShutdownToken::new();
        let handle = spawn_with(
            w,
            SlotNames::default(),
            pending.clone(),
            shutdown.clone(),
            open,
        )
        .unwrap();

        fs::write(dir.path().join("event1"), b"").unwrap();
        fs::write(dir.path().join("event2"), b"").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while pending.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        // Give a late notification for the vanished node the chance to show up.
        thread::sleep(Duration::from_millis(200));
        shutdown.trigger();
        handle.join().unwrap();

        let items = pending.take();
        assert!(matches!(
            items.as_slice(),
            [Pending::Bind(p)] if p.info().path() == dir.path().join("event2")
        ));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DeviceWatcher::new(dir.path().join("nope")),
            Err(Error::Watch(_))
        ));
    }
}
