//! Device backends.
//!
//! Implementations of [`RawDevice`](crate::device::RawDevice):
//! - [`linux`]: kernel `event<N>` nodes read through `evdev`
//! - [`virtual_input`]: channel-fed devices for tests and demos
//!
//! Also hosts the small amount of raw-descriptor plumbing both the Linux backend and the
//! hot-plug watcher need.

pub mod linux;
pub mod virtual_input;

use std::fs;
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Whether `name` looks like a numbered event node (`event0`, `event12`, ...).
pub fn is_event_node_name(name: &str) -> bool {
    name.strip_prefix("event")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Event nodes in `dir`, in numeric order.
pub fn enumerate(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut nodes: Vec<(u32, PathBuf)> = fs::read_dir(dir)?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            if !is_event_node_name(name) {
                return None;
            }
            let n = name["event".len()..].parse().ok()?;
            Some((n, entry.path()))
        })
        .collect();
    nodes.sort();
    Ok(nodes.into_iter().map(|(_, p)| p).collect())
}

/// Block until `fd` is readable or `timeout` elapses.
///
/// Hang-up and error conditions count as readable so the following read reports them. An
/// interrupted wait is reported as a timeout.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    // SAFETY: `pfd` is a valid pollfd for the duration of the call and we pass a count of 1.
    let n = unsafe { libc::poll(&mut pfd, 1, millis) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(n > 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0)
}

/// Put `fd` into non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own, with integer arguments only.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_event_node_names() {
        assert!(is_event_node_name("event0"));
        assert!(is_event_node_name("event17"));
        assert!(!is_event_node_name("event"));
        assert!(!is_event_node_name("mouse0"));
        assert!(!is_event_node_name("event1.bak"));
        assert!(!is_event_node_name("by-id"));
    }

    #[test]
    fn test_enumerate_sorts_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["event10", "event2", "mice", "event1", "js0"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let nodes = enumerate(dir.path()).unwrap();
        let names: Vec<_> = nodes
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["event1", "event2", "event10"]);
    }

    #[test]
    fn test_wait_readable_on_pipe() {
        let (reader, mut writer) = std::os::unix::net::UnixStream::pair().unwrap();
        assert!(!wait_readable(reader.as_raw_fd(), Duration::from_millis(10)).unwrap());
        io::Write::write_all(&mut writer, b"x").unwrap();
        assert!(wait_readable(reader.as_raw_fd(), Duration::from_millis(10)).unwrap());
    }
}
