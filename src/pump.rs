//! Per-device event pumps.
//!
//! Each bound device gets one named worker thread. It grabs the device and reads decoded events
//! in bounded waits. Every event is handed to the owning input's [`EventSink`] in kernel order.
//! When the device goes away the worker queues a retirement for the next validation pass and
//! exits.

use crate::device::{InputId, RawDevice};
use crate::error::DeviceError;
use crate::event::InputEvent;
use crate::registry::{Pending, PendingQueue};
use crate::shutdown::ShutdownToken;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on a single blocking wait, so workers notice shutdown promptly.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receives decoded events from a pump thread.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: &InputEvent);
}

/// Everything a pump needs besides the device itself.
#[derive(Clone, Debug)]
pub struct PumpContext {
    pub pending: Arc<PendingQueue>,
    pub shutdown: ShutdownToken,
    pub running: Arc<AtomicUsize>,
}

/// Decrements the running counter however the worker exits.
struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        RunningGuard(counter.clone())
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A running pump.
#[derive(Debug)]
pub struct Pump {
    id: InputId,
    handle: JoinHandle<()>,
}

impl Pump {
    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to exit.
    pub fn join(self) {
        if self.handle.join().is_err() {
            log::error!("event pump for input {} panicked", self.id);
        }
    }
}

/// Start a pump for `device`, delivering to `sink`.
pub fn spawn(
    id: InputId,
    device: Box<dyn RawDevice>,
    sink: Arc<dyn EventSink>,
    ctx: PumpContext,
) -> io::Result<Pump> {
    let node = device
        .info()
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string());
    // Count the worker before it starts so callers see it immediately.
    let guard = RunningGuard::enter(&ctx.running);
    let handle = thread::Builder::new()
        .name(format!("uniplex-pump:{node}"))
        .spawn(move || {
            let _guard = guard;
            run(id, device, sink.as_ref(), &ctx);
        })?;
    Ok(Pump { id, handle })
}

fn run(id: InputId, mut device: Box<dyn RawDevice>, sink: &dyn EventSink, ctx: &PumpContext) {
    let name = device.info().name.clone();
    if let Err(e) = device.grab() {
        log::warn!("cannot grab {name}: {e}");
    }
    log::debug!("event pump started for {name} ({id})");

    while !ctx.shutdown.is_triggered() {
        let batch = match device.wait(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => device.read_events(),
            Err(e) => Err(e),
        };
        let batch = match batch {
            Err(DeviceError::Overflow) => {
                log::debug!("{name}: events dropped, resynchronizing");
                device.resync()
            }
            other => other,
        };
        match batch {
            Ok(events) => {
                for event in &events {
                    #[cfg(feature = "debug-log")]
                    log::trace!("{name}: {}", crate::logger::describe_event(event));
                    sink.dispatch(event);
                }
            }
            Err(DeviceError::Gone) => {
                log::info!("{name} disconnected");
                ctx.pending.push(Pending::Retire(id));
                return;
            }
            Err(e) => {
                log::error!("reading {name} failed: {e}");
                ctx.pending.push(Pending::Retire(id));
                return;
            }
        }
    }
    log::debug!("event pump for {name} stopped");
}
