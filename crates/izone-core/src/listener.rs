// ── Listener fan-out ──
//
// Notifications are queued onto a single dispatcher task and delivered
// from there, never from inside the component that raised them. Each
// event goes to the broadcast stream first, then to every registered
// listener in registration order.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, mpsc};
use tracing::{error, trace};

use crate::controller::Controller;
use crate::sync::read;
use crate::zone::Zone;

/// Observer of discovery and controller state changes.
///
/// Every method has an empty default so implementors pick what they
/// need. Methods run on the dispatcher task; a panic is logged and does
/// not reach other listeners.
pub trait Listener: Send + Sync {
    /// A new controller finished initialization.
    fn controller_discovered(&self, _controller: &Controller) {}

    /// A controller stopped answering.
    fn controller_disconnected(&self, _controller: &Controller, _error: &izone_api::Error) {}

    /// A disconnected controller answered again.
    fn controller_reconnected(&self, _controller: &Controller) {}

    /// System settings were refreshed.
    fn controller_updated(&self, _controller: &Controller) {}

    /// One zone's settings were refreshed.
    fn zone_updated(&self, _controller: &Controller, _zone: &Zone) {}
}

/// The notifications a [`DiscoveryService`](crate::DiscoveryService) emits.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    ControllerDiscovered(Controller),
    ControllerDisconnected {
        controller: Controller,
        error: Arc<izone_api::Error>,
    },
    ControllerReconnected(Controller),
    ControllerUpdated(Controller),
    ZoneUpdated {
        controller: Controller,
        zone: Zone,
    },
}

impl DiscoveryEvent {
    pub fn controller(&self) -> &Controller {
        match self {
            Self::ControllerDiscovered(controller)
            | Self::ControllerReconnected(controller)
            | Self::ControllerUpdated(controller)
            | Self::ControllerDisconnected { controller, .. }
            | Self::ZoneUpdated { controller, .. } => controller,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ControllerDiscovered(_) => "controller_discovered",
            Self::ControllerDisconnected { .. } => "controller_disconnected",
            Self::ControllerReconnected(_) => "controller_reconnected",
            Self::ControllerUpdated(_) => "controller_updated",
            Self::ZoneUpdated { .. } => "zone_updated",
        }
    }

    fn deliver(&self, listener: &dyn Listener) {
        match self {
            Self::ControllerDiscovered(controller) => listener.controller_discovered(controller),
            Self::ControllerDisconnected { controller, error } => {
                listener.controller_disconnected(controller, error);
            }
            Self::ControllerReconnected(controller) => listener.controller_reconnected(controller),
            Self::ControllerUpdated(controller) => listener.controller_updated(controller),
            Self::ZoneUpdated { controller, zone } => listener.zone_updated(controller, zone),
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

pub(crate) type ListenerSet = Arc<RwLock<Vec<Arc<dyn Listener>>>>;

pub(crate) enum Dispatch {
    Event(DiscoveryEvent),
    /// Announce already-known controllers to a newly added listener.
    Replay {
        listener: Arc<dyn Listener>,
        controllers: Vec<Controller>,
    },
    Shutdown,
}

/// Sending half of the dispatcher queue.
///
/// Events are dropped until [`activate`](Self::activate) is called, so
/// the queue cannot grow while no dispatcher drains it.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Dispatch>,
    active: Arc<AtomicBool>,
}

impl Notifier {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Dispatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Self {
            tx,
            active: Arc::new(AtomicBool::new(false)),
        };
        (notifier, rx)
    }

    /// Start queueing; the dispatcher task is running.
    pub(crate) fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    fn queue(&self, message: Dispatch) {
        if self.active.load(Ordering::Acquire) {
            let _ = self.tx.send(message);
        } else {
            trace!(?message, "no dispatcher running, dropped");
        }
    }

    pub(crate) fn notify(&self, event: DiscoveryEvent) {
        self.queue(Dispatch::Event(event));
    }

    pub(crate) fn replay(&self, listener: Arc<dyn Listener>, controllers: Vec<Controller>) {
        self.queue(Dispatch::Replay {
            listener,
            controllers,
        });
    }

    /// Stop the dispatcher once everything queued so far is delivered.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Dispatch::Shutdown);
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(event) => f.debug_tuple("Event").field(&event.kind()).finish(),
            Self::Replay { controllers, .. } => f
                .debug_struct("Replay")
                .field("controllers", &controllers.len())
                .finish_non_exhaustive(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

pub(crate) async fn dispatch_task(
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    listeners: ListenerSet,
    events: broadcast::Sender<DiscoveryEvent>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Event(event) => {
                trace!(
                    event = event.kind(),
                    device_uid = event.controller().device_uid(),
                    "dispatching"
                );
                let _ = events.send(event.clone());
                let snapshot: Vec<Arc<dyn Listener>> = read(&listeners).clone();
                for listener in &snapshot {
                    deliver_guarded(listener.as_ref(), &event);
                }
            }
            Dispatch::Replay {
                listener,
                controllers,
            } => {
                for controller in controllers {
                    deliver_guarded(
                        listener.as_ref(),
                        &DiscoveryEvent::ControllerDiscovered(controller),
                    );
                }
            }
            Dispatch::Shutdown => break,
        }
    }
}

fn deliver_guarded(listener: &dyn Listener, event: &DiscoveryEvent) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| event.deliver(listener))) {
        error!(
            event = event.kind(),
            device_uid = event.controller().device_uid(),
            "listener panicked: {}",
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Quiet;

    impl Listener for Quiet {}

    #[test]
    fn nothing_queues_before_activation() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.replay(Arc::new(Quiet), Vec::new());
        assert!(rx.try_recv().is_err());

        notifier.activate();
        notifier.replay(Arc::new(Quiet), Vec::new());
        assert!(matches!(rx.try_recv().unwrap(), Dispatch::Replay { .. }));
    }
}
